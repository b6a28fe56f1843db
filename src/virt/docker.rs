use super::ContainerRuntime;
use crate::config::ConfigHandler;
use crate::fs::FileSystem;
use crate::shell::{Shell, ShellCommand};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

pub const COMPOSE_FILE: &str = ".windsor/docker-compose.yaml";
pub const COREFILE: &str = ".windsor/Corefile";

/// Docker Compose services for a context: a local registry and, when DNS is
/// enabled, a CoreDNS resolver for the context domain.
pub struct DockerVirt {
    shell: Arc<dyn Shell>,
    config: Arc<dyn ConfigHandler>,
    fs: Arc<dyn FileSystem>,
}

impl DockerVirt {
    pub fn new(
        shell: Arc<dyn Shell>,
        config: Arc<dyn ConfigHandler>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self { shell, config, fs }
    }

    fn compose_path(&self) -> Result<PathBuf> {
        Ok(self.shell.project_root()?.join(COMPOSE_FILE))
    }

    fn compose_project(&self) -> String {
        format!("windsor-{}", self.config.get_context())
    }

    fn corefile(&self, domain: &str) -> String {
        format!(
            "{domain}:53 {{\n    errors\n    reload\n    hosts {{\n        fallthrough\n    }}\n    forward . /etc/resolv.conf\n}}\n.:53 {{\n    errors\n    forward . 1.1.1.1 8.8.8.8\n    cache 30\n}}\n",
            domain = domain
        )
    }

    /// Compose document for the enabled services.
    pub fn compose_document(&self) -> Result<Value> {
        let mut services = Map::new();
        let registry_url = self
            .config
            .get_string("docker.registry_url", "registry.test");
        services.insert(
            "registry".to_string(),
            json!({
                "image": "registry:2.8.3",
                "container_name": registry_url,
                "restart": "always",
                "labels": { "role": "registry", "context": self.config.get_context() },
            }),
        );

        if self.config.get_bool("dns.enabled", false) {
            let domain = self.config.get_string("dns.domain", "test");
            services.insert(
                "dns".to_string(),
                json!({
                    "image": "coredns/coredns:1.11.3",
                    "container_name": format!("dns.{}", domain),
                    "restart": "always",
                    "command": ["-conf", "/etc/coredns/Corefile"],
                    "volumes": ["./Corefile:/etc/coredns/Corefile"],
                    "labels": { "role": "dns", "context": self.config.get_context() },
                }),
            );
        }

        Ok(json!({
            "name": self.compose_project(),
            "services": services,
            "networks": { "default": { "name": "windsor" } },
        }))
    }

    fn write_files(&self) -> Result<PathBuf> {
        let root = self.shell.project_root()?;
        if self.config.get_bool("dns.enabled", false) {
            let domain = self.config.get_string("dns.domain", "test");
            self.fs
                .write(&root.join(COREFILE), self.corefile(&domain).as_bytes())?;
        }
        let path = self.compose_path()?;
        let content = serde_yaml::to_string(&self.compose_document()?)
            .context("Failed to serialize compose file")?;
        self.fs.write(&path, content.as_bytes())?;
        Ok(path)
    }

    fn compose(&self, path: &std::path::Path) -> ShellCommand {
        ShellCommand::new("docker")
            .arg("compose")
            .arg("-f")
            .arg(path.display().to_string())
            .arg("--project-name")
            .arg(self.compose_project())
    }
}

#[async_trait]
impl ContainerRuntime for DockerVirt {
    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn up(&self) -> Result<()> {
        let path = self.write_files()?;
        self.shell
            .run_progress(
                "🐳 Starting Docker services",
                &self.compose(&path).args(["up", "-d", "--remove-orphans"]),
            )
            .await
            .context("Failed to start Docker services")?;
        Ok(())
    }

    async fn down(&self) -> Result<()> {
        let path = self.compose_path()?;
        if !self.fs.exists(&path) {
            debug!("no compose file, nothing to stop");
            return Ok(());
        }
        self.shell
            .run_progress(
                "🐳 Stopping Docker services",
                &self.compose(&path).args(["down", "--remove-orphans", "--volumes"]),
            )
            .await
            .context("Failed to stop Docker services")?;
        Ok(())
    }
}
