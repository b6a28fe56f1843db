use super::{extract_version, ToolsManager, Version};
use crate::config::ConfigHandler;
use crate::fs::FileSystem;
use crate::shell::{Shell, ShellCommand};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

const AQUA_MANIFEST: &str = "aqua.yaml";
const AQUA_REGISTRY_REF: &str = "v4.155.1";

/// A tool the current context depends on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRequirement {
    pub name: &'static str,
    pub version_args: &'static [&'static str],
    pub minimum: Version,
    /// aqua package name
    pub package: &'static str,
}

const DOCKER: ToolRequirement = ToolRequirement {
    name: "docker",
    version_args: &["--version"],
    minimum: Version::new(23, 0, 0),
    package: "docker/cli",
};
const COLIMA: ToolRequirement = ToolRequirement {
    name: "colima",
    version_args: &["version"],
    minimum: Version::new(0, 7, 0),
    package: "abiosoft/colima",
};
const TERRAFORM: ToolRequirement = ToolRequirement {
    name: "terraform",
    version_args: &["version"],
    minimum: Version::new(1, 7, 0),
    package: "hashicorp/terraform",
};
const TALOSCTL: ToolRequirement = ToolRequirement {
    name: "talosctl",
    version_args: &["version", "--client", "--short"],
    minimum: Version::new(1, 7, 0),
    package: "siderolabs/talos",
};
const KUBECTL: ToolRequirement = ToolRequirement {
    name: "kubectl",
    version_args: &["version", "--client"],
    minimum: Version::new(1, 27, 0),
    package: "kubernetes/kubectl",
};

#[derive(Serialize)]
struct AquaManifest {
    registries: Vec<AquaRegistry>,
    packages: Vec<AquaPackage>,
}

#[derive(Serialize)]
struct AquaRegistry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "ref")]
    reference: String,
}

#[derive(Serialize)]
struct AquaPackage {
    name: String,
}

/// Tools manager that shells out to each tool for its version
pub struct ShellToolsManager {
    shell: Arc<dyn Shell>,
    config: Arc<dyn ConfigHandler>,
    fs: Arc<dyn FileSystem>,
}

impl ShellToolsManager {
    pub fn new(
        shell: Arc<dyn Shell>,
        config: Arc<dyn ConfigHandler>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self { shell, config, fs }
    }

    pub fn required_tools(&self) -> Vec<ToolRequirement> {
        let mut tools = Vec::new();
        if self.config.get_bool("docker.enabled", false) {
            tools.push(DOCKER);
        }
        if self.config.get_string("vm.driver", "") == "colima" {
            tools.push(COLIMA);
        }
        if self.config.get_bool("terraform.enabled", false) {
            tools.push(TERRAFORM);
        }
        if self.config.get_bool("cluster.enabled", false) {
            if self.config.get_string("cluster.driver", "") == "talos" {
                tools.push(TALOSCTL);
            }
            tools.push(KUBECTL);
        }
        tools
    }

    async fn check_tool(&self, tool: &ToolRequirement) -> Result<()> {
        let output = self
            .shell
            .run(&ShellCommand::new(tool.name).args(tool.version_args.iter().copied()))
            .await
            .with_context(|| format!("{} is not available", tool.name))?;

        let found = extract_version(&output)
            .ok_or_else(|| anyhow!("failed to parse {} version from '{}'", tool.name, output))?;

        if !found.at_least(&tool.minimum) {
            bail!(
                "{} version {} is below the minimum required version {}",
                tool.name,
                found,
                tool.minimum
            );
        }
        debug!(tool = tool.name, version = %found, "tool version ok");
        Ok(())
    }
}

#[async_trait]
impl ToolsManager for ShellToolsManager {
    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn check(&self) -> Result<()> {
        for tool in self.required_tools() {
            self.check_tool(&tool).await?;
        }
        Ok(())
    }

    async fn install(&self) -> Result<()> {
        let root = self.shell.project_root()?;
        if !self.fs.exists(&root.join(AQUA_MANIFEST)) {
            debug!("no aqua manifest, skipping tool installation");
            return Ok(());
        }
        self.shell
            .run_progress(
                "📦 Installing tools",
                &ShellCommand::new("aqua").arg("install").current_dir(root),
            )
            .await
            .context("aqua install failed")?;
        Ok(())
    }

    fn write_manifest(&self) -> Result<()> {
        let path = self.shell.project_root()?.join(AQUA_MANIFEST);
        if self.fs.exists(&path) {
            return Ok(());
        }

        let manifest = AquaManifest {
            registries: vec![AquaRegistry {
                kind: "standard".to_string(),
                reference: AQUA_REGISTRY_REF.to_string(),
            }],
            packages: self
                .required_tools()
                .iter()
                .map(|tool| AquaPackage {
                    name: format!("{}@v{}", tool.package, tool.minimum),
                })
                .collect(),
        };
        let content = serde_yaml::to_string(&manifest).context("Failed to serialize aqua manifest")?;
        self.fs.write(&path, content.as_bytes())?;
        info!(path = %path.display(), "wrote tools manifest");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::YamlConfigHandler;
    use crate::fs::MockFileSystem;
    use crate::shell::MockShell;
    use serde_yaml::Value;
    use std::path::Path;

    fn setup(config: &str) -> (ShellToolsManager, Arc<MockShell>, Arc<MockFileSystem>) {
        let shell = Arc::new(MockShell::new("/project"));
        let fs = Arc::new(MockFileSystem::new());
        let handler = Arc::new(YamlConfigHandler::new(shell.clone(), fs.clone()));
        handler
            .set_defaults(serde_yaml::from_str::<Value>(config).unwrap())
            .unwrap();
        (ShellToolsManager::new(shell.clone(), handler, fs.clone()), shell, fs)
    }

    #[test]
    fn test_required_tools_follow_config() {
        let (manager, _, _) = setup("docker:\n  enabled: true\nvm:\n  driver: colima\n");
        let names: Vec<_> = manager.required_tools().iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["docker", "colima"]);
    }

    #[tokio::test]
    async fn test_check_rejects_old_versions() {
        let (manager, shell, _) = setup("docker:\n  enabled: true\n");
        shell.respond("docker --version", "Docker version 20.10.1, build abc");

        let err = manager.check().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "docker version 20.10.1 is below the minimum required version 23.0.0"
        );
    }

    #[tokio::test]
    async fn test_check_passes_current_versions() {
        let (manager, shell, _) = setup("terraform:\n  enabled: true\n");
        shell.respond("terraform version", "Terraform v1.9.2\non darwin_arm64");
        manager.check().await.unwrap();
    }

    #[tokio::test]
    async fn test_install_requires_manifest() {
        let (manager, shell, fs) = setup("docker:\n  enabled: true\n");
        manager.install().await.unwrap();
        assert!(shell.commands().is_empty());

        manager.write_manifest().unwrap();
        let manifest = fs
            .read_to_string(Path::new("/project/aqua.yaml"))
            .unwrap();
        assert!(manifest.contains("docker/cli@v23.0.0"));

        manager.install().await.unwrap();
        assert_eq!(shell.commands(), vec!["aqua install".to_string()]);
    }
}
