use super::{colima_profile, VirtualMachine};
use crate::config::ConfigHandler;
use crate::shell::{Shell, ShellCommand};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
struct ColimaStatus {
    #[serde(default)]
    address: String,
    #[serde(default)]
    status: String,
}

/// Colima VM sized from `vm.*` config
pub struct ColimaVirt {
    shell: Arc<dyn Shell>,
    config: Arc<dyn ConfigHandler>,
}

impl ColimaVirt {
    pub fn new(shell: Arc<dyn Shell>, config: Arc<dyn ConfigHandler>) -> Self {
        Self { shell, config }
    }

    fn profile(&self) -> String {
        colima_profile(&self.config.get_context())
    }

    fn start_command(&self) -> ShellCommand {
        let arch = match std::env::consts::ARCH {
            "aarch64" => "aarch64",
            _ => "x86_64",
        };
        let vm_type = if cfg!(target_os = "macos") { "vz" } else { "qemu" };
        ShellCommand::new("colima")
            .args(["start", "--profile"])
            .arg(self.profile())
            .arg("--cpu")
            .arg(self.config.get_int("vm.cpu", 4).to_string())
            .arg("--memory")
            .arg(self.config.get_int("vm.memory", 8).to_string())
            .arg("--disk")
            .arg(self.config.get_int("vm.disk", 60).to_string())
            .args(["--arch", arch, "--vm-type", vm_type])
            .args(["--network-address", "--runtime", "docker"])
    }
}

#[async_trait]
impl VirtualMachine for ColimaVirt {
    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn up(&self) -> Result<()> {
        self.shell
            .run_progress("🦙 Starting Colima VM", &self.start_command())
            .await
            .context("Failed to start Colima VM")?;
        let address = self.address().await?;
        info!(profile = %self.profile(), address = %address, "VM running");
        Ok(())
    }

    async fn down(&self) -> Result<()> {
        let profile = self.profile();
        self.shell
            .run_progress(
                "🦙 Deleting Colima VM",
                &ShellCommand::new("colima").args(["delete", "--profile", profile.as_str(), "--force"]),
            )
            .await
            .context("Failed to delete Colima VM")?;
        Ok(())
    }

    async fn address(&self) -> Result<String> {
        let profile = self.profile();
        let output = self
            .shell
            .run(&ShellCommand::new("colima").args(["ls", "--profile", profile.as_str(), "--json"]))
            .await?;
        let status: ColimaStatus =
            serde_json::from_str(&output).context("Failed to parse colima status")?;
        if status.address.is_empty() {
            return Err(anyhow!(
                "Colima VM {} has no address (status: {})",
                profile,
                status.status
            ));
        }
        Ok(status.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::YamlConfigHandler;
    use crate::fs::MockFileSystem;
    use crate::shell::MockShell;

    fn setup() -> (ColimaVirt, Arc<MockShell>) {
        let shell = Arc::new(MockShell::new("/project"));
        let config = Arc::new(YamlConfigHandler::new(
            shell.clone(),
            Arc::new(MockFileSystem::new()),
        ));
        config
            .set_defaults(serde_yaml::from_str("vm:\n  cpu: 2\n  memory: 4\n").unwrap())
            .unwrap();
        (ColimaVirt::new(shell.clone(), config), shell)
    }

    #[tokio::test]
    async fn test_up_sizes_vm_from_config() {
        let (vm, shell) = setup();
        shell.respond(
            "colima ls",
            r#"{"name":"windsor-local","status":"Running","address":"192.168.5.2"}"#,
        );

        vm.up().await.unwrap();

        let commands = shell.commands();
        assert!(commands[0].starts_with("colima start --profile windsor-local --cpu 2 --memory 4 --disk 60"));
        assert_eq!(commands[1], "colima ls --profile windsor-local --json");
    }

    #[tokio::test]
    async fn test_address_requires_running_vm() {
        let (vm, shell) = setup();
        shell.respond("colima ls", r#"{"name":"windsor-local","status":"Stopped"}"#);
        let err = vm.address().await.unwrap_err();
        assert!(err.to_string().contains("status: Stopped"));
    }
}
