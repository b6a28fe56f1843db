use super::{NetworkManager, DEFAULT_CIDR_BLOCK};
use crate::config::ConfigHandler;
use crate::shell::{Shell, ShellCommand};
use crate::virt::VirtualMachine;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostOs {
    MacOs,
    Linux,
}

impl HostOs {
    fn current() -> Self {
        if cfg!(target_os = "macos") {
            HostOs::MacOs
        } else {
            HostOs::Linux
        }
    }
}

/// Networking for a Colima-hosted cluster.
///
/// Guest commands go through the secure shell; without one the guest step
/// is skipped.
pub struct ColimaNetworkManager {
    shell: Arc<dyn Shell>,
    secure_shell: Option<Arc<dyn Shell>>,
    config: Arc<dyn ConfigHandler>,
    vm: Arc<dyn VirtualMachine>,
    os: HostOs,
}

impl ColimaNetworkManager {
    pub fn new(
        shell: Arc<dyn Shell>,
        secure_shell: Option<Arc<dyn Shell>>,
        config: Arc<dyn ConfigHandler>,
        vm: Arc<dyn VirtualMachine>,
    ) -> Self {
        Self {
            shell,
            secure_shell,
            config,
            vm,
            os: HostOs::current(),
        }
    }

    #[cfg(test)]
    fn with_os(mut self, os: HostOs) -> Self {
        self.os = os;
        self
    }

    fn cidr(&self) -> String {
        self.config
            .get_string("network.cidr_block", DEFAULT_CIDR_BLOCK)
    }

    fn dns_address(&self) -> String {
        self.config.get_string("dns.address", "")
    }
}

#[async_trait]
impl NetworkManager for ColimaNetworkManager {
    fn initialize(&self) -> Result<()> {
        let cidr = self.cidr();
        if !cidr.contains('/') {
            bail!("invalid network.cidr_block {:?}", cidr);
        }
        Ok(())
    }

    async fn configure_guest(&self) -> Result<()> {
        let Some(secure) = &self.secure_shell else {
            debug!("no secure shell, skipping guest network configuration");
            return Ok(());
        };
        let cidr = self.cidr();
        let check = ShellCommand::new("sudo").args([
            "iptables", "-t", "filter", "-C", "FORWARD", "-i", "col0", "-o", "br-windsor", "-d",
            cidr.as_str(), "-j", "ACCEPT",
        ]);
        if secure.run(&check).await.is_ok() {
            debug!(cidr = %cidr, "forwarding rule already present");
            return Ok(());
        }
        secure
            .run(&ShellCommand::new("sudo").args([
                "iptables", "-t", "filter", "-A", "FORWARD", "-i", "col0", "-o", "br-windsor",
                "-d", cidr.as_str(), "-j", "ACCEPT",
            ]))
            .await
            .context("Failed to add forwarding rule in guest")?;
        info!(cidr = %cidr, "guest forwarding configured");
        Ok(())
    }

    async fn configure_host_route(&self) -> Result<()> {
        let gateway = self.vm.address().await?;
        let cidr = self.cidr();
        let command = match self.os {
            HostOs::MacOs => ShellCommand::new("sudo").args([
                "route", "-nv", "add", "-net", cidr.as_str(), gateway.as_str(),
            ]),
            HostOs::Linux => ShellCommand::new("sudo").args([
                "ip", "route", "replace", cidr.as_str(), "via", gateway.as_str(),
            ]),
        };
        self.shell
            .run_progress("🔐 Configuring host route", &command)
            .await
            .context("Failed to configure host route")?;
        Ok(())
    }

    async fn configure_dns(&self) -> Result<()> {
        let domain = self.config.get_string("dns.domain", "test");
        let mut address = self.dns_address();
        if address.is_empty() {
            address = self.vm.address().await?;
        }

        let script = match self.os {
            HostOs::MacOs => format!(
                "mkdir -p /etc/resolver && echo 'nameserver {}' > /etc/resolver/{}",
                address, domain
            ),
            HostOs::Linux => format!(
                "resolvectl dns col0 {} && resolvectl domain col0 '~{}'",
                address, domain
            ),
        };
        let command = ShellCommand::new("sudo").arg("sh").arg("-c").arg(script);
        self.shell
            .run_progress("🔐 Configuring DNS resolver", &command)
            .await
            .with_context(|| format!("Failed to configure DNS for {}", domain))?;
        Ok(())
    }
}
