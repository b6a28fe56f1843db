//! Host and guest networking for the local VM
//!
//! The guest forwards traffic from the host into the cluster network, the
//! host routes the cluster CIDR through the VM, and the context's DNS domain
//! resolves through the DNS service started by the container runtime.

mod colima;

pub use colima::ColimaNetworkManager;

use anyhow::Result;
use async_trait::async_trait;

pub const DEFAULT_CIDR_BLOCK: &str = "10.5.0.0/16";

#[async_trait]
pub trait NetworkManager: Send + Sync {
    fn initialize(&self) -> Result<()>;

    /// Forwarding rules inside the VM.
    async fn configure_guest(&self) -> Result<()>;

    /// Route from the host to the cluster CIDR via the VM.
    async fn configure_host_route(&self) -> Result<()>;

    /// Resolver for the context's DNS domain.
    async fn configure_dns(&self) -> Result<()>;
}
