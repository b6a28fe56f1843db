//! Local virtualization: the VM hosting the cluster and the container
//! runtime services next to it

mod colima;
mod docker;

pub use colima::ColimaVirt;
pub use docker::DockerVirt;

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait VirtualMachine: Send + Sync {
    fn initialize(&self) -> Result<()>;

    async fn up(&self) -> Result<()>;

    async fn down(&self) -> Result<()>;

    /// Address of the running VM on the host network.
    async fn address(&self) -> Result<String>;
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    fn initialize(&self) -> Result<()>;

    async fn up(&self) -> Result<()>;

    async fn down(&self) -> Result<()>;
}

/// Colima profile backing a context.
pub fn colima_profile(context: &str) -> String {
    format!("windsor-{}", context)
}
