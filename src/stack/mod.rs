//! Terraform-managed infrastructure stack

mod terraform;

pub use terraform::TerraformStack;

use crate::blueprint::Blueprint;
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait Stack: Send + Sync {
    fn initialize(&self) -> Result<()>;

    /// Applies every terraform component of the current blueprint, in order.
    async fn up(&self) -> Result<()>;

    /// Destroys the components of `blueprint` in reverse order.
    async fn down(&self, blueprint: &Blueprint) -> Result<()>;
}
