//! Required external tools
//!
//! Which tools a context needs is derived from its configuration; the
//! manager checks installed versions and installs missing tools through aqua.

mod manager;
mod version;

pub use manager::{ShellToolsManager, ToolRequirement};
pub use version::{extract_version, Version};

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ToolsManager: Send + Sync {
    fn initialize(&self) -> Result<()>;

    /// Fails when a required tool is missing or older than its minimum.
    async fn check(&self) -> Result<()>;

    async fn install(&self) -> Result<()>;

    /// Writes the aqua manifest for the required tools if none exists.
    fn write_manifest(&self) -> Result<()>;
}
