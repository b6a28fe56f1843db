//! Pipelines: one per CLI operation
//!
//! A pipeline is initialized exactly once against a [`Registry`], which wires
//! its collaborators, and then executed once against an [`ExecContext`].
//! Lifecycle plumbing shared by all of them lives in [`base::BasePipeline`].

pub mod base;
mod check;
mod context;
mod down;
mod env;
mod exec;
mod factory;
#[cfg(test)]
pub(crate) mod fakes;
mod hook;
mod init;
mod install;
mod up;

pub use check::CheckPipeline;
pub use context::ContextPipeline;
pub use down::{DownPipeline, CLEAN_PATHS};
pub use env::EnvPipeline;
pub use exec::ExecPipeline;
pub use factory::{PipelineFactory, PipelineKind};
pub use hook::HookPipeline;
pub use init::InitPipeline;
pub use install::InstallPipeline;
pub use up::UpPipeline;

use crate::context::ExecContext;
use crate::registry::Registry;
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Resolves and initializes collaborators. Called once, before `execute`.
    fn initialize(&mut self, registry: &mut Registry, ctx: &ExecContext) -> Result<()>;

    /// Runs the operation. Never mutates the registry.
    async fn execute(&self, ctx: &ExecContext) -> Result<()>;
}
