//! windsor - lifecycle orchestrator for local development clusters
//!
//! Every CLI operation is a [`pipelines::Pipeline`]: it is initialized once
//! against a [`registry::Registry`], which wires its collaborators (shell,
//! configuration, virtual machine, container runtime, network, terraform
//! stack, blueprint handler and friends), and then executed against an
//! [`context::ExecContext`] carrying the operation's parameters.
//!
//! ```ignore
//! use windsor::context::{ExecContext, ExecParams};
//! use windsor::pipelines::{PipelineFactory, PipelineKind};
//! use windsor::registry::Registry;
//!
//! async fn up() -> anyhow::Result<()> {
//!     let mut registry = Registry::new();
//!     let ctx = ExecContext::new(ExecParams::new());
//!     PipelineFactory::run(&mut registry, PipelineKind::Up, &ctx).await
//! }
//! ```
//!
//! # Project Structure
//!
//! - [`pipelines`]: one pipeline per operation, plus the factory
//! - [`registry`]: named component registry with reuse-first resolution
//! - [`blueprint`]: blueprint model, template resolution and rendering
//! - [`health`]: node and Kubernetes health verification

pub mod blueprint;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod context;
pub mod env;
pub mod error;
pub mod fs;
pub mod generators;
pub mod health;
pub mod kubernetes;
pub mod network;
pub mod pipelines;
pub mod progress;
pub mod registry;
pub mod shell;
pub mod stack;
pub mod tools;
pub mod util;
pub mod virt;

pub use context::{ExecContext, ExecParams};
pub use error::WindsorError;
pub use pipelines::{Pipeline, PipelineFactory, PipelineKind};
pub use registry::Registry;
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name_is_windsor() {
        assert_eq!(NAME, "windsor");
    }
}
