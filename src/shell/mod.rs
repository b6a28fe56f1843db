//! Process execution and project-level shell state
//!
//! The `Shell` capability runs external programs and owns the small amount
//! of on-disk state the CLI keeps per project: the project root, the trusted
//! directory list and session reset tokens.

mod command;
mod mock;
mod secure;
mod system;

pub use command::ShellCommand;
pub use mock::{MockShell, RecordedCommand};
pub use secure::SecureShell;
pub use system::SystemShell;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Marker file prefix below `.windsor/` that signals a session reset.
pub const SESSION_RESET_PREFIX: &str = ".session.";

#[async_trait]
pub trait Shell: Send + Sync {
    /// Runs a command to completion and returns its trimmed stdout.
    async fn run(&self, command: &ShellCommand) -> Result<String>;

    /// Like [`Shell::run`] but shows a spinner with `message` meanwhile.
    async fn run_progress(&self, message: &str, command: &ShellCommand) -> Result<String>;

    /// Runs a command attached to the terminal and returns its exit code.
    async fn run_interactive(&self, command: &ShellCommand) -> Result<i32>;

    /// Variables added to every command spawned afterwards. A command's own
    /// `env` entries take precedence.
    fn set_session_env(&self, vars: &BTreeMap<String, String>);

    /// Directory holding `windsor.yaml`, or the nearest git root.
    fn project_root(&self) -> Result<PathBuf>;

    /// Returns true (and consumes the marker) when a session reset was requested.
    fn check_reset_flags(&self) -> Result<bool>;

    /// Writes a session reset marker for the current session token.
    fn write_reset_token(&self) -> Result<PathBuf>;

    fn session_token(&self) -> String;

    /// Adds the project root to the trusted directory list.
    fn add_current_dir_to_trusted_file(&self) -> Result<()>;

    /// Fails unless the project root (or a parent) is trusted.
    fn check_trusted_directory(&self) -> Result<()>;
}
