use super::{Shell, ShellCommand};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Runs commands inside a guest by prefixing them with a remote-exec command
/// (`colima ssh --profile <p> --`, `ssh host --`, ...).
///
/// Project-level state is delegated to the local shell.
pub struct SecureShell {
    local: Arc<dyn Shell>,
    prefix: Vec<String>,
}

impl SecureShell {
    pub fn new(local: Arc<dyn Shell>, prefix: Vec<String>) -> Self {
        Self { local, prefix }
    }

    pub fn colima(local: Arc<dyn Shell>, profile: &str) -> Self {
        Self::new(
            local,
            vec![
                "colima".to_string(),
                "ssh".to_string(),
                "--profile".to_string(),
                profile.to_string(),
                "--".to_string(),
            ],
        )
    }

    fn wrap(&self, command: &ShellCommand) -> ShellCommand {
        let (program, rest) = match self.prefix.split_first() {
            Some((program, rest)) => (program.clone(), rest.to_vec()),
            None => return command.clone(),
        };
        let mut wrapped = ShellCommand::new(program).args(rest);
        wrapped = wrapped.arg(command.program.clone()).args(command.args.clone());
        wrapped.env = command.env.clone();
        wrapped.dir = command.dir.clone();
        wrapped
    }
}

#[async_trait]
impl Shell for SecureShell {
    async fn run(&self, command: &ShellCommand) -> Result<String> {
        self.local.run(&self.wrap(command)).await
    }

    async fn run_progress(&self, message: &str, command: &ShellCommand) -> Result<String> {
        self.local.run_progress(message, &self.wrap(command)).await
    }

    async fn run_interactive(&self, command: &ShellCommand) -> Result<i32> {
        self.local.run_interactive(&self.wrap(command)).await
    }

    fn set_session_env(&self, vars: &BTreeMap<String, String>) {
        self.local.set_session_env(vars)
    }

    fn project_root(&self) -> Result<PathBuf> {
        self.local.project_root()
    }

    fn check_reset_flags(&self) -> Result<bool> {
        self.local.check_reset_flags()
    }

    fn write_reset_token(&self) -> Result<PathBuf> {
        self.local.write_reset_token()
    }

    fn session_token(&self) -> String {
        self.local.session_token()
    }

    fn add_current_dir_to_trusted_file(&self) -> Result<()> {
        self.local.add_current_dir_to_trusted_file()
    }

    fn check_trusted_directory(&self) -> Result<()> {
        self.local.check_trusted_directory()
    }
}
