use super::{Shell, ShellCommand, SESSION_RESET_PREFIX};
use crate::progress::Spinner;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{OnceLock, RwLock};
use tokio::process::Command;
use tracing::debug;

const PROJECT_MARKERS: [&str; 2] = ["windsor.yaml", "windsor.yml"];
const SESSION_TOKEN_ENV: &str = "WINDSOR_SESSION_TOKEN";
const PROJECT_ROOT_ENV: &str = "WINDSOR_PROJECT_ROOT";

/// Shell backed by real processes and the local file system
pub struct SystemShell {
    trusted_file: PathBuf,
    project_root: OnceLock<PathBuf>,
    session_token: OnceLock<String>,
    session_env: RwLock<BTreeMap<String, String>>,
}

impl SystemShell {
    pub fn new() -> Self {
        let trusted_file = dirs::home_dir()
            .unwrap_or_else(env::temp_dir)
            .join(".config")
            .join("windsor")
            .join(".trusted");
        Self::with_trusted_file(trusted_file)
    }

    pub fn with_trusted_file(trusted_file: PathBuf) -> Self {
        Self {
            trusted_file,
            project_root: OnceLock::new(),
            session_token: OnceLock::new(),
            session_env: RwLock::new(BTreeMap::new()),
        }
    }

    /// Pins the project root instead of discovering it from the working directory.
    pub fn with_project_root(self, root: PathBuf) -> Self {
        let _ = self.project_root.set(root);
        self
    }

    fn discover_project_root() -> Result<PathBuf> {
        if let Ok(root) = env::var(PROJECT_ROOT_ENV) {
            if !root.is_empty() {
                return Ok(PathBuf::from(root));
            }
        }

        let cwd = env::current_dir().context("Failed to determine current directory")?;
        if let Some(root) = find_upwards(&cwd, |dir| {
            PROJECT_MARKERS.iter().any(|m| dir.join(m).is_file())
        }) {
            return Ok(root);
        }
        if let Some(root) = find_upwards(&cwd, |dir| dir.join(".git").exists()) {
            return Ok(root);
        }
        Ok(cwd)
    }

    fn reset_marker(&self) -> Result<PathBuf> {
        Ok(self
            .project_root()?
            .join(".windsor")
            .join(format!("{}{}", SESSION_RESET_PREFIX, self.session_token())))
    }

    fn build(&self, command: &ShellCommand) -> Command {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(self.session_env.read().unwrap().iter())
            .envs(&command.env);
        if let Some(dir) = &command.dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    fn trusted_entries(&self) -> Result<Vec<PathBuf>> {
        if !self.trusted_file.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.trusted_file)
            .context(format!("Failed to read trusted file {:?}", self.trusted_file))?;
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .collect())
    }
}

impl Default for SystemShell {
    fn default() -> Self {
        Self::new()
    }
}

fn find_upwards(start: &Path, is_root: impl Fn(&Path) -> bool) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| is_root(dir))
        .map(Path::to_path_buf)
}

fn generate_session_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..7].to_string()
}

#[async_trait]
impl Shell for SystemShell {
    async fn run(&self, command: &ShellCommand) -> Result<String> {
        debug!(command = %command, "executing");
        let output = self
            .build(command)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to start {}", command.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "command failed: {} ({}): {}",
                command,
                output.status,
                stderr.trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn run_progress(&self, message: &str, command: &ShellCommand) -> Result<String> {
        let spinner = Spinner::start(message);
        match self.run(command).await {
            Ok(output) => {
                spinner.success();
                Ok(output)
            }
            Err(e) => {
                spinner.failure();
                Err(e)
            }
        }
    }

    async fn run_interactive(&self, command: &ShellCommand) -> Result<i32> {
        debug!(command = %command, "executing interactively");
        let status = self
            .build(command)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .with_context(|| format!("Failed to start {}", command.program))?;

        Ok(status.code().unwrap_or(1))
    }

    fn set_session_env(&self, vars: &BTreeMap<String, String>) {
        self.session_env
            .write()
            .unwrap()
            .extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    fn project_root(&self) -> Result<PathBuf> {
        if let Some(root) = self.project_root.get() {
            return Ok(root.clone());
        }
        let root = Self::discover_project_root()?;
        Ok(self.project_root.get_or_init(|| root).clone())
    }

    fn check_reset_flags(&self) -> Result<bool> {
        if env::var(SESSION_TOKEN_ENV).map(|t| t.is_empty()).unwrap_or(true) {
            return Ok(false);
        }
        let marker = self.reset_marker()?;
        if !marker.exists() {
            return Ok(false);
        }
        fs::remove_file(&marker)
            .context(format!("Failed to remove session marker {:?}", marker))?;
        debug!(marker = %marker.display(), "session reset requested");
        Ok(true)
    }

    fn write_reset_token(&self) -> Result<PathBuf> {
        let marker = self.reset_marker()?;
        if let Some(parent) = marker.parent() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create directory {:?}", parent))?;
        }
        fs::write(&marker, b"")
            .context(format!("Failed to write session marker {:?}", marker))?;
        Ok(marker)
    }

    fn session_token(&self) -> String {
        self.session_token
            .get_or_init(|| {
                env::var(SESSION_TOKEN_ENV)
                    .ok()
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(generate_session_token)
            })
            .clone()
    }

    fn add_current_dir_to_trusted_file(&self) -> Result<()> {
        let root = self.project_root()?;
        let mut entries = self.trusted_entries()?;
        if entries.iter().any(|entry| entry == &root) {
            return Ok(());
        }
        entries.push(root);

        if let Some(parent) = self.trusted_file.parent() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create directory {:?}", parent))?;
        }
        let content: String = entries
            .iter()
            .map(|entry| format!("{}\n", entry.display()))
            .collect();
        fs::write(&self.trusted_file, content)
            .context(format!("Failed to write trusted file {:?}", self.trusted_file))
    }

    fn check_trusted_directory(&self) -> Result<()> {
        let root = self.project_root()?;
        let trusted = self.trusted_entries()?;
        if trusted.iter().any(|entry| root.starts_with(entry)) {
            return Ok(());
        }
        Err(anyhow!(
            "Current directory not in the trusted list. Run `windsor init` to trust {}",
            root.display()
        ))
    }
}
