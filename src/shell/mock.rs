use super::{Shell, ShellCommand};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Mutex;

/// A command seen by [`MockShell`]
#[derive(Debug, Clone)]
pub struct RecordedCommand {
    pub command: ShellCommand,
    pub interactive: bool,
}

/// Shell double that records commands and replays canned output.
///
/// Responses are matched on the command's program followed by its leading
/// arguments; the longest registered prefix wins.
pub struct MockShell {
    root: PathBuf,
    responses: Mutex<HashMap<String, Result<String, String>>>,
    recorded: Mutex<Vec<RecordedCommand>>,
    trusted: Mutex<bool>,
    reset: Mutex<bool>,
    session_env: Mutex<BTreeMap<String, String>>,
}

impl MockShell {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            responses: Mutex::new(HashMap::new()),
            recorded: Mutex::new(Vec::new()),
            trusted: Mutex::new(true),
            reset: Mutex::new(false),
            session_env: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn respond(&self, prefix: &str, output: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(prefix.to_string(), Ok(output.to_string()));
    }

    pub fn fail(&self, prefix: &str, error: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(prefix.to_string(), Err(error.to_string()));
    }

    pub fn set_trusted(&self, trusted: bool) {
        *self.trusted.lock().unwrap() = trusted;
    }

    pub fn request_reset(&self) {
        *self.reset.lock().unwrap() = true;
    }

    pub fn recorded(&self) -> Vec<RecordedCommand> {
        self.recorded.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.recorded()
            .iter()
            .map(|r| r.command.to_string())
            .collect()
    }

    fn respond_to(&self, command: &ShellCommand, interactive: bool) -> Result<String> {
        let mut recorded = command.clone();
        for (key, value) in self.session_env.lock().unwrap().iter() {
            recorded.env.entry(key.clone()).or_insert_with(|| value.clone());
        }
        self.recorded.lock().unwrap().push(RecordedCommand {
            command: recorded,
            interactive,
        });

        let line = command.to_string();
        let responses = self.responses.lock().unwrap();
        let best = responses
            .iter()
            .filter(|(prefix, _)| line.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len());

        match best {
            Some((_, Ok(output))) => Ok(output.clone()),
            Some((_, Err(error))) => Err(anyhow!("{}", error)),
            None => Ok(String::new()),
        }
    }
}

#[async_trait]
impl Shell for MockShell {
    async fn run(&self, command: &ShellCommand) -> Result<String> {
        self.respond_to(command, false)
    }

    async fn run_progress(&self, _message: &str, command: &ShellCommand) -> Result<String> {
        self.respond_to(command, false)
    }

    async fn run_interactive(&self, command: &ShellCommand) -> Result<i32> {
        self.respond_to(command, true).map(|_| 0)
    }

    fn set_session_env(&self, vars: &BTreeMap<String, String>) {
        self.session_env
            .lock()
            .unwrap()
            .extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    fn project_root(&self) -> Result<PathBuf> {
        Ok(self.root.clone())
    }

    fn check_reset_flags(&self) -> Result<bool> {
        let mut reset = self.reset.lock().unwrap();
        let requested = *reset;
        *reset = false;
        Ok(requested)
    }

    fn write_reset_token(&self) -> Result<PathBuf> {
        *self.reset.lock().unwrap() = true;
        Ok(self.root.join(".windsor/.session.mock"))
    }

    fn session_token(&self) -> String {
        "mock".to_string()
    }

    fn add_current_dir_to_trusted_file(&self) -> Result<()> {
        *self.trusted.lock().unwrap() = true;
        Ok(())
    }

    fn check_trusted_directory(&self) -> Result<()> {
        if *self.trusted.lock().unwrap() {
            Ok(())
        } else {
            Err(anyhow!("Current directory not in the trusted list"))
        }
    }
}
