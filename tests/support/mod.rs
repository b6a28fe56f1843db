//! Shared helpers for integration tests

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

/// A scratch project with its own home directory for the trusted list.
pub struct Project {
    pub temp: TempDir,
}

impl Project {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        fs::create_dir_all(temp.path().join("project")).expect("Failed to create project dir");
        fs::create_dir_all(temp.path().join("home")).expect("Failed to create home dir");
        Self { temp }
    }

    pub fn root(&self) -> PathBuf {
        self.temp.path().join("project")
    }

    pub fn home(&self) -> PathBuf {
        self.temp.path().join("home")
    }

    pub fn write(&self, relative: &str, content: &str) {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        fs::write(&path, content).expect("Failed to write file");
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.root().join(relative))
            .unwrap_or_else(|e| panic!("Failed to read {}: {}", relative, e))
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.root().join(relative).exists()
    }

    pub fn trust(&self) {
        let file = self.home().join(".config/windsor/.trusted");
        fs::create_dir_all(file.parent().unwrap()).expect("Failed to create config dir");
        fs::write(file, format!("{}\n", self.root().display())).expect("Failed to write trusted file");
    }

    /// Runs the binary inside the project with a clean windsor environment.
    pub fn windsor(&self, args: &[&str]) -> Output {
        self.windsor_with_env(args, &[])
    }

    pub fn windsor_with_env(&self, args: &[&str], env: &[(&str, &str)]) -> Output {
        let mut command = Command::new(env!("CARGO_BIN_EXE_windsor"));
        command
            .args(args)
            .current_dir(self.root())
            .env("HOME", self.home())
            .env("WINDSOR_PROJECT_ROOT", self.root())
            .env_remove("WINDSOR_CONTEXT")
            .env_remove("WINDSOR_SESSION_TOKEN")
            .env_remove("WINDSOR_MANAGED_ENV")
            .env_remove("RUST_LOG");
        for (key, value) in env {
            command.env(key, value);
        }
        command.output().expect("Failed to run windsor")
    }
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}
