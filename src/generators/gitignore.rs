use super::Generator;
use crate::blueprint::RenderedData;
use crate::fs::FileSystem;
use crate::shell::Shell;
use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

const GITIGNORE_ENTRIES: [&str; 9] = [
    "# managed by windsor cli",
    ".windsor/",
    ".volumes/",
    "terraform_override.tf.json",
    "contexts/**/.terraform/",
    "contexts/**/.tfstate/",
    "contexts/**/.kube/",
    "contexts/**/.talos/",
    "contexts/**/.aws/",
];

/// Keeps the project `.gitignore` covering generated state.
pub struct GitGenerator {
    shell: Arc<dyn Shell>,
    fs: Arc<dyn FileSystem>,
}

impl GitGenerator {
    pub fn new(shell: Arc<dyn Shell>, fs: Arc<dyn FileSystem>) -> Self {
        Self { shell, fs }
    }
}

impl Generator for GitGenerator {
    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    fn generate(&self, _data: &RenderedData, _overwrite: bool) -> Result<()> {
        let path = self.shell.project_root()?.join(".gitignore");
        let mut content = if self.fs.exists(&path) {
            self.fs.read_to_string(&path)?
        } else {
            String::new()
        };

        let existing: Vec<String> = content.lines().map(|l| l.trim().to_string()).collect();
        let missing: Vec<&str> = GITIGNORE_ENTRIES
            .iter()
            .copied()
            .filter(|entry| !existing.iter().any(|line| line == entry))
            .collect();
        if missing.is_empty() {
            debug!(".gitignore already up to date");
            return Ok(());
        }

        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        if !content.is_empty() {
            content.push('\n');
        }
        for entry in missing {
            content.push_str(entry);
            content.push('\n');
        }
        self.fs.write(&path, content.as_bytes())
    }
}
