use super::SecretsProvider;
use crate::config::{lookup, ConfigHandler};
use crate::fs::FileSystem;
use crate::shell::{Shell, ShellCommand};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use regex::{Captures, Regex};
use serde_yaml::Value;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tokio::sync::OnceCell;
use tracing::debug;

const SECRETS_FILE: &str = "secrets.enc.yaml";

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{\{\s*sops\.([A-Za-z0-9_.\-]+)\s*\}\}").expect("valid sops pattern")
    })
}

/// Resolves `${{ sops.a.b }}` from the context's sops-encrypted secrets file.
///
/// The file is decrypted at most once per process.
pub struct SopsSecretsProvider {
    shell: Arc<dyn Shell>,
    config: Arc<dyn ConfigHandler>,
    fs: Arc<dyn FileSystem>,
    secrets: OnceCell<Value>,
}

impl SopsSecretsProvider {
    pub fn new(
        shell: Arc<dyn Shell>,
        config: Arc<dyn ConfigHandler>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            shell,
            config,
            fs,
            secrets: OnceCell::new(),
        }
    }

    fn secrets_path(&self) -> Result<PathBuf> {
        Ok(self.config.config_root()?.join(SECRETS_FILE))
    }

    async fn secrets(&self) -> Result<&Value> {
        self.secrets
            .get_or_try_init(|| async {
                let path = self.secrets_path()?;
                if !self.fs.exists(&path) {
                    return Err(anyhow!("secrets file {} not found", path.display()));
                }
                debug!(path = %path.display(), "decrypting secrets");
                let plain = self
                    .shell
                    .run(
                        &ShellCommand::new("sops")
                            .args(["-d", "--output-type", "yaml"])
                            .arg(path.display().to_string()),
                    )
                    .await
                    .context("Failed to decrypt secrets")?;
                serde_yaml::from_str(&plain).context("Failed to parse decrypted secrets")
            })
            .await
    }
}

#[async_trait]
impl SecretsProvider for SopsSecretsProvider {
    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn parse_secrets(&self, input: &str) -> Result<String> {
        let pattern = reference_pattern();
        if !pattern.is_match(input) {
            return Ok(input.to_string());
        }
        let secrets = self.secrets().await?;

        let mut missing = None;
        let output = pattern.replace_all(input, |caps: &Captures| {
            let key = &caps[1];
            match lookup(secrets, key) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::Bool(b)) => b.to_string(),
                _ => {
                    missing.get_or_insert_with(|| key.to_string());
                    String::new()
                }
            }
        });
        if let Some(key) = missing {
            return Err(anyhow!("secret sops.{} not found", key));
        }
        Ok(output.into_owned())
    }
}
