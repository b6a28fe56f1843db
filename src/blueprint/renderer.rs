use super::{RenderedData, TemplateData};
use crate::config::ConfigHandler;
use crate::fs::FileSystem;
use crate::shell::{Shell, ShellCommand};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait TemplateRenderer: Send + Sync {
    /// Evaluates every template in `data`, inserting results into `rendered`
    /// under the template path minus its extension.
    async fn process(&self, data: &TemplateData, rendered: &mut RenderedData) -> Result<()>;
}

/// Logical key of a template file: its path without the extension.
pub fn template_key(path: &str) -> String {
    let file_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[file_start..].rfind('.') {
        Some(dot) if dot > 0 => path[..file_start + dot].to_string(),
        _ => path.to_string(),
    }
}

/// Renders `.jsonnet` through the `jsonnet` binary and parses `.yaml`,
/// `.yml` and `.json` directly. Other files are skipped.
pub struct JsonnetTemplateRenderer {
    shell: Arc<dyn Shell>,
    config: Arc<dyn ConfigHandler>,
    fs: Arc<dyn FileSystem>,
}

impl JsonnetTemplateRenderer {
    pub fn new(
        shell: Arc<dyn Shell>,
        config: Arc<dyn ConfigHandler>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self { shell, config, fs }
    }

    /// Context values exposed to templates as `std.extVar('context')`.
    fn context_json(&self) -> Result<String> {
        let mut context = match self.config.get("") {
            Some(value) => serde_json::to_value(value).context("Failed to convert config")?,
            None => Value::Object(Default::default()),
        };
        if let Value::Object(map) = &mut context {
            map.insert("name".to_string(), Value::from(self.config.get_context()));
            map.insert(
                "projectName".to_string(),
                Value::from(
                    self.shell
                        .project_root()?
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default(),
                ),
            );
        }
        Ok(serde_json::to_string(&context)?)
    }

    /// Copies the template set to scratch space so imports resolve.
    fn stage(&self, data: &TemplateData, dir: &Path) -> Result<()> {
        self.fs.remove_all(dir)?;
        for (path, content) in data {
            self.fs.write(&dir.join(path), content)?;
        }
        Ok(())
    }

    async fn evaluate(&self, dir: &Path, path: &str, context: &str) -> Result<Value> {
        let output = self
            .shell
            .run(
                &ShellCommand::new("jsonnet")
                    .arg("-J")
                    .arg(dir.display().to_string())
                    .arg("--ext-code")
                    .arg(format!("context={}", context))
                    .arg(dir.join(path).display().to_string()),
            )
            .await?;
        serde_json::from_str(&output).with_context(|| format!("{} did not evaluate to JSON", path))
    }
}

#[async_trait]
impl TemplateRenderer for JsonnetTemplateRenderer {
    async fn process(&self, data: &TemplateData, rendered: &mut RenderedData) -> Result<()> {
        let needs_jsonnet = data.keys().any(|p| p.ends_with(".jsonnet"));
        let dir = self.config.scratch_path()?.join(".templates");
        let context = if needs_jsonnet {
            self.stage(data, &dir)?;
            self.context_json()?
        } else {
            String::new()
        };

        for (path, content) in data {
            let value = if path.ends_with(".jsonnet") {
                self.evaluate(&dir, path, &context).await?
            } else if path.ends_with(".yaml") || path.ends_with(".yml") {
                serde_yaml::from_slice(content)
                    .with_context(|| format!("Failed to parse {}", path))?
            } else if path.ends_with(".json") {
                serde_json::from_slice(content)
                    .with_context(|| format!("Failed to parse {}", path))?
            } else {
                debug!(path = %path, "skipping non-template file");
                continue;
            };
            rendered.insert(template_key(path), value);
        }
        Ok(())
    }
}
