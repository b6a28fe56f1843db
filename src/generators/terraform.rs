use super::{entries_under, Generator};
use crate::blueprint::RenderedData;
use crate::config::ConfigHandler;
use crate::fs::FileSystem;
use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Writes `terraform/<component>` rendered values as
/// `contexts/<ctx>/terraform/<component>.tfvars`.
pub struct TerraformGenerator {
    config: Arc<dyn ConfigHandler>,
    fs: Arc<dyn FileSystem>,
}

impl TerraformGenerator {
    pub fn new(config: Arc<dyn ConfigHandler>, fs: Arc<dyn FileSystem>) -> Self {
        Self { config, fs }
    }

    /// HCL accepts JSON literals for every value type, so each variable is
    /// written as `name = <json>`.
    pub fn render_tfvars(component: &str, values: &Value) -> Result<String> {
        let Value::Object(map) = values else {
            bail!("terraform values for {} must be a map", component);
        };
        let mut out = format!("# Managed by Windsor CLI for {}\n", component);
        for (name, value) in map {
            let literal = serde_json::to_string(value)
                .with_context(|| format!("Failed to encode {}.{}", component, name))?;
            out.push_str(&format!("{} = {}\n", name, literal));
        }
        Ok(out)
    }
}

impl Generator for TerraformGenerator {
    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    fn generate(&self, data: &RenderedData, overwrite: bool) -> Result<()> {
        let dir = self.config.config_root()?.join("terraform");
        for (component, values) in entries_under(data, "terraform") {
            let path = dir.join(format!("{}.tfvars", component));
            if self.fs.exists(&path) && !overwrite {
                debug!(path = %path.display(), "tfvars exists, keeping");
                continue;
            }
            let content = Self::render_tfvars(component, values)?;
            self.fs.write(&path, content.as_bytes())?;
        }
        Ok(())
    }
}
