use super::{entries_under, Generator};
use crate::blueprint::RenderedData;
use crate::config::ConfigHandler;
use crate::fs::FileSystem;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::debug;

/// Writes `patches/<name>` rendered values as
/// `contexts/<ctx>/patches/<name>.yaml`.
pub struct KustomizeGenerator {
    config: Arc<dyn ConfigHandler>,
    fs: Arc<dyn FileSystem>,
}

impl KustomizeGenerator {
    pub fn new(config: Arc<dyn ConfigHandler>, fs: Arc<dyn FileSystem>) -> Self {
        Self { config, fs }
    }
}

impl Generator for KustomizeGenerator {
    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    fn generate(&self, data: &RenderedData, overwrite: bool) -> Result<()> {
        let dir = self.config.config_root()?.join("patches");
        for (name, value) in entries_under(data, "patches") {
            let path = dir.join(format!("{}.yaml", name));
            if self.fs.exists(&path) && !overwrite {
                debug!(path = %path.display(), "patch exists, keeping");
                continue;
            }
            let content = serde_yaml::to_string(value)
                .with_context(|| format!("Failed to serialize patch {}", name))?;
            self.fs.write(&path, content.as_bytes())?;
        }
        Ok(())
    }
}
