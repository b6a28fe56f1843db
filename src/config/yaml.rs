use super::{
    insert, lookup, merge, ConfigHandler, CLEANABLE_CONTEXT_DIRS, CONFIG_FILE_NAMES,
    CONTEXT_ENV, DEFAULT_CONTEXT,
};
use crate::fs::FileSystem;
use crate::shell::Shell;
use anyhow::{Context, Result};
use serde_yaml::{Mapping, Value};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::debug;

const CONFIG_VERSION: &str = "v1alpha1";

#[derive(Default)]
struct State {
    root: Value,
    path: Option<PathBuf>,
    loaded: bool,
    context: Option<String>,
}

/// YAML-backed configuration with a per-context overlay file
pub struct YamlConfigHandler {
    shell: Arc<dyn Shell>,
    fs: Arc<dyn FileSystem>,
    state: RwLock<State>,
}

impl YamlConfigHandler {
    pub fn new(shell: Arc<dyn Shell>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            shell,
            fs,
            state: RwLock::new(State::default()),
        }
    }

    /// Path of the project config file, preferring an existing one.
    pub fn project_config_path(&self) -> Result<PathBuf> {
        let root = self.shell.project_root()?;
        Ok(CONFIG_FILE_NAMES
            .iter()
            .map(|name| root.join(name))
            .find(|path| self.fs.exists(path))
            .unwrap_or_else(|| root.join(CONFIG_FILE_NAMES[0])))
    }

    fn context_file(&self) -> Result<PathBuf> {
        Ok(self.shell.project_root()?.join(".windsor").join("context"))
    }

    fn context_key(&self, key: &str) -> String {
        if key.is_empty() {
            format!("contexts.{}", self.get_context())
        } else {
            format!("contexts.{}.{}", self.get_context(), key)
        }
    }

    fn read_yaml(&self, path: &Path) -> Result<Value> {
        let content = self.fs.read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Value::Mapping(Mapping::new()));
        }
        serde_yaml::from_str(&content).context(format!("Failed to parse {:?}", path))
    }
}

impl ConfigHandler for YamlConfigHandler {
    fn load_config(&self, path: &Path) -> Result<()> {
        let root = self.read_yaml(path)?;
        {
            let mut state = self.state.write().unwrap();
            state.root = root;
            state.path = Some(path.to_path_buf());
            state.loaded = true;
        }
        debug!(path = %path.display(), "loaded project config");
        self.load_context_config()
    }

    fn load_context_config(&self) -> Result<()> {
        let overlay_dir = self.config_root()?;
        let overlay = CONFIG_FILE_NAMES
            .iter()
            .map(|name| overlay_dir.join(name))
            .find(|path| self.fs.exists(path));

        let Some(overlay_path) = overlay else {
            return Ok(());
        };

        let overlay = self.read_yaml(&overlay_path)?;
        let key = self.context_key("");
        let mut state = self.state.write().unwrap();
        let mut scoped = Value::Null;
        insert(&mut scoped, &key, overlay);
        merge(&mut state.root, scoped);
        state.loaded = true;
        debug!(path = %overlay_path.display(), "merged context config");
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.state.read().unwrap().loaded
    }

    fn get_context(&self) -> String {
        if let Some(context) = &self.state.read().unwrap().context {
            return context.clone();
        }
        if let Ok(context) = env::var(CONTEXT_ENV) {
            if !context.is_empty() {
                return context;
            }
        }
        self.context_file()
            .ok()
            .and_then(|path| self.fs.read_to_string(&path).ok())
            .map(|content| content.trim().to_string())
            .filter(|context| !context.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTEXT.to_string())
    }

    fn set_context(&self, name: &str) -> Result<()> {
        let path = self.context_file()?;
        self.fs
            .write(&path, name.as_bytes())
            .context("Failed to persist current context")?;
        self.state.write().unwrap().context = Some(name.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Option<Value> {
        let key = self.context_key(key);
        let state = self.state.read().unwrap();
        lookup(&state.root, &key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let key = self.context_key(key);
        let mut state = self.state.write().unwrap();
        insert(&mut state.root, &key, value);
        Ok(())
    }

    fn set_defaults(&self, defaults: Value) -> Result<()> {
        let key = self.context_key("");
        let mut state = self.state.write().unwrap();
        let mut combined = defaults;
        if let Some(existing) = lookup(&state.root, &key).cloned() {
            merge(&mut combined, existing);
        }
        insert(&mut state.root, &key, combined);
        Ok(())
    }

    fn save_config(&self) -> Result<()> {
        let path = match self.state.read().unwrap().path.clone() {
            Some(path) => path,
            None => self.project_config_path()?,
        };

        let content = {
            let mut state = self.state.write().unwrap();
            if lookup(&state.root, "version").is_none() {
                insert(&mut state.root, "version", Value::from(CONFIG_VERSION));
            }
            state.loaded = true;
            state.path = Some(path.clone());
            serde_yaml::to_string(&state.root).context("Failed to serialize config")?
        };

        self.fs
            .write(&path, content.as_bytes())
            .context("Failed to write project config")
    }

    fn config_root(&self) -> Result<PathBuf> {
        Ok(self
            .shell
            .project_root()?
            .join("contexts")
            .join(self.get_context()))
    }

    fn scratch_path(&self) -> Result<PathBuf> {
        Ok(self
            .shell
            .project_root()?
            .join(".windsor")
            .join("contexts")
            .join(self.get_context()))
    }

    fn clean(&self) -> Result<()> {
        let root = self.config_root()?;
        for dir in CLEANABLE_CONTEXT_DIRS {
            self.fs
                .remove_all(&root.join(dir))
                .with_context(|| format!("error deleting {}", dir))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFileSystem;
    use crate::shell::MockShell;
    use serial_test::serial;

    const PROJECT: &str = r#"
version: v1alpha1
contexts:
  local:
    vm:
      driver: colima
      cpu: 2
    docker:
      enabled: true
"#;

    fn handler() -> (YamlConfigHandler, Arc<MockFileSystem>) {
        let fs = Arc::new(MockFileSystem::new());
        let shell = Arc::new(MockShell::new("/project"));
        (YamlConfigHandler::new(shell, fs.clone()), fs)
    }

    #[test]
    #[serial]
    fn test_layered_load() {
        env::remove_var(CONTEXT_ENV);
        let (handler, fs) = handler();
        fs.add_file("/project/windsor.yaml", PROJECT);
        fs.add_file("/project/contexts/local/windsor.yaml", "vm:\n  cpu: 8\n");

        handler
            .load_config(Path::new("/project/windsor.yaml"))
            .unwrap();

        assert!(handler.is_loaded());
        assert_eq!(handler.get_string("vm.driver", ""), "colima");
        assert_eq!(handler.get_int("vm.cpu", 0), 8);
        assert!(handler.get_bool("docker.enabled", false));
        assert!(!handler.get_bool("dns.enabled", false));
    }

    #[test]
    #[serial]
    fn test_context_resolution_order() {
        env::remove_var(CONTEXT_ENV);
        let (handler, fs) = handler();
        assert_eq!(handler.get_context(), "local");

        fs.add_file("/project/.windsor/context", "staging\n");
        assert_eq!(handler.get_context(), "staging");

        handler.set_context("dev").unwrap();
        assert_eq!(handler.get_context(), "dev");
        assert_eq!(
            fs.read_to_string(Path::new("/project/.windsor/context")).unwrap(),
            "dev"
        );
    }

    #[test]
    #[serial]
    fn test_defaults_do_not_override_and_save() {
        env::remove_var(CONTEXT_ENV);
        let (handler, fs) = handler();
        handler.set("vm.cpu", Value::from(16)).unwrap();
        handler
            .set_defaults(serde_yaml::from_str("vm:\n  cpu: 4\n  driver: colima\n").unwrap())
            .unwrap();

        assert_eq!(handler.get_int("vm.cpu", 0), 16);
        assert_eq!(handler.get_string("vm.driver", ""), "colima");

        handler.save_config().unwrap();
        let saved = fs
            .read_to_string(Path::new("/project/windsor.yaml"))
            .unwrap();
        assert!(saved.contains("version: v1alpha1"));
        assert!(saved.contains("cpu: 16"));
    }

    #[test]
    #[serial]
    fn test_clean_removes_context_state() {
        env::remove_var(CONTEXT_ENV);
        let (handler, fs) = handler();
        handler.clean().unwrap();

        let removed = fs.removed();
        assert_eq!(removed.len(), CLEANABLE_CONTEXT_DIRS.len());
        assert_eq!(removed[0], PathBuf::from("/project/contexts/local/.kube"));
    }
}
