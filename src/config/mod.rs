//! Layered project configuration
//!
//! Configuration lives in `windsor.yaml` at the project root under
//! `contexts.<name>`, optionally overlaid by `contexts/<name>/windsor.yaml`.
//! Lookups are dotted keys relative to the current context
//! (`vm.driver`, `docker.enabled`, ...).

mod defaults;
mod yaml;

pub use defaults::default_context_config;
pub use yaml::YamlConfigHandler;

use anyhow::Result;
use serde_yaml::Value;
use std::path::PathBuf;

pub const DEFAULT_CONTEXT: &str = "local";
pub const CONTEXT_ENV: &str = "WINDSOR_CONTEXT";
pub const CONFIG_FILE_NAMES: [&str; 2] = ["windsor.yaml", "windsor.yml"];

/// Directories below a context's config root that `clean` removes.
pub const CLEANABLE_CONTEXT_DIRS: [&str; 6] =
    [".kube", ".talos", ".omni", ".aws", ".terraform", ".tfstate"];

pub trait ConfigHandler: Send + Sync {
    /// Loads the project file at `path` and the current context's overlay.
    fn load_config(&self, path: &std::path::Path) -> Result<()>;

    /// Re-reads `contexts/<ctx>/windsor.yaml` and merges it over the loaded config.
    fn load_context_config(&self) -> Result<()>;

    fn is_loaded(&self) -> bool;

    fn get_context(&self) -> String;

    /// Persists `name` as the current context.
    fn set_context(&self, name: &str) -> Result<()>;

    /// Raw value at a dotted key below the current context.
    fn get(&self, key: &str) -> Option<Value>;

    /// Sets a dotted key below the current context.
    fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Applies `defaults` below the current context without overriding set keys.
    fn set_defaults(&self, defaults: Value) -> Result<()>;

    /// Writes the project file.
    fn save_config(&self) -> Result<()>;

    /// `<project>/contexts/<ctx>`
    fn config_root(&self) -> Result<PathBuf>;

    /// `<project>/.windsor/contexts/<ctx>`
    fn scratch_path(&self) -> Result<PathBuf>;

    /// Removes generated state below the context's config root.
    fn clean(&self) -> Result<()>;

    fn get_string(&self, key: &str, default: &str) -> String {
        match self.get(key) {
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => default.to_string(),
        }
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(Value::Bool(b)) => b,
            _ => default,
        }
    }

    fn get_int(&self, key: &str, default: i64) -> i64 {
        match self.get(key) {
            Some(Value::Number(n)) => n.as_i64().unwrap_or(default),
            _ => default,
        }
    }

    fn get_string_slice(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(Value::Sequence(items)) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Walks a mapping tree along `.`-separated keys.
pub fn lookup<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.')
        .filter(|part| !part.is_empty())
        .try_fold(root, |node, part| node.as_mapping()?.get(part))
}

/// Sets `value` at the `.`-separated `key`, creating intermediate mappings.
pub fn insert(root: &mut Value, key: &str, value: Value) {
    let parts: Vec<&str> = key.split('.').filter(|p| !p.is_empty()).collect();
    let mut node = root;
    for (i, part) in parts.iter().enumerate() {
        if !node.is_mapping() {
            *node = Value::Mapping(Default::default());
        }
        let Value::Mapping(map) = node else {
            unreachable!("node was just made a mapping")
        };
        let k = Value::String(part.to_string());
        if i == parts.len() - 1 {
            map.insert(k, value);
            return;
        }
        node = map
            .entry(k)
            .or_insert_with(|| Value::Mapping(Default::default()));
    }
}

/// Deep merge: mappings merge key by key, everything else in `overlay` wins.
pub fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn test_lookup_nested() {
        let root = yaml("vm:\n  driver: colima\n  cpu: 4\n");
        assert_eq!(lookup(&root, "vm.driver"), Some(&Value::from("colima")));
        assert!(lookup(&root, "vm.memory").is_none());
        assert!(lookup(&root, "vm.driver.deeper").is_none());
    }

    #[test]
    fn test_insert_creates_intermediate_maps() {
        let mut root = Value::Null;
        insert(&mut root, "dns.domain", Value::from("test"));
        insert(&mut root, "dns.enabled", Value::from(true));
        assert_eq!(root, yaml("dns:\n  domain: test\n  enabled: true\n"));
    }

    #[test]
    fn test_merge_overlay_wins_and_maps_merge() {
        let mut base = yaml("vm:\n  driver: colima\n  cpu: 2\nnodes: [a, b]\n");
        merge(&mut base, yaml("vm:\n  cpu: 8\nnodes: [c]\n"));
        assert_eq!(
            base,
            yaml("vm:\n  driver: colima\n  cpu: 8\nnodes: [c]\n")
        );
    }
}
