//! Component registry
//!
//! Process-wide store of constructed singletons keyed by name. Resolution is
//! reuse-first: an existing entry of the expected capability always wins over
//! a freshly constructed default, so callers (and tests) can pre-seed
//! collaborators that construction logic must not override.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

pub const SHELL: &str = "shell";
pub const SECURE_SHELL: &str = "secureShell";
pub const CONFIG_HANDLER: &str = "configHandler";
pub const FILE_SYSTEM: &str = "fileSystem";
pub const TOOLS_MANAGER: &str = "toolsManager";
pub const CLUSTER_CLIENT: &str = "clusterClient";
pub const KUBERNETES_MANAGER: &str = "kubernetesManager";
pub const BLUEPRINT_HANDLER: &str = "blueprintHandler";
pub const ARTIFACT_BUILDER: &str = "artifactBuilder";
pub const TEMPLATE_RENDERER: &str = "templateRenderer";
pub const VIRTUAL_MACHINE: &str = "virtualMachine";
pub const CONTAINER_RUNTIME: &str = "containerRuntime";
pub const NETWORK_MANAGER: &str = "networkManager";
pub const STACK: &str = "stack";
pub const GENERATORS: &str = "generators";
pub const ENV_PRINTERS: &str = "envPrinters";
pub const SECRETS_PROVIDERS: &str = "secretsProviders";

/// Result of looking a name up against an expected capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Entry exists and satisfies the capability.
    Hit,
    /// Entry exists under a different capability.
    Mismatch,
    /// Nothing registered.
    Miss,
}

/// String-keyed singleton store.
///
/// Entries are stored as `Arc<T>` behind `dyn Any`; the "capability" of an
/// entry is the `T` it was registered with, usually a trait object.
#[derive(Default)]
pub struct Registry {
    entries: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `component`, replacing any existing entry unconditionally.
    pub fn register<T>(&mut self, name: &str, component: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        debug!(component = name, "registering component");
        self.entries.insert(name.to_string(), Box::new(component));
    }

    pub fn lookup<T>(&self, name: &str) -> Lookup
    where
        T: ?Sized + Send + Sync + 'static,
    {
        match self.entries.get(name) {
            Some(entry) if entry.is::<Arc<T>>() => Lookup::Hit,
            Some(_) => Lookup::Mismatch,
            None => Lookup::Miss,
        }
    }

    /// Returns the entry if present and of capability `T`. A wrong-typed
    /// entry reads as absent.
    pub fn resolve<T>(&self, name: &str) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.entries
            .get(name)
            .and_then(|entry| entry.downcast_ref::<Arc<T>>())
            .cloned()
    }

    /// Reuse-first resolution: an existing entry of capability `T` is
    /// returned untouched; on a miss or a capability mismatch `construct` runs
    /// and its result replaces the entry.
    pub fn resolve_or_construct<T, F>(&mut self, name: &str, construct: F) -> Arc<T>
    where
        T: ?Sized + Send + Sync + 'static,
        F: FnOnce() -> Arc<T>,
    {
        if let Some(existing) = self.resolve::<T>(name) {
            debug!(component = name, "reusing registered component");
            return existing;
        }
        let component = construct();
        self.register(name, component.clone());
        component
    }

    /// Fallible variant of [`Registry::resolve_or_construct`]. Nothing is
    /// registered when construction fails.
    pub fn try_resolve_or_construct<T, F>(&mut self, name: &str, construct: F) -> Result<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
        F: FnOnce() -> Result<Arc<T>>,
    {
        if let Some(existing) = self.resolve::<T>(name) {
            debug!(component = name, "reusing registered component");
            return Ok(existing);
        }
        let component = construct()?;
        self.register(name, component.clone());
        Ok(component)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;
    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    struct French;
    impl Greeter for French {
        fn greet(&self) -> String {
            "bonjour".to_string()
        }
    }

    #[test]
    fn test_register_replaces_existing() {
        let mut registry = Registry::new();
        registry.register::<dyn Greeter>("greeter", Arc::new(English));
        registry.register::<dyn Greeter>("greeter", Arc::new(French));

        let greeter = registry.resolve::<dyn Greeter>("greeter").unwrap();
        assert_eq!(greeter.greet(), "bonjour");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_preseeded_entry_skips_constructor() {
        let mut registry = Registry::new();
        let seeded: Arc<dyn Greeter> = Arc::new(French);
        registry.register("greeter", seeded.clone());

        let constructed = AtomicBool::new(false);
        let resolved = registry.resolve_or_construct::<dyn Greeter, _>("greeter", || {
            constructed.store(true, Ordering::SeqCst);
            Arc::new(English)
        });

        assert!(!constructed.load(Ordering::SeqCst));
        assert!(Arc::ptr_eq(&resolved, &seeded));
    }

    #[test]
    fn test_miss_constructs_and_caches() {
        let mut registry = Registry::new();
        assert_eq!(registry.lookup::<dyn Greeter>("greeter"), Lookup::Miss);

        let first = registry.resolve_or_construct::<dyn Greeter, _>("greeter", || Arc::new(English));
        let second =
            registry.resolve_or_construct::<dyn Greeter, _>("greeter", || Arc::new(French));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.greet(), "hello");
    }

    #[test]
    fn test_capability_mismatch_reconstructs() {
        let mut registry = Registry::new();
        registry.register("greeter", Arc::new(42u32));
        assert_eq!(registry.lookup::<dyn Greeter>("greeter"), Lookup::Mismatch);
        assert!(registry.resolve::<dyn Greeter>("greeter").is_none());

        let greeter = registry.resolve_or_construct::<dyn Greeter, _>("greeter", || Arc::new(English));
        assert_eq!(greeter.greet(), "hello");
        assert_eq!(registry.lookup::<dyn Greeter>("greeter"), Lookup::Hit);
    }

    #[test]
    fn test_failed_construction_registers_nothing() {
        let mut registry = Registry::new();
        let result = registry.try_resolve_or_construct::<dyn Greeter, _>("greeter", || {
            Err(anyhow::anyhow!("boom"))
        });

        assert!(result.is_err());
        assert!(!registry.contains("greeter"));
    }
}
