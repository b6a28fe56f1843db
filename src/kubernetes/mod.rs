//! Kubernetes API access
//!
//! The manager covers what the orchestrator needs from a cluster: API
//! readiness, node readiness, and applying/removing Flux kustomizations.

mod kubectl;

pub use kubectl::KubectlManager;

use crate::context::Signal;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;

/// Sink for progress lines while waiting on the cluster.
pub type Notify<'a> = &'a (dyn Fn(&str) + Send + Sync);

#[async_trait]
pub trait KubernetesManager: Send + Sync {
    fn initialize(&self) -> Result<()>;

    /// Blocks until the API server at `endpoint` (empty = kubeconfig default)
    /// answers and, when given, every node in `node_names` is Ready.
    async fn wait_for_kubernetes_healthy(
        &self,
        signal: &Signal,
        endpoint: &str,
        output: Notify<'_>,
        node_names: &[String],
    ) -> Result<()>;

    /// Ready condition per requested node. Unknown nodes read as not ready.
    async fn get_node_ready_status(
        &self,
        signal: &Signal,
        node_names: &[String],
    ) -> Result<HashMap<String, bool>>;

    async fn apply_manifest(&self, path: &Path) -> Result<()>;

    async fn delete_kustomization(&self, name: &str, namespace: &str) -> Result<()>;

    /// Ready condition per named kustomization.
    async fn get_kustomization_status(&self, names: &[String]) -> Result<HashMap<String, bool>>;
}
