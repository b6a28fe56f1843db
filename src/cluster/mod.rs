//! Cluster node health
//!
//! A `ClusterClient` answers one question: are these nodes up (and running
//! the expected version)? The blocking wait is bounded by the caller's
//! [`Signal`]; the client must be closed once the caller is done with it,
//! which [`ClusterClientGuard`] guarantees on every exit path.

mod talos;

pub use talos::TalosClusterClient;

use crate::context::Signal;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Blocks until every node is healthy or the signal is done.
    async fn wait_for_nodes_healthy(
        &self,
        signal: &Signal,
        nodes: &[String],
        expected_version: Option<&str>,
    ) -> Result<()>;

    /// Releases connections held by the client.
    fn close(&self);
}

/// Closes the wrapped client when dropped.
pub struct ClusterClientGuard {
    client: Arc<dyn ClusterClient>,
}

impl ClusterClientGuard {
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &dyn ClusterClient {
        self.client.as_ref()
    }
}

impl Drop for ClusterClientGuard {
    fn drop(&mut self) {
        debug!("closing cluster client");
        self.client.close();
    }
}
