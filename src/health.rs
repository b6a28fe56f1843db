//! Node and Kubernetes health verification
//!
//! Two independent checks, at least one of which must be requested:
//!
//! - node health through the cluster client, bounded by `--timeout`;
//! - Kubernetes API health (optionally with node readiness) through the
//!   Kubernetes manager.
//!
//! When both are requested a node-health failure only warns, since the
//! Kubernetes check can still vouch for the cluster.

use crate::cluster::{ClusterClient, ClusterClientGuard};
use crate::context::{ExecContext, ExecParams};
use crate::error::WindsorError;
use crate::kubernetes::KubernetesManager;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const NO_HEALTH_CHECKS: &str = "No health checks specified. Use --nodes and/or --k8s-endpoint flags to specify health checks to perform";
pub const READY_REQUIRES_NODES: &str = "--ready flag requires --nodes to be specified";

/// `--k8s-endpoint` given without a value.
const DEFAULT_ENDPOINT_SENTINEL: &str = "true";

/// What to verify, taken from the execution parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthRequest {
    pub nodes: Vec<String>,
    pub version: Option<String>,
    pub timeout: Option<Duration>,
    pub k8s_endpoint: Option<String>,
    pub k8s_endpoint_provided: bool,
    pub check_node_ready: bool,
}

impl HealthRequest {
    pub fn from_params(params: &ExecParams) -> Self {
        Self {
            nodes: params.nodes().to_vec(),
            version: ExecParams::non_empty(&params.version).map(str::to_string),
            timeout: params.timeout,
            k8s_endpoint: params.k8s_endpoint.clone(),
            k8s_endpoint_provided: ExecParams::flag(params.k8s_endpoint_provided),
            check_node_ready: ExecParams::flag(params.check_node_ready),
        }
    }

    /// Fails before any I/O when the request cannot be served.
    pub fn validate(&self) -> Result<(), WindsorError> {
        if self.nodes.is_empty() && !self.k8s_endpoint_provided {
            return Err(WindsorError::validation(NO_HEALTH_CHECKS));
        }
        if self.k8s_endpoint_provided && self.check_node_ready && self.nodes.is_empty() {
            return Err(WindsorError::validation(READY_REQUIRES_NODES));
        }
        Ok(())
    }

    /// Explicit endpoint, with the bare-flag sentinel meaning "kubeconfig default".
    pub fn endpoint(&self) -> &str {
        match self.k8s_endpoint.as_deref() {
            Some(DEFAULT_ENDPOINT_SENTINEL) | None => "",
            Some(endpoint) => endpoint,
        }
    }
}

pub struct HealthChecker {
    cluster: Option<Arc<dyn ClusterClient>>,
    kubernetes: Option<Arc<dyn KubernetesManager>>,
}

impl HealthChecker {
    pub fn new(
        cluster: Option<Arc<dyn ClusterClient>>,
        kubernetes: Option<Arc<dyn KubernetesManager>>,
    ) -> Self {
        Self {
            cluster,
            kubernetes,
        }
    }

    pub async fn verify(&self, ctx: &ExecContext) -> Result<()> {
        let request = HealthRequest::from_params(ctx.params());
        request.validate()?;

        if !request.nodes.is_empty() {
            if let Err(e) = self.check_nodes(ctx, &request).await {
                if !request.k8s_endpoint_provided {
                    return Err(e);
                }
                warn!(error = %format!("{:#}", e), "node health check failed, continuing with Kubernetes check");
                ctx.emit(&format!("Warning: Node health check failed: {:#}", e));
            }
        }

        if request.k8s_endpoint_provided {
            self.check_kubernetes(ctx, &request).await?;
        }
        Ok(())
    }

    async fn check_nodes(&self, ctx: &ExecContext, request: &HealthRequest) -> Result<()> {
        let client = self
            .cluster
            .clone()
            .ok_or_else(|| WindsorError::missing("cluster client"))?;

        let result = {
            let guard = ClusterClientGuard::new(client);
            let signal = ctx.signal(request.timeout);
            guard
                .client()
                .wait_for_nodes_healthy(&signal, &request.nodes, request.version.as_deref())
                .await
        };
        result.context("nodes failed health check")?;

        let message = match &request.version {
            Some(version) => format!(
                "All {} nodes are healthy and running version {}",
                request.nodes.len(),
                version
            ),
            None => format!("All {} nodes are healthy", request.nodes.len()),
        };
        info!("{}", message);
        ctx.emit(&message);
        Ok(())
    }

    async fn check_kubernetes(&self, ctx: &ExecContext, request: &HealthRequest) -> Result<()> {
        let kubernetes = self
            .kubernetes
            .clone()
            .ok_or_else(|| WindsorError::missing("kubernetes manager"))?;

        let endpoint = request.endpoint();
        let node_names: &[String] = if request.check_node_ready {
            &request.nodes
        } else {
            &[]
        };

        if !node_names.is_empty() {
            ctx.emit(&format!(
                "Waiting for {} nodes to be Ready...",
                node_names.len()
            ));
        }

        let signal = ctx.signal(request.timeout);
        let notify = |line: &str| ctx.emit(line);
        kubernetes
            .wait_for_kubernetes_healthy(&signal, endpoint, &notify, node_names)
            .await
            .context("Kubernetes health check failed")?;

        let target = if endpoint.is_empty() {
            "Kubernetes API".to_string()
        } else {
            format!("Kubernetes API at {}", endpoint)
        };
        let message = if node_names.is_empty() {
            format!("{} is healthy", target)
        } else {
            match kubernetes.get_node_ready_status(&signal, node_names).await {
                Ok(status) if node_names.iter().all(|n| status.get(n).copied().unwrap_or(false)) => {
                    format!(
                        "{} is healthy and all {} nodes are Ready",
                        target,
                        node_names.len()
                    )
                }
                Ok(_) => format!("{} is healthy", target),
                Err(e) => {
                    warn!(error = %e, "failed to re-query node readiness");
                    format!("{} is healthy", target)
                }
            }
        };
        info!("{}", message);
        ctx.emit(&message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ExecParams {
        ExecParams::new()
    }

    #[test]
    fn test_empty_request_is_rejected() {
        let request = HealthRequest::from_params(&params());
        assert_eq!(request.validate().unwrap_err().to_string(), NO_HEALTH_CHECKS);
    }

    #[test]
    fn test_ready_without_nodes_is_rejected() {
        let mut p = params();
        p.k8s_endpoint_provided = Some(true);
        p.check_node_ready = Some(true);
        let request = HealthRequest::from_params(&p);
        assert_eq!(
            request.validate().unwrap_err().to_string(),
            READY_REQUIRES_NODES
        );
    }

    #[test]
    fn test_endpoint_sentinel_normalizes_to_default() {
        let mut p = params();
        p.k8s_endpoint = Some("true".to_string());
        assert_eq!(HealthRequest::from_params(&p).endpoint(), "");

        p.k8s_endpoint = Some("https://10.0.0.1:6443".to_string());
        assert_eq!(
            HealthRequest::from_params(&p).endpoint(),
            "https://10.0.0.1:6443"
        );
    }

    #[test]
    fn test_endpoint_flag_alone_is_a_valid_request() {
        let mut p = params();
        p.k8s_endpoint_provided = Some(true);
        assert!(HealthRequest::from_params(&p).validate().is_ok());
    }
}
