use super::base::{
    initialize_component, resolve_cluster_client, resolve_kubernetes_manager,
    resolve_tools_manager, BasePipeline,
};
use super::Pipeline;
use crate::cluster::ClusterClient;
use crate::context::{ExecContext, ExecParams};
use crate::error::{require, WindsorError};
use crate::health::HealthChecker;
use crate::kubernetes::KubernetesManager;
use crate::registry::Registry;
use crate::tools::ToolsManager;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub const NOTHING_TO_CHECK: &str = "Nothing to check. Have you run `windsor init`?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Tools,
    NodeHealth,
}

impl Operation {
    /// An absent operation means a tools check.
    fn parse(params: &ExecParams) -> Result<Self, WindsorError> {
        match ExecParams::non_empty(&params.operation) {
            None | Some("tools") => Ok(Operation::Tools),
            Some("node-health") => Ok(Operation::NodeHealth),
            Some(other) => Err(WindsorError::validation(format!(
                "unknown check operation: {}",
                other
            ))),
        }
    }
}

/// `check` and `check node-health`.
pub struct CheckPipeline {
    base: BasePipeline,
    tools: Option<Arc<dyn ToolsManager>>,
    cluster: Option<Arc<dyn ClusterClient>>,
    kubernetes: Option<Arc<dyn KubernetesManager>>,
}

impl CheckPipeline {
    pub fn new() -> Self {
        Self {
            base: BasePipeline::new("check"),
            tools: None,
            cluster: None,
            kubernetes: None,
        }
    }

    async fn check_tools(&self, ctx: &ExecContext) -> Result<()> {
        if !self.base.config()?.is_loaded() {
            return Err(WindsorError::config_state(NOTHING_TO_CHECK).into());
        }
        let tools = require(&self.tools, "tools manager")?;
        self.base
            .phase("tools", "error checking tools", tools.check())
            .await?;
        ctx.emit("All tools are up to date.");
        Ok(())
    }

    async fn run(&self, ctx: &ExecContext) -> Result<()> {
        match Operation::parse(ctx.params())? {
            Operation::Tools => self.check_tools(ctx).await,
            Operation::NodeHealth => {
                HealthChecker::new(self.cluster.clone(), self.kubernetes.clone())
                    .verify(ctx)
                    .await
            }
        }
    }
}

impl Default for CheckPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Pipeline for CheckPipeline {
    fn initialize(&mut self, registry: &mut Registry, ctx: &ExecContext) -> Result<()> {
        self.base.initialize(registry, ctx)?;

        let tools = resolve_tools_manager(registry, &self.base)?;
        initialize_component("tools manager", || tools.initialize())?;
        self.tools = Some(tools);

        if matches!(Operation::parse(ctx.params()), Ok(Operation::NodeHealth)) {
            let params = ctx.params();
            if !params.nodes().is_empty() {
                self.cluster = Some(resolve_cluster_client(registry, &self.base)?);
            }
            if ExecParams::flag(params.k8s_endpoint_provided) {
                let kubernetes = resolve_kubernetes_manager(registry, &self.base)?;
                initialize_component("kubernetes manager", || kubernetes.initialize())?;
                self.kubernetes = Some(kubernetes);
            }
        }
        Ok(())
    }

    async fn execute(&self, ctx: &ExecContext) -> Result<()> {
        let started = self.base.started();
        let result = self.run(ctx).await;
        self.base.finished(started, &result);
        result
    }
}
