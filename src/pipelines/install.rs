use super::base::{initialize_component, resolve_blueprint_handler, BasePipeline};
use super::up::WAIT_MESSAGE;
use super::Pipeline;
use crate::blueprint::BlueprintHandler;
use crate::context::{ExecContext, ExecParams};
use crate::error::require;
use crate::registry::Registry;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Installs the context's blueprint into the cluster.
pub struct InstallPipeline {
    base: BasePipeline,
    blueprint: Option<Arc<dyn BlueprintHandler>>,
}

impl InstallPipeline {
    pub fn new() -> Self {
        Self {
            base: BasePipeline::new("install"),
            blueprint: None,
        }
    }

    async fn run(&self, ctx: &ExecContext) -> Result<()> {
        let params = ctx.params();
        let blueprint = require(&self.blueprint, "blueprint handler")?;

        blueprint
            .load_config()
            .context("failed to load blueprint data")?;
        self.base
            .phase("install", "error installing blueprint", blueprint.install())
            .await?;

        if ExecParams::flag(params.wait) {
            let names = blueprint.generate().kustomization_names();
            let signal = ctx.signal(params.timeout);
            self.base
                .phase(
                    "wait",
                    "error waiting for kustomizations",
                    blueprint.wait_for_kustomizations(&signal, WAIT_MESSAGE, &names),
                )
                .await?;
        }

        info!("blueprint installed");
        Ok(())
    }
}

impl Default for InstallPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Pipeline for InstallPipeline {
    fn initialize(&mut self, registry: &mut Registry, ctx: &ExecContext) -> Result<()> {
        self.base.initialize(registry, ctx)?;
        self.base.require_trust()?;

        let blueprint = resolve_blueprint_handler(registry, &self.base)?;
        initialize_component("blueprint handler", || blueprint.initialize())?;
        self.blueprint = Some(blueprint);
        Ok(())
    }

    async fn execute(&self, ctx: &ExecContext) -> Result<()> {
        let started = self.base.started();
        let result = self.run(ctx).await;
        self.base.finished(started, &result);
        result
    }
}
