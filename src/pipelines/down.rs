use super::base::{
    initialize_component, log_wiring, resolve_blueprint_handler, resolve_container_runtime,
    resolve_stack, BasePipeline,
};
use super::Pipeline;
use crate::blueprint::BlueprintHandler;
use crate::context::{ExecContext, ExecParams};
use crate::error::require;
use crate::registry::Registry;
use crate::stack::Stack;
use crate::virt::ContainerRuntime;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Generated paths below the project root removed by `down --clean`, in order.
pub const CLEAN_PATHS: [&str; 4] = [
    ".volumes",
    ".windsor/.tf_modules",
    ".windsor/Corefile",
    ".windsor/docker-compose.yaml",
];

/// Tears the environment down in reverse dependency order: blueprint,
/// stack, container runtime, then optionally generated artifacts.
pub struct DownPipeline {
    base: BasePipeline,
    blueprint: Option<Arc<dyn BlueprintHandler>>,
    stack: Option<Arc<dyn Stack>>,
    runtime: Option<Arc<dyn ContainerRuntime>>,
}

impl DownPipeline {
    pub fn new() -> Self {
        Self {
            base: BasePipeline::new("down"),
            blueprint: None,
            stack: None,
            runtime: None,
        }
    }

    async fn run(&self, ctx: &ExecContext) -> Result<()> {
        let params = ctx.params();
        let skip_k8s = ExecParams::flag(params.skip_k8s);

        if skip_k8s {
            self.base.skip("blueprint", "skipK8s");
        } else {
            let blueprint = require(&self.blueprint, "blueprint handler")?;
            self.base
                .phase("blueprint", "error running blueprint cleanup", async {
                    blueprint.load_config()?;
                    blueprint.down().await
                })
                .await?;
        }

        if ExecParams::flag(params.skip_terraform) {
            self.base.skip("stack", "skipTerraform");
        } else {
            let stack = require(&self.stack, "stack")?;
            let blueprint = require(&self.blueprint, "blueprint handler")?;
            if skip_k8s {
                blueprint
                    .load_config()
                    .context("error loading blueprint config")?;
            }
            let generated = blueprint.generate();
            self.base
                .phase("stack", "error running stack Down command", stack.down(&generated))
                .await?;
        }

        if self.base.enabled("docker.enabled") && !ExecParams::flag(params.skip_docker) {
            let runtime = require(&self.runtime, "container runtime")?;
            self.base
                .phase(
                    "container runtime",
                    "error running container runtime Down command",
                    runtime.down(),
                )
                .await?;
        } else {
            self.base.skip("container runtime", "docker disabled or skipped");
        }

        if ExecParams::flag(params.clean) {
            self.clean()?;
        }

        info!("environment is down");
        ctx.emit("Windsor environment torn down successfully.");
        Ok(())
    }

    fn clean(&self) -> Result<()> {
        let root = self.base.shell()?.project_root()?;
        let fs = self.base.fs()?;
        for path in CLEAN_PATHS {
            fs.remove_all(&root.join(path))
                .with_context(|| format!("error deleting {}", path))?;
        }
        self.base
            .config()?
            .clean()
            .context("error cleaning up context specific artifacts")
    }
}

impl Default for DownPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Pipeline for DownPipeline {
    fn initialize(&mut self, registry: &mut Registry, ctx: &ExecContext) -> Result<()> {
        self.base.initialize(registry, ctx)?;
        self.base.require_trust()?;

        let blueprint = resolve_blueprint_handler(registry, &self.base)?;
        let stack = resolve_stack(registry, &self.base, blueprint.clone())?;
        if self.base.enabled("docker.enabled") {
            let runtime = resolve_container_runtime(registry, &self.base)?;
            initialize_component("container runtime", || runtime.initialize())?;
            self.runtime = Some(runtime);
        }
        initialize_component("blueprint handler", || blueprint.initialize())?;
        initialize_component("stack", || stack.initialize())?;

        self.blueprint = Some(blueprint);
        self.stack = Some(stack);
        log_wiring(
            self.base.name(),
            &[("container runtime", self.runtime.is_some())],
        );
        Ok(())
    }

    async fn execute(&self, ctx: &ExecContext) -> Result<()> {
        let started = self.base.started();
        let result = self.run(ctx).await;
        self.base.finished(started, &result);
        result
    }
}
