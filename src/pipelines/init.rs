use super::base::{
    initialize_component, log_wiring, resolve_artifact_builder, resolve_blueprint_handler,
    resolve_generators, resolve_template_renderer, resolve_tools_manager, BasePipeline,
    Generators,
};
use super::Pipeline;
use crate::blueprint::{ArtifactBuilder, BlueprintHandler, TemplateRenderer, TemplateResolver};
use crate::config::default_context_config;
use crate::context::{ExecContext, ExecParams};
use crate::error::require;
use crate::registry::Registry;
use crate::tools::ToolsManager;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Sets up a project for a context: config, blueprint, generated files and
/// the tools manifest.
pub struct InitPipeline {
    base: BasePipeline,
    tools: Option<Arc<dyn ToolsManager>>,
    blueprint: Option<Arc<dyn BlueprintHandler>>,
    renderer: Option<Arc<dyn TemplateRenderer>>,
    artifacts: Option<Arc<dyn ArtifactBuilder>>,
    generators: Generators,
}

impl InitPipeline {
    pub fn new() -> Self {
        Self {
            base: BasePipeline::new("init"),
            tools: None,
            blueprint: None,
            renderer: None,
            artifacts: None,
            generators: Arc::new(Vec::new()),
        }
    }

    fn setup_config(&self, params: &ExecParams) -> Result<String> {
        let config = self.base.config()?;
        let context = match ExecParams::non_empty(&params.context_name) {
            Some(name) => name.to_string(),
            None => config.get_context(),
        };
        config
            .set_context(&context)
            .context("error setting context")?;
        config
            .load_context_config()
            .context("error loading context config")?;
        config
            .set_defaults(default_context_config(&context))
            .context("error applying context defaults")?;
        config.save_config().context("error saving config")?;
        debug!(context = %context, "context configured");
        Ok(context)
    }

    async fn run(&self, ctx: &ExecContext) -> Result<()> {
        let params = ctx.params();
        let overwrite = ExecParams::flag(params.reset);
        let context = self.setup_config(params)?;

        let blueprint = require(&self.blueprint, "blueprint handler")?;
        blueprint
            .load_config()
            .context("error loading blueprint config")?;

        let resolver = TemplateResolver::new(blueprint.clone())
            .with_artifacts(self.artifacts.clone())
            .with_renderer(self.renderer.clone())
            .with_config(Some(self.base.config()?));
        let rendered = self
            .base
            .phase("templates", "error processing templates", resolver.process(params))
            .await?;

        blueprint
            .write(overwrite)
            .context("error writing blueprint")?;

        self.base
            .phase("generators", "error generating files", async {
                for generator in self.generators.iter() {
                    generator.generate(&rendered, overwrite)?;
                }
                Ok(())
            })
            .await?;

        let tools = require(&self.tools, "tools manager")?;
        tools
            .write_manifest()
            .context("error writing tools manifest")?;

        info!(context = %context, "project initialized");
        ctx.emit("Initialization successful");
        Ok(())
    }
}

impl Default for InitPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Pipeline for InitPipeline {
    fn initialize(&mut self, registry: &mut Registry, ctx: &ExecContext) -> Result<()> {
        self.base.initialize(registry, ctx)?;
        if ctx.params().trust.unwrap_or(true) {
            self.base
                .shell()?
                .add_current_dir_to_trusted_file()
                .context("error adding current directory to trusted file")?;
        }
        self.base.require_trust()?;

        let tools = resolve_tools_manager(registry, &self.base)?;
        let blueprint = resolve_blueprint_handler(registry, &self.base)?;
        let renderer = resolve_template_renderer(registry, &self.base)?;
        self.artifacts = resolve_artifact_builder(registry);
        self.generators = resolve_generators(registry, &self.base)?;

        initialize_component("tools manager", || tools.initialize())?;
        initialize_component("blueprint handler", || blueprint.initialize())?;
        for generator in self.generators.iter() {
            initialize_component("generator", || generator.initialize())?;
        }

        self.tools = Some(tools);
        self.blueprint = Some(blueprint);
        self.renderer = Some(renderer);
        log_wiring(
            self.base.name(),
            &[("artifact builder", self.artifacts.is_some())],
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
