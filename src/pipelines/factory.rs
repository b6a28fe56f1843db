use super::{
    CheckPipeline, ContextPipeline, DownPipeline, EnvPipeline, ExecPipeline, HookPipeline,
    InitPipeline, InstallPipeline, Pipeline, UpPipeline,
};
use crate::context::ExecContext;
use crate::registry::Registry;
use anyhow::{Context, Result};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    Init,
    Up,
    Down,
    Check,
    Install,
    Exec,
    Context,
    Hook,
    Env,
}

impl PipelineKind {
    /// Registry name of the pipeline.
    pub fn registry_name(self) -> &'static str {
        match self {
            PipelineKind::Init => "initPipeline",
            PipelineKind::Up => "upPipeline",
            PipelineKind::Down => "downPipeline",
            PipelineKind::Check => "checkPipeline",
            PipelineKind::Install => "installPipeline",
            PipelineKind::Exec => "execPipeline",
            PipelineKind::Context => "contextPipeline",
            PipelineKind::Hook => "hookPipeline",
            PipelineKind::Env => "envPipeline",
        }
    }

    fn construct(self) -> Box<dyn Pipeline> {
        match self {
            PipelineKind::Init => Box::new(InitPipeline::new()),
            PipelineKind::Up => Box::new(UpPipeline::new()),
            PipelineKind::Down => Box::new(DownPipeline::new()),
            PipelineKind::Check => Box::new(CheckPipeline::new()),
            PipelineKind::Install => Box::new(InstallPipeline::new()),
            PipelineKind::Exec => Box::new(ExecPipeline::new()),
            PipelineKind::Context => Box::new(ContextPipeline::new()),
            PipelineKind::Hook => Box::new(HookPipeline::new()),
            PipelineKind::Env => Box::new(EnvPipeline::new()),
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineKind::Init => "init",
            PipelineKind::Up => "up",
            PipelineKind::Down => "down",
            PipelineKind::Check => "check",
            PipelineKind::Install => "install",
            PipelineKind::Exec => "exec",
            PipelineKind::Context => "context",
            PipelineKind::Hook => "hook",
            PipelineKind::Env => "env",
        };
        f.write_str(name)
    }
}

pub struct PipelineFactory;

impl PipelineFactory {
    /// Returns the registered pipeline of `kind`, or constructs, initializes
    /// and registers a new one. A pipeline that fails to initialize is not
    /// registered.
    pub fn get_or_create(
        registry: &mut Registry,
        kind: PipelineKind,
        ctx: &ExecContext,
    ) -> Result<Arc<dyn Pipeline>> {
        if let Some(existing) = registry.resolve::<dyn Pipeline>(kind.registry_name()) {
            debug!(pipeline = %kind, "reusing initialized pipeline");
            return Ok(existing);
        }

        let mut pipeline = kind.construct();
        pipeline
            .initialize(registry, ctx)
            .with_context(|| format!("failed to initialize {} pipeline", kind))?;
        let pipeline: Arc<dyn Pipeline> = Arc::from(pipeline);
        registry.register(kind.registry_name(), pipeline.clone());
        Ok(pipeline)
    }

    /// Creates the pipeline and executes it.
    pub async fn run(registry: &mut Registry, kind: PipelineKind, ctx: &ExecContext) -> Result<()> {
        let pipeline = Self::get_or_create(registry, kind, ctx)?;
        pipeline.execute(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecParams;
    use crate::fs::{FileSystem, MockFileSystem};
    use crate::registry;
    use crate::shell::{MockShell, Shell};

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.register::<dyn Shell>(registry::SHELL, Arc::new(MockShell::new("/project")));
        registry.register::<dyn FileSystem>(registry::FILE_SYSTEM, Arc::new(MockFileSystem::new()));
        registry
    }

    #[test]
    fn test_pipeline_is_initialized_once_and_reused() {
        let mut registry = registry();
        let ctx = ExecContext::new(ExecParams::new());

        let first = PipelineFactory::get_or_create(&mut registry, PipelineKind::Hook, &ctx).unwrap();
        let second =
            PipelineFactory::get_or_create(&mut registry, PipelineKind::Hook, &ctx).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_failed_initialization_is_not_registered() {
        let mut registry = registry();
        let shell = Arc::new(MockShell::new("/project"));
        shell.set_trusted(false);
        registry.register::<dyn Shell>(registry::SHELL, shell);
        let ctx = ExecContext::new(ExecParams::new());

        let err = PipelineFactory::get_or_create(&mut registry, PipelineKind::Up, &ctx)
            .err()
            .unwrap();
        assert!(format!("{:#}", err).contains("not trusted"));
        assert!(!registry.contains(PipelineKind::Up.registry_name()));
    }
}
