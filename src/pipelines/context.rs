use super::base::BasePipeline;
use super::Pipeline;
use crate::context::{ExecContext, ExecParams};
use crate::error::WindsorError;
use crate::registry::Registry;
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

/// `context get` and `context set <name>`.
pub struct ContextPipeline {
    base: BasePipeline,
}

impl ContextPipeline {
    pub fn new() -> Self {
        Self {
            base: BasePipeline::new("context"),
        }
    }

    fn run(&self, ctx: &ExecContext) -> Result<()> {
        let params = ctx.params();
        let config = self.base.config()?;
        match ExecParams::non_empty(&params.operation) {
            None | Some("get") => {
                ctx.emit(&config.get_context());
                Ok(())
            }
            Some("set") => {
                let name = ExecParams::non_empty(&params.context_name)
                    .ok_or_else(|| WindsorError::validation("context name is required"))?;
                config.set_context(name).context("error setting context")?;
                let token = self
                    .base
                    .shell()?
                    .write_reset_token()
                    .context("error writing reset token")?;
                info!(context = name, token = %token.display(), "context switched");
                ctx.emit(&format!("Context set to: {}", name));
                Ok(())
            }
            Some(other) => Err(WindsorError::validation(format!(
                "unknown context operation: {}",
                other
            ))
            .into()),
        }
    }
}

impl Default for ContextPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Pipeline for ContextPipeline {
    fn initialize(&mut self, registry: &mut Registry, ctx: &ExecContext) -> Result<()> {
        self.base.initialize(registry, ctx)?;
        if ExecParams::non_empty(&ctx.params().operation) == Some("set") {
            self.base.require_trust()?;
        }
        Ok(())
    }

    async fn execute(&self, ctx: &ExecContext) -> Result<()> {
        self.run(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::FileSystem;
    use crate::pipelines::fakes::{Harness, LOCAL_CONFIG};
    use crate::shell::Shell;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    async fn run(harness: &Harness, params: ExecParams) -> (Result<()>, Vec<String>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        let ctx = ExecContext::new(params).with_output(Arc::new(move |line: &str| {
            sink.lock().unwrap().push(line.to_string())
        }));
        let mut registry = harness.registry();
        let mut pipeline = ContextPipeline::new();
        let result = match pipeline.initialize(&mut registry, &ctx) {
            Ok(()) => pipeline.execute(&ctx).await,
            Err(e) => Err(e),
        };
        let output = lines.lock().unwrap().clone();
        (result, output)
    }

    fn set(name: &str) -> ExecParams {
        let mut params = ExecParams::new();
        params.operation = Some("set".to_string());
        params.context_name = Some(name.to_string());
        params
    }

    #[tokio::test]
    async fn test_set_persists_and_requests_reset() {
        let harness = Harness::new(LOCAL_CONFIG);
        let (result, output) = run(&harness, set("staging")).await;
        result.unwrap();

        assert_eq!(output, vec!["Context set to: staging"]);
        assert_eq!(
            harness
                .fs
                .read_to_string(Path::new("/project/.windsor/context"))
                .unwrap(),
            "staging"
        );
        assert!(harness.shell.check_reset_flags().unwrap());
    }

    #[tokio::test]
    async fn test_get_after_set() {
        let harness = Harness::new(LOCAL_CONFIG);
        run(&harness, set("prod")).await.0.unwrap();

        let mut params = ExecParams::new();
        params.operation = Some("get".to_string());
        let (result, output) = run(&harness, params).await;
        result.unwrap();
        assert_eq!(output, vec!["prod"]);
    }

    #[tokio::test]
    async fn test_set_without_name() {
        let harness = Harness::new(LOCAL_CONFIG);
        let mut params = ExecParams::new();
        params.operation = Some("set".to_string());
        let (result, _) = run(&harness, params).await;
        assert_eq!(result.unwrap_err().to_string(), "context name is required");
    }

    #[tokio::test]
    async fn test_set_requires_trust() {
        let harness = Harness::new(LOCAL_CONFIG);
        harness.shell.set_trusted(false);
        let (result, _) = run(&harness, set("prod")).await;
        assert!(result.unwrap_err().to_string().contains("not trusted"));
    }
}
