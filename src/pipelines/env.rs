use super::base::{
    initialize_component, resolve_env_printers, resolve_secrets_providers, BasePipeline,
    EnvPrinters, SecretsProviders,
};
use super::hook::ShellKind;
use super::Pipeline;
use crate::context::ExecContext;
use crate::env::{collect_env, managed_list, MANAGED_ENV};
use crate::registry::Registry;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Prints shell statements that load the context's environment.
///
/// Runs from the prompt hook, so an untrusted directory prints nothing
/// rather than failing.
pub struct EnvPipeline {
    base: BasePipeline,
    trusted: bool,
    previous: Option<String>,
    printers: EnvPrinters,
    secrets: SecretsProviders,
}

impl EnvPipeline {
    pub fn new() -> Self {
        Self {
            base: BasePipeline::new("env"),
            trusted: false,
            previous: None,
            printers: Arc::new(Vec::new()),
            secrets: Arc::new(Vec::new()),
        }
    }
}

impl Default for EnvPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Pipeline for EnvPipeline {
    fn initialize(&mut self, registry: &mut Registry, ctx: &ExecContext) -> Result<()> {
        self.base.initialize(registry, ctx)?;
        self.trusted = self.base.require_trust().is_ok();
        if !self.trusted {
            debug!("directory not trusted, environment will be empty");
            return Ok(());
        }
        self.previous = std::env::var(MANAGED_ENV).ok().filter(|v| !v.is_empty());

        self.printers = resolve_env_printers(registry, &self.base)?;
        self.secrets = resolve_secrets_providers(registry, &self.base)?;
        for printer in self.printers.iter() {
            initialize_component("env printer", || printer.initialize())?;
        }
        for provider in self.secrets.iter() {
            initialize_component("secrets provider", || provider.initialize())?;
        }
        Ok(())
    }

    async fn execute(&self, ctx: &ExecContext) -> Result<()> {
        let shell = ShellKind::from_params(ctx.params())?;
        if !self.trusted {
            return Ok(());
        }

        if self.base.reset_requested() {
            if let Some(previous) = &self.previous {
                for key in previous.split(',').filter(|k| !k.is_empty()) {
                    ctx.emit(&shell.unset(key));
                }
            }
        }

        let vars = self
            .base
            .phase("environment", "error collecting environment variables", async {
                collect_env(&self.printers, &self.secrets).await
            })
            .await?;
        for (key, value) in &vars {
            ctx.emit(&shell.export(key, value));
        }
        ctx.emit(&shell.export(MANAGED_ENV, &managed_list(&vars)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecParams;
    use crate::pipelines::fakes::{Harness, LOCAL_CONFIG};
    use serial_test::serial;
    use std::sync::Mutex;

    async fn env(harness: &Harness, params: ExecParams) -> Result<Vec<String>> {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        let ctx = ExecContext::new(params).with_output(Arc::new(move |line: &str| {
            sink.lock().unwrap().push(line.to_string())
        }));
        let mut registry = harness.registry();
        let mut pipeline = EnvPipeline::new();
        pipeline.initialize(&mut registry, &ctx)?;
        pipeline.execute(&ctx).await?;
        let output = lines.lock().unwrap().clone();
        Ok(output)
    }

    #[tokio::test]
    #[serial]
    async fn test_exports_with_managed_list() {
        std::env::remove_var(MANAGED_ENV);
        let harness = Harness::new(LOCAL_CONFIG)
            .with_env("B_VAR", "two")
            .with_env("A_VAR", "one");
        let output = env(&harness, ExecParams::new()).await.unwrap();
        assert_eq!(
            output,
            vec![
                "export A_VAR=\"one\"",
                "export B_VAR=\"two\"",
                "export WINDSOR_MANAGED_ENV=\"A_VAR,B_VAR\"",
            ]
        );
    }

    #[tokio::test]
    #[serial]
    async fn test_reset_unsets_previously_managed() {
        std::env::set_var(MANAGED_ENV, "OLD_ONE,OLD_TWO");
        let harness = Harness::new(LOCAL_CONFIG).with_env("A_VAR", "one");
        harness.shell.request_reset();
        let mut params = ExecParams::new();
        params.shell_name = Some("fish".to_string());

        let output = env(&harness, params).await.unwrap();
        std::env::remove_var(MANAGED_ENV);
        assert_eq!(
            output[..3],
            ["set -e OLD_ONE", "set -e OLD_TWO", "set -gx A_VAR \"one\""]
        );
    }

    #[tokio::test]
    #[serial]
    async fn test_no_reset_keeps_previous_vars() {
        std::env::set_var(MANAGED_ENV, "OLD_ONE");
        let harness = Harness::new(LOCAL_CONFIG).with_env("A_VAR", "one");
        let output = env(&harness, ExecParams::new()).await.unwrap();
        std::env::remove_var(MANAGED_ENV);
        assert!(!output.iter().any(|l| l.starts_with("unset")));
    }

    #[tokio::test]
    async fn test_untrusted_prints_nothing() {
        let harness = Harness::new(LOCAL_CONFIG).with_env("A_VAR", "one");
        harness.shell.set_trusted(false);
        let output = env(&harness, ExecParams::new()).await.unwrap();
        assert!(output.is_empty());
    }
}
