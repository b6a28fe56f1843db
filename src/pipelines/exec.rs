use super::base::{
    initialize_component, resolve_env_printers, resolve_secrets_providers, BasePipeline,
    EnvPrinters, SecretsProviders,
};
use super::Pipeline;
use crate::context::ExecContext;
use crate::env::{collect_env, managed_list, MANAGED_ENV};
use crate::error::WindsorError;
use crate::registry::Registry;
use crate::shell::ShellCommand;
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Runs a command with the context's environment injected.
pub struct ExecPipeline {
    base: BasePipeline,
    printers: EnvPrinters,
    secrets: SecretsProviders,
}

impl ExecPipeline {
    pub fn new() -> Self {
        Self {
            base: BasePipeline::new("exec"),
            printers: Arc::new(Vec::new()),
            secrets: Arc::new(Vec::new()),
        }
    }
}

impl Default for ExecPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Pipeline for ExecPipeline {
    fn initialize(&mut self, registry: &mut Registry, ctx: &ExecContext) -> Result<()> {
        self.base.initialize(registry, ctx)?;
        self.base.require_trust()?;

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
        let argv = ctx.params().command.as_deref().unwrap_or(&[]);
        let Some((program, args)) = argv.split_first() else {
            return Err(WindsorError::validation("No command to execute").into());
        };

        let mut vars = self
            .base
            .phase("environment", "error collecting environment variables", async {
                collect_env(&self.printers, &self.secrets).await
            })
            .await?;
        vars.insert(MANAGED_ENV.to_string(), managed_list(&vars));

        let command = ShellCommand::new(program.as_str())
            .args(args.iter().map(String::as_str))
            .envs(&vars);
        debug!(command = %command, vars = vars.len(), "executing");
        let code = self.base.shell()?.run_interactive(&command).await?;
        if code != 0 {
            bail!("command exited with status {}", code);
        }
        Ok(())
    }
}
