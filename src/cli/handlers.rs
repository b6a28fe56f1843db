//! Maps parsed CLI arguments onto pipeline runs

use super::commands::{CheckCommand, Commands, ContextCommand};
use crate::context::{ExecContext, ExecParams};
use crate::pipelines::{PipelineFactory, PipelineKind};
use crate::registry::Registry;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Translates a subcommand into the pipeline to run and its parameters.
pub fn to_params(command: &Commands) -> (PipelineKind, ExecParams) {
    let mut params = ExecParams::new();
    let kind = match command {
        Commands::Init(args) => {
            params.context_name = args.context.clone();
            params.blueprint = args.blueprint.clone();
            params.reset = Some(args.reset);
            params.trust = Some(!args.no_trust);
            PipelineKind::Init
        }
        Commands::Up(args) => {
            params.install = Some(args.install);
            params.wait = Some(args.wait);
            params.timeout = args.timeout;
            PipelineKind::Up
        }
        Commands::Down(args) => {
            params.clean = Some(args.clean);
            params.skip_k8s = Some(args.skip_k8s);
            params.skip_terraform = Some(args.skip_terraform);
            params.skip_docker = Some(args.skip_docker);
            PipelineKind::Down
        }
        Commands::Check(args) => {
            match &args.operation {
                None | Some(CheckCommand::Tools) => {
                    params.operation = Some("tools".to_string());
                }
                Some(CheckCommand::NodeHealth(health)) => {
                    params.operation = Some("node-health".to_string());
                    params.nodes = Some(health.nodes.clone());
                    params.timeout = health.timeout;
                    params.version = health.version.clone();
                    params.k8s_endpoint_provided = Some(health.k8s_endpoint.is_some());
                    params.k8s_endpoint = health.k8s_endpoint.clone();
                    params.check_node_ready = Some(health.ready);
                }
            }
            PipelineKind::Check
        }
        Commands::Install(args) => {
            params.wait = Some(args.wait);
            params.timeout = args.timeout;
            PipelineKind::Install
        }
        Commands::Exec(args) => {
            params.command = Some(args.command.clone());
            PipelineKind::Exec
        }
        Commands::Context(ContextCommand::Get) => {
            params.operation = Some("get".to_string());
            PipelineKind::Context
        }
        Commands::Context(ContextCommand::Set { name }) => {
            params.operation = Some("set".to_string());
            params.context_name = Some(name.clone());
            PipelineKind::Context
        }
        Commands::Hook(args) => {
            params.shell_name = Some(args.shell.clone());
            PipelineKind::Hook
        }
        Commands::Env(args) => {
            params.shell_name = args.shell.clone();
            PipelineKind::Env
        }
    };
    (kind, params)
}

/// Runs the pipeline for `command` and returns the process exit code.
///
/// Ctrl-C cancels the root token, which aborts any wait in progress.
pub async fn handle_command(command: &Commands) -> i32 {
    let (kind, params) = to_params(command);
    debug!(pipeline = %kind, "dispatching");

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let ctx = ExecContext::new(params)
        .with_output(Arc::new(|line: &str| println!("{}", line)))
        .with_cancellation(cancel);
    let mut registry = Registry::new();

    match PipelineFactory::run(&mut registry, kind, &ctx).await {
        Ok(()) => 0,
        Err(e) => {
            error!(pipeline = %kind, error = %format!("{:#}", e), "command failed");
            eprintln!("{:#}", e);
            1
        }
    }
}
