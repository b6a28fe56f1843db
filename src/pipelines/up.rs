use super::base::{
    initialize_component, log_wiring, resolve_blueprint_handler, resolve_container_runtime,
    resolve_env_printers, resolve_network_manager, resolve_secrets_providers, resolve_stack,
    resolve_tools_manager, resolve_virtual_machine, BasePipeline, EnvPrinters, SecretsProviders,
};
use super::Pipeline;
use crate::blueprint::BlueprintHandler;
use crate::context::{ExecContext, ExecParams};
use crate::env::collect_env;
use crate::error::require;
use crate::network::NetworkManager;
use crate::registry::Registry;
use crate::stack::Stack;
use crate::tools::ToolsManager;
use crate::virt::{ContainerRuntime, VirtualMachine};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

pub const WAIT_MESSAGE: &str = "⏳ Waiting for kustomizations to be ready";

/// Brings the context's environment up: tools, VM, container runtime,
/// networking and the terraform stack, optionally followed by the blueprint.
pub struct UpPipeline {
    base: BasePipeline,
    tools: Option<Arc<dyn ToolsManager>>,
    vm: Option<Arc<dyn VirtualMachine>>,
    runtime: Option<Arc<dyn ContainerRuntime>>,
    network: Option<Arc<dyn NetworkManager>>,
    stack: Option<Arc<dyn Stack>>,
    blueprint: Option<Arc<dyn BlueprintHandler>>,
    env_printers: EnvPrinters,
    secrets: SecretsProviders,
}

impl UpPipeline {
    pub fn new() -> Self {
        Self {
            base: BasePipeline::new("up"),
            tools: None,
            vm: None,
            runtime: None,
            network: None,
            stack: None,
            blueprint: None,
            env_printers: Arc::new(Vec::new()),
            secrets: Arc::new(Vec::new()),
        }
    }

    fn colima(&self) -> bool {
        self.base.vm_driver() == "colima"
    }

    async fn run(&self, ctx: &ExecContext) -> Result<()> {
        let params = ctx.params();

        let vars = self
            .base
            .phase("environment", "error collecting environment variables", async {
                collect_env(&self.env_printers, &self.secrets).await
            })
            .await?;
        self.base.shell()?.set_session_env(&vars);
        debug!(count = vars.len(), "environment propagated");

        let tools = require(&self.tools, "tools manager")?;
        self.base
            .phase("tools", "error installing tools", tools.install())
            .await?;
        self.base
            .phase("tools", "error checking tools", tools.check())
            .await?;

        if self.colima() {
            let vm = require(&self.vm, "virtual machine")?;
            self.base
                .phase("virtual machine", "error running virtual machine Up command", vm.up())
                .await?;
        } else {
            self.base.skip("virtual machine", "vm.driver is not colima");
        }

        if self.base.enabled("docker.enabled") && !ExecParams::flag(params.skip_docker) {
            let runtime = require(&self.runtime, "container runtime")?;
            self.base
                .phase(
                    "container runtime",
                    "error running container runtime Up command",
                    runtime.up(),
                )
                .await?;
        } else {
            self.base.skip("container runtime", "docker disabled or skipped");
        }

        if self.colima() {
            let network = require(&self.network, "network manager")?;
            self.base
                .phase("network", "error configuring guest network", network.configure_guest())
                .await?;
            self.base
                .phase("network", "error configuring host network", network.configure_host_route())
                .await?;
            if self.base.enabled("dns.enabled") {
                self.base
                    .phase("network", "error configuring DNS", network.configure_dns())
                    .await?;
            }
        } else {
            self.base.skip("network", "vm.driver is not colima");
        }

        let stack = require(&self.stack, "stack")?;
        self.base
            .phase("stack", "error running stack Up command", stack.up())
            .await?;

        if ExecParams::flag(params.install) {
            let blueprint = require(&self.blueprint, "blueprint handler")?;
            self.base
                .phase("install", "error installing blueprint", async {
                    blueprint.load_config()?;
                    blueprint.install().await
                })
                .await?;
            if ExecParams::flag(params.wait) {
                let names = blueprint.generate().kustomization_names();
                let signal = ctx.signal(params.timeout);
                self.base
                    .phase(
                        "install",
                        "error waiting for kustomizations",
                        blueprint.wait_for_kustomizations(&signal, WAIT_MESSAGE, &names),
                    )
                    .await?;
            }
        }

        info!(context = %self.base.config()?.get_context(), "environment is up");
        ctx.emit("Windsor environment set up successfully.");
        Ok(())
    }
}

impl Default for UpPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Pipeline for UpPipeline {
    fn initialize(&mut self, registry: &mut Registry, ctx: &ExecContext) -> Result<()> {
        self.base.initialize(registry, ctx)?;
        self.base.require_trust()?;

        let tools = resolve_tools_manager(registry, &self.base)?;
        let blueprint = resolve_blueprint_handler(registry, &self.base)?;
        if self.colima() {
            let vm = resolve_virtual_machine(registry, &self.base)?;
            self.network = Some(resolve_network_manager(registry, &self.base, vm.clone())?);
            self.vm = Some(vm);
        }
        if self.base.enabled("docker.enabled") {
            self.runtime = Some(resolve_container_runtime(registry, &self.base)?);
        }
        self.stack = Some(resolve_stack(registry, &self.base, blueprint.clone())?);
        self.env_printers = resolve_env_printers(registry, &self.base)?;
        self.secrets = resolve_secrets_providers(registry, &self.base)?;

        initialize_component("tools manager", || tools.initialize())?;
        initialize_component("blueprint handler", || blueprint.initialize())?;
        if let Some(vm) = &self.vm {
            initialize_component("virtual machine", || vm.initialize())?;
        }
        if let Some(runtime) = &self.runtime {
            initialize_component("container runtime", || runtime.initialize())?;
        }
        if let Some(network) = &self.network {
            initialize_component("network manager", || network.initialize())?;
        }
        if let Some(stack) = &self.stack {
            initialize_component("stack", || stack.initialize())?;
        }
        for printer in self.env_printers.iter() {
            initialize_component("env printer", || printer.initialize())?;
        }
        for provider in self.secrets.iter() {
            initialize_component("secrets provider", || provider.initialize())?;
        }

        self.tools = Some(tools);
        self.blueprint = Some(blueprint);
        log_wiring(
            self.base.name(),
            &[
                ("virtual machine", self.vm.is_some()),
                ("container runtime", self.runtime.is_some()),
                ("network manager", self.network.is_some()),
                ("stack", self.stack.is_some()),
            ],
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
