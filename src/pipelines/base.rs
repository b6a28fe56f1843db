//! Shared lifecycle helper held by every pipeline
//!
//! `BasePipeline` resolves the primary collaborators (shell, file system,
//! configuration), loads the project configuration and detects session
//! resets. The `resolve_*` functions below apply the registry's reuse-first
//! rule to each optional collaborator, wiring it from the primaries.

use crate::blueprint::{
    ArtifactBuilder, BlueprintHandler, DefaultBlueprintHandler, JsonnetTemplateRenderer,
    OciArtifactBuilder, TemplateRenderer,
};
use crate::cluster::{ClusterClient, TalosClusterClient};
use crate::config::{ConfigHandler, YamlConfigHandler, CONFIG_FILE_NAMES};
use crate::context::{ExecContext, ExecParams};
use crate::env::{
    DockerEnvPrinter, EnvPrinter, KubeEnvPrinter, SecretsProvider, SopsSecretsProvider,
    TalosEnvPrinter, TerraformEnvPrinter, WindsorEnvPrinter,
};
use crate::error::{require, WindsorError};
use crate::fs::{FileSystem, RealFileSystem};
use crate::generators::{GitGenerator, Generator, KustomizeGenerator, TerraformGenerator};
use crate::kubernetes::{KubectlManager, KubernetesManager};
use crate::network::{ColimaNetworkManager, NetworkManager};
use crate::progress::{LoggingHandler, ProgressEvent, ProgressHandler};
use crate::registry::{self, Lookup, Registry};
use crate::shell::{SecureShell, Shell, SystemShell};
use crate::stack::{Stack, TerraformStack};
use crate::tools::{ShellToolsManager, ToolsManager};
use crate::virt::{colima_profile, ColimaVirt, ContainerRuntime, DockerVirt, VirtualMachine};
use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub type Generators = Arc<Vec<Arc<dyn Generator>>>;
pub type EnvPrinters = Arc<Vec<Arc<dyn EnvPrinter>>>;
pub type SecretsProviders = Arc<Vec<Arc<dyn SecretsProvider>>>;

const NOT_TRUSTED: &str =
    "This directory is not trusted. Run `windsor init` in the project root to trust it.";

pub struct BasePipeline {
    name: &'static str,
    shell: Option<Arc<dyn Shell>>,
    fs: Option<Arc<dyn FileSystem>>,
    config: Option<Arc<dyn ConfigHandler>>,
    reset: bool,
    progress: Arc<dyn ProgressHandler>,
}

impl BasePipeline {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            shell: None,
            fs: None,
            config: None,
            reset: false,
            progress: Arc::new(LoggingHandler),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressHandler>) -> Self {
        self.progress = progress;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Resolves the primaries, then loads `windsor.yaml` if the project has one.
    pub fn initialize(&mut self, registry: &mut Registry, ctx: &ExecContext) -> Result<()> {
        let shell = registry
            .resolve_or_construct::<dyn Shell, _>(registry::SHELL, || Arc::new(SystemShell::new()));
        let fs = registry.resolve_or_construct::<dyn FileSystem, _>(registry::FILE_SYSTEM, || {
            Arc::new(RealFileSystem::new())
        });
        let config = registry.resolve_or_construct::<dyn ConfigHandler, _>(
            registry::CONFIG_HANDLER,
            || Arc::new(YamlConfigHandler::new(shell.clone(), fs.clone())),
        );

        let root = shell.project_root()?;
        match CONFIG_FILE_NAMES
            .iter()
            .map(|name| root.join(name))
            .find(|path| fs.exists(path))
        {
            Some(path) if !config.is_loaded() => {
                config.load_config(&path).context("error loading config")?;
            }
            Some(_) => debug!("configuration already loaded"),
            None => debug!(root = %root.display(), "no windsor.yaml, skipping config load"),
        }

        self.reset = shell.check_reset_flags()? || ExecParams::flag(ctx.params().reset);
        self.shell = Some(shell);
        self.fs = Some(fs);
        self.config = Some(config);
        Ok(())
    }

    pub fn shell(&self) -> Result<Arc<dyn Shell>, WindsorError> {
        require(&self.shell, "shell")
    }

    pub fn fs(&self) -> Result<Arc<dyn FileSystem>, WindsorError> {
        require(&self.fs, "file system")
    }

    pub fn config(&self) -> Result<Arc<dyn ConfigHandler>, WindsorError> {
        require(&self.config, "config handler")
    }

    /// True when a session reset was requested through the marker file or
    /// the `reset` parameter.
    pub fn reset_requested(&self) -> bool {
        self.reset
    }

    pub fn require_trust(&self) -> Result<()> {
        self.shell()?
            .check_trusted_directory()
            .map_err(|e| {
                debug!(error = %e, "trust check failed");
                WindsorError::config_state(NOT_TRUSTED).into()
            })
    }

    pub fn vm_driver(&self) -> String {
        self.config
            .as_ref()
            .map(|c| c.get_string("vm.driver", ""))
            .unwrap_or_default()
    }

    pub fn enabled(&self, key: &str) -> bool {
        self.config
            .as_ref()
            .map(|c| c.get_bool(key, false))
            .unwrap_or(false)
    }

    pub fn started(&self) -> Instant {
        self.progress.on_progress(&ProgressEvent::Started {
            pipeline: self.name.to_string(),
        });
        Instant::now()
    }

    pub fn finished(&self, started: Instant, result: &Result<()>) {
        let event = match result {
            Ok(()) => ProgressEvent::Completed {
                pipeline: self.name.to_string(),
                total_time: started.elapsed(),
            },
            Err(e) => ProgressEvent::Failed {
                pipeline: self.name.to_string(),
                error: format!("{:#}", e),
            },
        };
        self.progress.on_progress(&event);
    }

    /// Runs one phase, wrapping a failure with `error` as its stable prefix.
    pub async fn phase<T, F>(&self, phase: &str, error: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.progress.on_progress(&ProgressEvent::PhaseStarted {
            phase: phase.to_string(),
        });
        let start = Instant::now();
        let value = fut
            .await
            .map_err(|e| WindsorError::collaborator(error, e))?;
        self.progress.on_progress(&ProgressEvent::PhaseComplete {
            phase: phase.to_string(),
            duration: start.elapsed(),
        });
        Ok(value)
    }

    pub fn skip(&self, phase: &str, reason: &str) {
        self.progress.on_progress(&ProgressEvent::PhaseSkipped {
            phase: phase.to_string(),
            reason: reason.to_string(),
        });
    }
}

/// Runs a collaborator's own initialization, naming it on failure.
pub fn initialize_component(name: &str, init: impl FnOnce() -> Result<()>) -> Result<()> {
    init().map_err(|e| WindsorError::collaborator(format!("failed to initialize {}", name), e))?;
    Ok(())
}

pub fn resolve_tools_manager(registry: &mut Registry, base: &BasePipeline) -> Result<Arc<dyn ToolsManager>> {
    let (shell, config, fs) = (base.shell()?, base.config()?, base.fs()?);
    Ok(registry.resolve_or_construct::<dyn ToolsManager, _>(registry::TOOLS_MANAGER, || {
        Arc::new(ShellToolsManager::new(shell, config, fs))
    }))
}

pub fn resolve_cluster_client(
    registry: &mut Registry,
    base: &BasePipeline,
) -> Result<Arc<dyn ClusterClient>> {
    let shell = base.shell()?;
    let talosconfig = base.config()?.config_root()?.join(".talos").join("config");
    Ok(registry.resolve_or_construct::<dyn ClusterClient, _>(registry::CLUSTER_CLIENT, || {
        Arc::new(TalosClusterClient::new(shell, Some(talosconfig)))
    }))
}

pub fn resolve_kubernetes_manager(
    registry: &mut Registry,
    base: &BasePipeline,
) -> Result<Arc<dyn KubernetesManager>> {
    let (shell, config) = (base.shell()?, base.config()?);
    Ok(registry.resolve_or_construct::<dyn KubernetesManager, _>(
        registry::KUBERNETES_MANAGER,
        || Arc::new(KubectlManager::new(shell, config)),
    ))
}

pub fn resolve_blueprint_handler(
    registry: &mut Registry,
    base: &BasePipeline,
) -> Result<Arc<dyn BlueprintHandler>> {
    let kubernetes = resolve_kubernetes_manager(registry, base)?;
    let (shell, config, fs) = (base.shell()?, base.config()?, base.fs()?);
    Ok(registry.resolve_or_construct::<dyn BlueprintHandler, _>(
        registry::BLUEPRINT_HANDLER,
        || Arc::new(DefaultBlueprintHandler::new(shell, config, fs, Some(kubernetes))),
    ))
}

/// The artifact builder is optional: when it cannot be built, template
/// resolution falls back to the embedded defaults.
pub fn resolve_artifact_builder(registry: &mut Registry) -> Option<Arc<dyn ArtifactBuilder>> {
    match registry.try_resolve_or_construct::<dyn ArtifactBuilder, _>(
        registry::ARTIFACT_BUILDER,
        || Ok(Arc::new(OciArtifactBuilder::new()?)),
    ) {
        Ok(builder) => Some(builder),
        Err(e) => {
            warn!(error = %format!("{:#}", e), "artifact builder unavailable");
            None
        }
    }
}

pub fn resolve_template_renderer(
    registry: &mut Registry,
    base: &BasePipeline,
) -> Result<Arc<dyn TemplateRenderer>> {
    let (shell, config, fs) = (base.shell()?, base.config()?, base.fs()?);
    Ok(registry.resolve_or_construct::<dyn TemplateRenderer, _>(
        registry::TEMPLATE_RENDERER,
        || Arc::new(JsonnetTemplateRenderer::new(shell, config, fs)),
    ))
}

pub fn resolve_virtual_machine(
    registry: &mut Registry,
    base: &BasePipeline,
) -> Result<Arc<dyn VirtualMachine>> {
    let (shell, config) = (base.shell()?, base.config()?);
    Ok(registry.resolve_or_construct::<dyn VirtualMachine, _>(
        registry::VIRTUAL_MACHINE,
        || Arc::new(ColimaVirt::new(shell, config)),
    ))
}

pub fn resolve_container_runtime(
    registry: &mut Registry,
    base: &BasePipeline,
) -> Result<Arc<dyn ContainerRuntime>> {
    let (shell, config, fs) = (base.shell()?, base.config()?, base.fs()?);
    Ok(registry.resolve_or_construct::<dyn ContainerRuntime, _>(
        registry::CONTAINER_RUNTIME,
        || Arc::new(DockerVirt::new(shell, config, fs)),
    ))
}

/// Soft reuse: an entry registered under another capability is left alone
/// and the secure shell is treated as absent.
pub fn resolve_secure_shell(
    registry: &mut Registry,
    base: &BasePipeline,
) -> Result<Option<Arc<dyn Shell>>> {
    match registry.lookup::<dyn Shell>(registry::SECURE_SHELL) {
        Lookup::Hit => Ok(registry.resolve::<dyn Shell>(registry::SECURE_SHELL)),
        Lookup::Mismatch => {
            warn!("registered secure shell has the wrong type, ignoring it");
            Ok(None)
        }
        Lookup::Miss => {
            let profile = colima_profile(&base.config()?.get_context());
            let secure: Arc<dyn Shell> = Arc::new(SecureShell::colima(base.shell()?, &profile));
            registry.register(registry::SECURE_SHELL, secure.clone());
            Ok(Some(secure))
        }
    }
}

pub fn resolve_network_manager(
    registry: &mut Registry,
    base: &BasePipeline,
    vm: Arc<dyn VirtualMachine>,
) -> Result<Arc<dyn NetworkManager>> {
    let secure = resolve_secure_shell(registry, base)?;
    let (shell, config) = (base.shell()?, base.config()?);
    Ok(registry.resolve_or_construct::<dyn NetworkManager, _>(
        registry::NETWORK_MANAGER,
        || Arc::new(ColimaNetworkManager::new(shell, secure, config, vm)),
    ))
}

pub fn resolve_stack(
    registry: &mut Registry,
    base: &BasePipeline,
    blueprint: Arc<dyn BlueprintHandler>,
) -> Result<Arc<dyn Stack>> {
    let (shell, config, fs) = (base.shell()?, base.config()?, base.fs()?);
    Ok(registry.resolve_or_construct::<dyn Stack, _>(registry::STACK, || {
        Arc::new(TerraformStack::new(shell, config, fs, blueprint))
    }))
}

pub fn resolve_generators(registry: &mut Registry, base: &BasePipeline) -> Result<Generators> {
    let (shell, config, fs) = (base.shell()?, base.config()?, base.fs()?);
    Ok(registry.resolve_or_construct::<Vec<Arc<dyn Generator>>, _>(registry::GENERATORS, || {
        let generators: Vec<Arc<dyn Generator>> = vec![
            Arc::new(GitGenerator::new(shell, fs.clone())),
            Arc::new(TerraformGenerator::new(config.clone(), fs.clone())),
            Arc::new(KustomizeGenerator::new(config, fs)),
        ];
        Arc::new(generators)
    }))
}

/// Printers for the tools the context uses, in output order.
pub fn resolve_env_printers(registry: &mut Registry, base: &BasePipeline) -> Result<EnvPrinters> {
    let (shell, config, fs) = (base.shell()?, base.config()?, base.fs()?);
    let cluster = base.enabled("cluster.enabled");
    let talos = cluster && config.get_string("cluster.driver", "") == "talos";
    let docker = base.enabled("docker.enabled");
    let terraform = base.enabled("terraform.enabled");

    Ok(registry.resolve_or_construct::<Vec<Arc<dyn EnvPrinter>>, _>(registry::ENV_PRINTERS, || {
        let mut printers: Vec<Arc<dyn EnvPrinter>> =
            vec![Arc::new(WindsorEnvPrinter::new(shell.clone(), config.clone()))];
        if cluster {
            printers.push(Arc::new(KubeEnvPrinter::new(config.clone())));
        }
        if talos {
            printers.push(Arc::new(TalosEnvPrinter::new(config.clone())));
        }
        if docker {
            printers.push(Arc::new(DockerEnvPrinter::new(config.clone())));
        }
        if terraform {
            printers.push(Arc::new(TerraformEnvPrinter::new(shell, config, fs)));
        }
        Arc::new(printers)
    }))
}

pub fn resolve_secrets_providers(
    registry: &mut Registry,
    base: &BasePipeline,
) -> Result<SecretsProviders> {
    let (shell, config, fs) = (base.shell()?, base.config()?, base.fs()?);
    Ok(registry.resolve_or_construct::<Vec<Arc<dyn SecretsProvider>>, _>(
        registry::SECRETS_PROVIDERS,
        || {
            let providers: Vec<Arc<dyn SecretsProvider>> =
                vec![Arc::new(SopsSecretsProvider::new(shell, config, fs))];
            Arc::new(providers)
        },
    ))
}

/// Logs which optional collaborators a pipeline ended up with.
pub fn log_wiring(pipeline: &str, components: &[(&str, bool)]) {
    let present: Vec<&str> = components
        .iter()
        .filter(|(_, present)| *present)
        .map(|(name, _)| *name)
        .collect();
    info!(pipeline = pipeline, components = ?present, "pipeline initialized");
}
