use super::embedded::default_template_data;
use super::model::{Blueprint, Kustomization, Reference, Source, DEFAULT_KUSTOMIZATION_NAMESPACE};
use super::reference::OciReference;
use super::{BlueprintHandler, TemplateData};
use crate::config::ConfigHandler;
use crate::context::Signal;
use crate::error::{require, WindsorError};
use crate::fs::FileSystem;
use crate::kubernetes::KubernetesManager;
use crate::progress::Spinner;
use crate::shell::Shell;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info};

const BLUEPRINT_FILE: &str = "blueprint.yaml";
const TEMPLATE_DIR: &str = "_template";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Blueprint stored as `contexts/<ctx>/blueprint.yaml` and installed as
/// Flux resources.
pub struct DefaultBlueprintHandler {
    shell: Arc<dyn Shell>,
    config: Arc<dyn ConfigHandler>,
    fs: Arc<dyn FileSystem>,
    kubernetes: Option<Arc<dyn KubernetesManager>>,
    blueprint: RwLock<Option<Blueprint>>,
    poll_interval: Duration,
}

impl DefaultBlueprintHandler {
    pub fn new(
        shell: Arc<dyn Shell>,
        config: Arc<dyn ConfigHandler>,
        fs: Arc<dyn FileSystem>,
        kubernetes: Option<Arc<dyn KubernetesManager>>,
    ) -> Self {
        Self {
            shell,
            config,
            fs,
            kubernetes,
            blueprint: RwLock::new(None),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn blueprint_path(&self) -> Result<PathBuf> {
        Ok(self.config.config_root()?.join(BLUEPRINT_FILE))
    }

    fn kubernetes(&self) -> Result<Arc<dyn KubernetesManager>, WindsorError> {
        require(&self.kubernetes, "kubernetes manager")
    }

    fn current(&self) -> Blueprint {
        self.blueprint
            .read()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Blueprint::named(&self.config.get_context()))
    }

    fn source_manifest(source: &Source) -> Value {
        let (kind, api_version) = if source.url.starts_with("oci://") {
            ("OCIRepository", "source.toolkit.fluxcd.io/v1beta2")
        } else {
            ("GitRepository", "source.toolkit.fluxcd.io/v1")
        };
        let reference = &source.reference;
        let mut reference_spec = Map::new();
        for (key, value) in [
            ("branch", &reference.branch),
            ("tag", &reference.tag),
            ("commit", &reference.commit),
        ] {
            if let Some(value) = value {
                reference_spec.insert(key.to_string(), Value::from(value.clone()));
            }
        }
        json!({
            "apiVersion": api_version,
            "kind": kind,
            "metadata": { "name": source.name, "namespace": DEFAULT_KUSTOMIZATION_NAMESPACE },
            "spec": { "interval": "1m", "url": source.url, "ref": reference_spec },
        })
    }

    fn kustomization_manifest(blueprint: &Blueprint, kustomization: &Kustomization) -> Value {
        let source = kustomization.source.clone().unwrap_or_default();
        let source_kind = blueprint
            .sources
            .iter()
            .find(|s| s.name == source)
            .filter(|s| s.url.starts_with("oci://"))
            .map(|_| "OCIRepository")
            .unwrap_or("GitRepository");
        let depends_on: Vec<Value> = kustomization
            .depends_on
            .iter()
            .map(|name| json!({ "name": name }))
            .collect();

        json!({
            "apiVersion": "kustomize.toolkit.fluxcd.io/v1",
            "kind": "Kustomization",
            "metadata": { "name": kustomization.name, "namespace": DEFAULT_KUSTOMIZATION_NAMESPACE },
            "spec": {
                "interval": kustomization.interval,
                "timeout": kustomization.timeout,
                "path": kustomization.path,
                "prune": kustomization.prune,
                "dependsOn": depends_on,
                "sourceRef": { "kind": source_kind, "name": source },
            },
        })
    }

    /// Flux source and kustomization resources for `blueprint` as one
    /// multi-document YAML stream.
    pub fn render_manifests(blueprint: &Blueprint) -> Result<String> {
        let mut sources = blueprint.sources.clone();
        if let Some(repository) = &blueprint.repository {
            sources.insert(
                0,
                Source {
                    name: blueprint.metadata.name.clone(),
                    url: repository.url.clone(),
                    reference: repository.reference.clone(),
                    path_prefix: None,
                },
            );
        }

        let documents = sources
            .iter()
            .map(Self::source_manifest)
            .chain(
                blueprint
                    .kustomizations
                    .iter()
                    .map(|k| Self::kustomization_manifest(blueprint, k)),
            )
            .map(|doc| serde_yaml::to_string(&doc))
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to serialize manifests")?;
        Ok(documents.join("---\n"))
    }
}

#[async_trait]
impl BlueprintHandler for DefaultBlueprintHandler {
    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    fn load_config(&self) -> Result<()> {
        let path = self.blueprint_path()?;
        if !self.fs.exists(&path) {
            debug!(path = %path.display(), "no blueprint file");
            return Ok(());
        }
        let content = self.fs.read_to_string(&path)?;
        let blueprint: Blueprint = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        *self.blueprint.write().unwrap() = Some(blueprint);
        Ok(())
    }

    fn load_blueprint(&self) -> Result<()> {
        self.load_config()?;
        let mut slot = self.blueprint.write().unwrap();
        if slot.is_none() {
            *slot = Some(Blueprint::named(&self.config.get_context()));
        }
        Ok(())
    }

    fn generate(&self) -> Blueprint {
        self.current().with_defaults()
    }

    async fn down(&self) -> Result<()> {
        let kubernetes = self.kubernetes()?;
        let blueprint = self.generate();
        for kustomization in blueprint.kustomizations.iter().rev() {
            info!(kustomization = %kustomization.name, "removing kustomization");
            kubernetes
                .delete_kustomization(&kustomization.name, DEFAULT_KUSTOMIZATION_NAMESPACE)
                .await?;
        }
        Ok(())
    }

    async fn install(&self) -> Result<()> {
        let kubernetes = self.kubernetes()?;
        let blueprint = self.generate();
        let manifests = Self::render_manifests(&blueprint)?;

        let path = self.config.scratch_path()?.join("blueprint-manifests.yaml");
        self.fs.write(&path, manifests.as_bytes())?;
        kubernetes.apply_manifest(&path).await
    }

    async fn wait_for_kustomizations(
        &self,
        signal: &Signal,
        message: &str,
        names: &[String],
    ) -> Result<()> {
        let kubernetes = self.kubernetes()?;
        let spinner = Spinner::start(message);

        loop {
            let pending: Vec<String> = match kubernetes.get_kustomization_status(names).await {
                Ok(status) => names
                    .iter()
                    .filter(|name| !status.get(*name).copied().unwrap_or(false))
                    .cloned()
                    .collect(),
                Err(e) => {
                    debug!(error = %e, "failed to query kustomizations");
                    names.to_vec()
                }
            };
            if pending.is_empty() {
                spinner.success();
                return Ok(());
            }

            if let Err(reason) = signal.sleep(self.poll_interval).await {
                spinner.failure();
                return Err(anyhow!(
                    "{} waiting for kustomizations: {} not ready",
                    reason,
                    pending.join(", ")
                ));
            }
        }
    }

    fn get_local_template_data(&self) -> Result<TemplateData> {
        let dir = self.shell.project_root()?.join("contexts").join(TEMPLATE_DIR);
        let mut data = TemplateData::new();
        if !self.fs.is_dir(&dir) {
            return Ok(data);
        }
        for file in self.fs.walk_files(&dir)? {
            let Ok(relative) = file.strip_prefix(&dir) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join("/");
            data.insert(key, self.fs.read(&file)?);
        }
        Ok(data)
    }

    fn get_default_template_data(&self, context: &str) -> Result<TemplateData> {
        Ok(default_template_data(context))
    }

    fn get_kustomizations(&self) -> Vec<Kustomization> {
        self.blueprint
            .read()
            .unwrap()
            .as_ref()
            .map(|b| b.kustomizations.clone())
            .unwrap_or_default()
    }

    fn load_data(&self, data: &Map<String, Value>, oci: Option<&OciReference>) -> Result<()> {
        let mut blueprint: Blueprint = serde_json::from_value(Value::Object(data.clone()))
            .context("invalid blueprint data")?;

        if let Some(oci) = oci {
            let url = oci.url();
            if !blueprint.sources.iter().any(|s| s.url == url) {
                blueprint.sources.push(Source {
                    name: oci.name().to_string(),
                    url,
                    reference: Reference {
                        tag: Some(oci.tag.clone()),
                        ..Default::default()
                    },
                    path_prefix: None,
                });
            }
        }
        if blueprint.metadata.name.is_empty() {
            blueprint.metadata.name = self.config.get_context();
        }

        *self.blueprint.write().unwrap() = Some(blueprint);
        Ok(())
    }

    fn write(&self, overwrite: bool) -> Result<()> {
        let path = self.blueprint_path()?;
        if self.fs.exists(&path) && !overwrite {
            debug!(path = %path.display(), "blueprint exists, not overwriting");
            return Ok(());
        }
        let content =
            serde_yaml::to_string(&self.current()).context("Failed to serialize blueprint")?;
        self.fs.write(&path, content.as_bytes())?;
        info!(path = %path.display(), "wrote blueprint");
        Ok(())
    }
}
