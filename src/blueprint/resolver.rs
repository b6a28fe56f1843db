//! Template resolution waterfall
//!
//! Template data comes from exactly one source, tried in order:
//!
//! 1. an explicit `--blueprint` reference (fetch failures are fatal),
//! 2. local templates in `contexts/_template/`,
//! 3. the default OCI blueprint, when an artifact builder is available,
//! 4. the blueprint handler's embedded default for the context.
//!
//! The chosen data is narrowed to the patches the current blueprint
//! references, rendered, and any rendered `blueprint` object is loaded into
//! the blueprint handler.

use super::artifact::ArtifactBuilder;
use super::model::Kustomization;
use super::reference::{OciReference, DEFAULT_BLUEPRINT_REFERENCE};
use super::renderer::{template_key, TemplateRenderer};
use super::{BlueprintHandler, RenderedData, TemplateData};
use crate::config::{ConfigHandler, DEFAULT_CONTEXT};
use crate::context::ExecParams;
use crate::error::WindsorError;
use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

const PATCHES_PREFIX: &str = "patches/";
const BLUEPRINT_KEY: &str = "blueprint";

/// Which tier produced the template data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    Explicit(OciReference),
    Local,
    DefaultReference(OciReference),
    Embedded,
}

impl TemplateSource {
    /// OCI reference that blueprint sources should point at, if any.
    pub fn oci(&self) -> Option<&OciReference> {
        match self {
            TemplateSource::Explicit(r) | TemplateSource::DefaultReference(r) => Some(r),
            TemplateSource::Local | TemplateSource::Embedded => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedTemplates {
    pub data: TemplateData,
    pub source: TemplateSource,
}

pub struct TemplateResolver {
    blueprint: Arc<dyn BlueprintHandler>,
    artifacts: Option<Arc<dyn ArtifactBuilder>>,
    renderer: Option<Arc<dyn TemplateRenderer>>,
    config: Option<Arc<dyn ConfigHandler>>,
}

impl TemplateResolver {
    pub fn new(blueprint: Arc<dyn BlueprintHandler>) -> Self {
        Self {
            blueprint,
            artifacts: None,
            renderer: None,
            config: None,
        }
    }

    pub fn with_artifacts(mut self, artifacts: Option<Arc<dyn ArtifactBuilder>>) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_renderer(mut self, renderer: Option<Arc<dyn TemplateRenderer>>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_config(mut self, config: Option<Arc<dyn ConfigHandler>>) -> Self {
        self.config = config;
        self
    }

    /// Explicit name, then the config handler's current context, then `local`.
    pub fn context_name(&self, params: &ExecParams) -> String {
        if let Some(name) = ExecParams::non_empty(&params.context_name) {
            return name.to_string();
        }
        match &self.config {
            Some(config) => config.get_context(),
            None => DEFAULT_CONTEXT.to_string(),
        }
    }

    async fn fetch(&self, reference: &OciReference) -> Result<TemplateData> {
        let artifacts = self
            .artifacts
            .as_ref()
            .ok_or_else(|| WindsorError::missing("artifact builder"))
            .context("failed to get template data from blueprint")?;
        artifacts
            .get_template_data(&reference.to_string())
            .await
            .context("failed to get template data from blueprint")
    }

    pub async fn resolve(&self, params: &ExecParams) -> Result<ResolvedTemplates> {
        if let Some(reference) = ExecParams::non_empty(&params.blueprint) {
            let reference =
                OciReference::parse(reference).context("failed to parse blueprint reference")?;
            info!(reference = %reference, "using explicit blueprint");
            let data = self.fetch(&reference).await?;
            return Ok(ResolvedTemplates {
                data,
                source: TemplateSource::Explicit(reference),
            });
        }

        let local = self
            .blueprint
            .get_local_template_data()
            .context("failed to get local template data")?;
        if !local.is_empty() {
            debug!(files = local.len(), "using local templates");
            return Ok(ResolvedTemplates {
                data: local,
                source: TemplateSource::Local,
            });
        }

        if self.artifacts.is_some() {
            let reference = OciReference::parse(DEFAULT_BLUEPRINT_REFERENCE)
                .context("failed to parse blueprint reference")?;
            info!(reference = %reference, "using default blueprint");
            let data = self.fetch(&reference).await?;
            return Ok(ResolvedTemplates {
                data,
                source: TemplateSource::DefaultReference(reference),
            });
        }

        let context = self.context_name(params);
        let data = self
            .blueprint
            .get_default_template_data(&context)
            .context("failed to get default template data")?;
        debug!(context = %context, files = data.len(), "using embedded templates");
        Ok(ResolvedTemplates {
            data,
            source: TemplateSource::Embedded,
        })
    }

    /// Resolves, filters and renders templates, loading any rendered
    /// blueprint into the handler. Returns the rendered data.
    pub async fn process(&self, params: &ExecParams) -> Result<RenderedData> {
        let resolved = self.resolve(params).await?;
        let data = filter_patches(resolved.data, &self.blueprint.get_kustomizations());

        let mut rendered = RenderedData::new();
        if data.is_empty() {
            return Ok(rendered);
        }

        let renderer = self
            .renderer
            .as_ref()
            .ok_or_else(|| WindsorError::missing("template renderer"))
            .context("failed to process template data")?;
        renderer
            .process(&data, &mut rendered)
            .await
            .context("failed to process template data")?;

        if let Some(Value::Object(blueprint)) = rendered.get(BLUEPRINT_KEY) {
            self.blueprint
                .load_data(blueprint, resolved.source.oci())
                .context("failed to load blueprint from template")?;
        }
        Ok(rendered)
    }
}

fn normalize_patch(path: &str) -> String {
    let path = path.trim_start_matches("./");
    let path = if path.starts_with(PATCHES_PREFIX) {
        path.to_string()
    } else {
        format!("{}{}", PATCHES_PREFIX, path)
    };
    template_key(&path)
}

/// Drops `patches/` templates no kustomization references. Everything else
/// passes through, and nothing is dropped when there are no kustomizations.
pub fn filter_patches(data: TemplateData, kustomizations: &[Kustomization]) -> TemplateData {
    if kustomizations.is_empty() {
        return data;
    }

    let referenced: HashSet<String> = kustomizations
        .iter()
        .flat_map(|k| k.patches.iter())
        .map(|patch| normalize_patch(&patch.path))
        .collect();

    data.into_iter()
        .filter(|(path, _)| {
            !path.starts_with(PATCHES_PREFIX) || referenced.contains(&template_key(path))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::model::PatchReference;
    use crate::pipelines::fakes::{Harness, LOCAL_CONFIG};
    use async_trait::async_trait;

    fn data(paths: &[&str]) -> TemplateData {
        paths
            .iter()
            .map(|p| (p.to_string(), b"{}".to_vec()))
            .collect()
    }

    fn kustomization(patches: &[&str]) -> Kustomization {
        Kustomization {
            name: "dns".to_string(),
            patches: patches
                .iter()
                .map(|p| PatchReference {
                    path: p.to_string(),
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_filter_keeps_referenced_patches_only() {
        let filtered = filter_patches(
            data(&[
                "blueprint.jsonnet",
                "patches/dns/coredns.jsonnet",
                "patches/ingress/nginx.jsonnet",
                "terraform/cluster.jsonnet",
            ]),
            &[kustomization(&["patches/dns/coredns.yaml"])],
        );

        let keys: Vec<_> = filtered.keys().cloned().collect();
        assert_eq!(
            keys,
            vec![
                "blueprint.jsonnet",
                "patches/dns/coredns.jsonnet",
                "terraform/cluster.jsonnet"
            ]
        );
    }

    #[test]
    fn test_filter_accepts_paths_relative_to_patches() {
        let filtered = filter_patches(
            data(&["patches/dns/coredns.jsonnet"]),
            &[kustomization(&["dns/coredns.yaml"])],
        );
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn test_no_kustomizations_means_no_filtering() {
        let input = data(&["patches/dns/coredns.jsonnet", "patches/ingress/nginx.jsonnet"]);
        assert_eq!(filter_patches(input.clone(), &[]), input);
    }

    #[test]
    fn test_kustomizations_without_patches_drop_all_patches() {
        let filtered = filter_patches(
            data(&["patches/dns/coredns.jsonnet", "values.yaml"]),
            &[kustomization(&[])],
        );
        assert_eq!(filtered.keys().cloned().collect::<Vec<_>>(), vec!["values.yaml"]);
    }

    fn params_with_blueprint(reference: &str) -> ExecParams {
        let mut params = ExecParams::new();
        params.blueprint = Some(reference.to_string());
        params
    }

    #[tokio::test]
    async fn test_explicit_reference_beats_local_templates() {
        let harness = Harness::new(LOCAL_CONFIG);
        harness.blueprint.set_local_templates(data(&["blueprint.jsonnet"]));
        let remote = data(&["remote.jsonnet"]);
        let artifacts: Arc<dyn ArtifactBuilder> = harness.artifacts(remote.clone());

        let resolved = TemplateResolver::new(harness.blueprint.clone())
            .with_artifacts(Some(artifacts))
            .resolve(&params_with_blueprint("oci://ghcr.io/acme/blueprint:v1"))
            .await
            .unwrap();

        assert_eq!(resolved.data, remote);
        assert!(matches!(resolved.source, TemplateSource::Explicit(_)));
        assert_eq!(
            harness.calls(),
            vec!["artifacts.get(oci://ghcr.io/acme/blueprint:v1)"]
        );
    }

    #[tokio::test]
    async fn test_malformed_reference_is_fatal() {
        let harness = Harness::new(LOCAL_CONFIG);
        harness.blueprint.set_local_templates(data(&["blueprint.jsonnet"]));
        let artifacts: Arc<dyn ArtifactBuilder> = harness.artifacts(TemplateData::new());

        let err = TemplateResolver::new(harness.blueprint.clone())
            .with_artifacts(Some(artifacts))
            .resolve(&params_with_blueprint("not a ref"))
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).starts_with("failed to parse blueprint reference"));
        assert!(harness.calls().is_empty());
    }

    #[tokio::test]
    async fn test_default_reference_when_no_local_templates() {
        let harness = Harness::new(LOCAL_CONFIG);
        let artifacts: Arc<dyn ArtifactBuilder> = harness.artifacts(data(&["blueprint.jsonnet"]));

        let resolved = TemplateResolver::new(harness.blueprint.clone())
            .with_artifacts(Some(artifacts))
            .resolve(&ExecParams::new())
            .await
            .unwrap();

        assert!(matches!(resolved.source, TemplateSource::DefaultReference(_)));
        let calls = harness.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].contains("ghcr.io/windsorcli/core"));
    }

    #[tokio::test]
    async fn test_embedded_templates_without_artifact_builder() {
        let harness = Harness::new(LOCAL_CONFIG);
        let resolver = TemplateResolver::new(harness.blueprint.clone());

        let resolved = resolver.resolve(&ExecParams::new()).await.unwrap();
        assert_eq!(resolved.source, TemplateSource::Embedded);
        assert_eq!(resolved.data["blueprint.jsonnet"], b"{ name: 'local' }".to_vec());

        let mut params = ExecParams::new();
        params.context_name = Some("staging".to_string());
        let resolved = resolver.resolve(&params).await.unwrap();
        assert_eq!(resolved.data["blueprint.jsonnet"], b"{ name: 'staging' }".to_vec());
    }

    #[tokio::test]
    async fn test_rendered_blueprint_is_loaded_with_its_source() {
        let harness = Harness::new(LOCAL_CONFIG);
        let artifacts: Arc<dyn ArtifactBuilder> = harness.artifacts(data(&["blueprint.jsonnet"]));
        let renderer: Arc<dyn TemplateRenderer> =
            Arc::new(crate::pipelines::fakes::FakeRenderer(harness.recorder.clone()));

        TemplateResolver::new(harness.blueprint.clone())
            .with_artifacts(Some(artifacts))
            .with_renderer(Some(renderer))
            .process(&params_with_blueprint("oci://ghcr.io/acme/blueprint:v1"))
            .await
            .unwrap();

        let loaded = harness.blueprint.loaded_data.lock().unwrap().clone();
        let (blueprint, oci) = loaded.unwrap();
        assert_eq!(blueprint["kind"], Value::from("Blueprint"));
        assert_eq!(oci.unwrap().to_string(), "oci://ghcr.io/acme/blueprint:v1");
    }

    struct ScalarBlueprint;

    #[async_trait]
    impl TemplateRenderer for ScalarBlueprint {
        async fn process(&self, _data: &TemplateData, rendered: &mut RenderedData) -> Result<()> {
            rendered.insert(BLUEPRINT_KEY.to_string(), Value::from("not a map"));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_non_map_blueprint_is_ignored() {
        let harness = Harness::new(LOCAL_CONFIG);
        harness.blueprint.set_local_templates(data(&["blueprint.jsonnet"]));

        let renderer: Arc<dyn TemplateRenderer> = Arc::new(ScalarBlueprint);
        let rendered = TemplateResolver::new(harness.blueprint.clone())
            .with_renderer(Some(renderer))
            .process(&ExecParams::new())
            .await
            .unwrap();

        assert_eq!(rendered[BLUEPRINT_KEY], Value::from("not a map"));
        assert!(harness.blueprint.loaded_data.lock().unwrap().is_none());
        assert!(!harness.calls().contains(&"blueprint.load_data".to_string()));
    }
}
