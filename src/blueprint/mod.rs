//! Blueprints: model, sources, rendering and the handler that installs them

pub mod artifact;
mod embedded;
mod handler;
pub mod model;
pub mod reference;
pub mod renderer;
pub mod resolver;

pub use artifact::{ArtifactBuilder, OciArtifactBuilder};
pub use handler::DefaultBlueprintHandler;
pub use model::{Blueprint, Kustomization};
pub use reference::{OciReference, DEFAULT_BLUEPRINT_REFERENCE};
pub use renderer::{JsonnetTemplateRenderer, TemplateRenderer};
pub use resolver::{filter_patches, TemplateResolver, TemplateSource};

use crate::context::Signal;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Relative template path to raw content.
pub type TemplateData = BTreeMap<String, Vec<u8>>;

/// Template key (path minus extension) to evaluated value.
pub type RenderedData = BTreeMap<String, Value>;

#[async_trait]
pub trait BlueprintHandler: Send + Sync {
    fn initialize(&self) -> Result<()>;

    /// Reads the context's blueprint file, if there is one.
    fn load_config(&self) -> Result<()>;

    /// Like [`BlueprintHandler::load_config`], falling back to an empty
    /// blueprint named after the context.
    fn load_blueprint(&self) -> Result<()>;

    /// The loaded blueprint with defaults applied.
    fn generate(&self) -> Blueprint;

    /// Removes the blueprint's kustomizations from the cluster.
    async fn down(&self) -> Result<()>;

    async fn install(&self) -> Result<()>;

    async fn wait_for_kustomizations(
        &self,
        signal: &Signal,
        message: &str,
        names: &[String],
    ) -> Result<()>;

    /// Files under `contexts/_template/`. Empty when the directory is absent.
    fn get_local_template_data(&self) -> Result<TemplateData>;

    fn get_default_template_data(&self, context: &str) -> Result<TemplateData>;

    fn get_kustomizations(&self) -> Vec<Kustomization>;

    /// Replaces the loaded blueprint with `data`, pointing it at `oci` when given.
    fn load_data(&self, data: &Map<String, Value>, oci: Option<&OciReference>) -> Result<()>;

    /// Writes the blueprint file unless it exists and `overwrite` is false.
    fn write(&self, overwrite: bool) -> Result<()>;
}
