use serde::{Deserialize, Serialize};

pub const BLUEPRINT_KIND: &str = "Blueprint";
pub const BLUEPRINT_API_VERSION: &str = "blueprints.windsorcli.dev/v1alpha1";
pub const DEFAULT_KUSTOMIZATION_NAMESPACE: &str = "system-gitops";

/// Declarative description of the infrastructure and workloads of a context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blueprint {
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub metadata: BlueprintMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<Repository>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Source>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub terraform: Vec<TerraformComponent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kustomizations: Vec<Kustomization>,
}

fn default_kind() -> String {
    BLUEPRINT_KIND.to_string()
}

fn default_api_version() -> String {
    BLUEPRINT_API_VERSION.to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlueprintMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub url: String,
    #[serde(default, rename = "ref")]
    pub reference: Reference,
}

/// Git or OCI location that kustomizations and terraform modules pull from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub url: String,
    #[serde(default, rename = "ref")]
    pub reference: Reference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_prefix: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TerraformComponent {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// `false` keeps the component on teardown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destroy: Option<bool>,
}

impl TerraformComponent {
    pub fn destroyable(&self) -> bool {
        self.destroy.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchReference {
    pub path: String,
}

/// A Flux kustomization with optional patch references
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kustomization {
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patches: Vec<PatchReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prune: Option<bool>,
}

impl Blueprint {
    pub fn named(name: &str) -> Self {
        Self {
            kind: default_kind(),
            api_version: default_api_version(),
            metadata: BlueprintMetadata {
                name: name.to_string(),
                description: None,
            },
            ..Default::default()
        }
    }

    pub fn kustomization_names(&self) -> Vec<String> {
        self.kustomizations.iter().map(|k| k.name.clone()).collect()
    }

    /// Fills the per-kustomization defaults Flux needs.
    pub fn with_defaults(mut self) -> Self {
        let default_source = self
            .repository
            .as_ref()
            .map(|_| self.metadata.name.clone())
            .or_else(|| self.sources.first().map(|s| s.name.clone()));

        for kustomization in &mut self.kustomizations {
            if kustomization.source.is_none() {
                kustomization.source = default_source.clone();
            }
            if kustomization.path.is_empty() {
                kustomization.path = kustomization.name.clone();
            }
            if !kustomization.path.starts_with("kustomize") {
                kustomization.path = format!("kustomize/{}", kustomization.path);
            }
            kustomization.interval.get_or_insert_with(|| "1m".to_string());
            kustomization.timeout.get_or_insert_with(|| "5m".to_string());
            kustomization.prune.get_or_insert(true);
        }
        self
    }
}
