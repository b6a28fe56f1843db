//! Blueprint artifacts pulled from an OCI registry

use super::reference::OciReference;
use super::TemplateData;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use reqwest::header::{ACCEPT, AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Read;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

const TEMPLATE_PREFIX: &str = "_template/";
const MANIFEST_MEDIA_TYPES: &str =
    "application/vnd.oci.image.manifest.v1+json, application/vnd.docker.distribution.manifest.v2+json";

#[async_trait]
pub trait ArtifactBuilder: Send + Sync {
    /// Template files of the artifact at `reference`, keyed by their path
    /// below `_template/`.
    async fn get_template_data(&self, reference: &str) -> Result<TemplateData>;
}

#[derive(Debug, Deserialize)]
struct Manifest {
    layers: Vec<Descriptor>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Descriptor {
    digest: String,
    #[serde(default)]
    media_type: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Anonymous-pull OCI client. Results are memoised per reference.
pub struct OciArtifactBuilder {
    client: Client,
    cache: Mutex<HashMap<String, TemplateData>>,
}

impl OciArtifactBuilder {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent(concat!("windsor/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Exchanges a `WWW-Authenticate: Bearer realm=..,service=..,scope=..`
    /// challenge for an anonymous token.
    async fn token(&self, challenge: &str) -> Result<String> {
        let params = parse_challenge(challenge);
        let realm = params
            .get("realm")
            .ok_or_else(|| anyhow!("registry challenge has no realm: {}", challenge))?;
        let query: Vec<(&str, &str)> = ["service", "scope"]
            .iter()
            .filter_map(|key| params.get(*key).map(|v| (*key, v.as_str())))
            .collect();

        let response: TokenResponse = self
            .client
            .get(realm)
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("Failed to decode registry token")?;
        response
            .token
            .or(response.access_token)
            .ok_or_else(|| anyhow!("registry returned no token"))
    }

    async fn get(&self, url: &str, accept: Option<&str>, token: &mut Option<String>) -> Result<reqwest::Response> {
        for _ in 0..2 {
            let mut request = self.client.get(url);
            if let Some(accept) = accept {
                request = request.header(ACCEPT, accept);
            }
            if let Some(token) = token.as_deref() {
                request = request.header(AUTHORIZATION, format!("Bearer {}", token));
            }
            let response = request.send().await?;

            if response.status() == StatusCode::UNAUTHORIZED && token.is_none() {
                let challenge = response
                    .headers()
                    .get(WWW_AUTHENTICATE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                *token = Some(self.token(&challenge).await?);
                continue;
            }
            return Ok(response.error_for_status()?);
        }
        bail!("registry rejected credentials for {}", url)
    }

    async fn pull(&self, reference: &OciReference) -> Result<TemplateData> {
        let base = format!("https://{}/v2/{}", reference.registry, reference.repository);
        let mut token = None;

        let manifest: Manifest = self
            .get(
                &format!("{}/manifests/{}", base, reference.tag),
                Some(MANIFEST_MEDIA_TYPES),
                &mut token,
            )
            .await?
            .json()
            .await
            .context("Failed to decode artifact manifest")?;

        let layer = manifest
            .layers
            .first()
            .ok_or_else(|| anyhow!("artifact {} has no layers", reference))?;
        debug!(digest = %layer.digest, media_type = %layer.media_type, "fetching layer");

        let blob = self
            .get(&format!("{}/blobs/{}", base, layer.digest), None, &mut token)
            .await?
            .bytes()
            .await?;
        verify_digest(&blob, &layer.digest)?;
        extract_templates(&blob)
    }
}

fn parse_challenge(challenge: &str) -> HashMap<String, String> {
    let params = challenge
        .trim()
        .strip_prefix("Bearer ")
        .unwrap_or(challenge);
    params
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().trim_matches('"').to_string()))
        .collect()
}

fn verify_digest(blob: &[u8], digest: &str) -> Result<()> {
    let expected = digest
        .strip_prefix("sha256:")
        .ok_or_else(|| anyhow!("unsupported digest algorithm: {}", digest))?;
    let actual = hex::encode(Sha256::digest(blob));
    if actual != expected {
        bail!("digest mismatch: expected {}, got sha256:{}", digest, actual);
    }
    Ok(())
}

/// Unpacks a gzipped tarball, keeping files below `_template/`.
pub fn extract_templates(blob: &[u8]) -> Result<TemplateData> {
    let mut archive = tar::Archive::new(GzDecoder::new(blob));
    let mut data = TemplateData::new();

    for entry in archive.entries().context("Failed to read artifact archive")? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = entry.path()?.to_string_lossy().replace('\\', "/");
        let path = path.trim_start_matches("./");
        let Some(relative) = path.strip_prefix(TEMPLATE_PREFIX) else {
            continue;
        };
        let relative = relative.to_string();
        let mut content = Vec::new();
        entry.read_to_end(&mut content)?;
        data.insert(relative, content);
    }
    Ok(data)
}

#[async_trait]
impl ArtifactBuilder for OciArtifactBuilder {
    async fn get_template_data(&self, reference: &str) -> Result<TemplateData> {
        if let Some(cached) = self.cache.lock().unwrap().get(reference) {
            debug!(reference, "using cached artifact");
            return Ok(cached.clone());
        }

        let parsed = OciReference::parse(reference)?;
        info!(reference = %parsed, "pulling blueprint artifact");
        let data = self
            .pull(&parsed)
            .await
            .with_context(|| format!("Failed to pull {}", parsed))?;

        self.cache
            .lock()
            .unwrap()
            .insert(reference.to_string(), data.clone());
        Ok(data)
    }
}
