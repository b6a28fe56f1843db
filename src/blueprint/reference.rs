use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// Well-known blueprint used when a project has no local templates.
pub const DEFAULT_BLUEPRINT_REFERENCE: &str = "oci://ghcr.io/windsorcli/core:latest";

const OCI_SCHEME: &str = "oci://";
const DEFAULT_TAG: &str = "latest";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("reference is empty")]
    Empty,

    #[error("reference '{0}' must start with oci://")]
    Scheme(String),

    #[error("reference '{0}' has no repository path")]
    MissingRepository(String),

    #[error("reference '{0}' contains invalid characters")]
    Invalid(String),
}

/// `oci://<registry>/<repository>[:<tag>]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OciReference {
    pub registry: String,
    pub repository: String,
    pub tag: String,
}

fn component_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z0-9]+(?:[._-][a-z0-9]+)*(?::[0-9]+)?$").expect("component pattern is valid")
    })
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9._-]{0,127}$").expect("tag pattern is valid"))
}

impl OciReference {
    pub fn parse(input: &str) -> Result<Self, ReferenceError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ReferenceError::Empty);
        }
        let rest = input
            .strip_prefix(OCI_SCHEME)
            .ok_or_else(|| ReferenceError::Scheme(input.to_string()))?;

        let (registry, path) = rest
            .split_once('/')
            .ok_or_else(|| ReferenceError::MissingRepository(input.to_string()))?;

        // A ':' after the last '/' separates the tag; one before it is a port.
        let (repository, tag) = match path.rsplit_once(':') {
            Some((repo, tag)) => (repo, tag),
            None => (path, DEFAULT_TAG),
        };

        if repository.is_empty() {
            return Err(ReferenceError::MissingRepository(input.to_string()));
        }
        let valid = component_pattern().is_match(registry)
            && repository
                .split('/')
                .all(|part| component_pattern().is_match(part))
            && tag_pattern().is_match(tag);
        if !valid {
            return Err(ReferenceError::Invalid(input.to_string()));
        }

        Ok(Self {
            registry: registry.to_string(),
            repository: repository.to_string(),
            tag: tag.to_string(),
        })
    }

    /// Last path segment, used as the blueprint source name.
    pub fn name(&self) -> &str {
        self.repository
            .rsplit('/')
            .next()
            .unwrap_or(&self.repository)
    }

    /// Reference without the tag, as stored in blueprint sources.
    pub fn url(&self) -> String {
        format!("{}{}/{}", OCI_SCHEME, self.registry, self.repository)
    }
}

impl FromStr for OciReference {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for OciReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.url(), self.tag)
    }
}
