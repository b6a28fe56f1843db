//! Files generated from rendered template data during `init`

mod gitignore;
mod kustomize;
mod terraform;

pub use gitignore::GitGenerator;
pub use kustomize::KustomizeGenerator;
pub use terraform::TerraformGenerator;

use crate::blueprint::RenderedData;
use anyhow::Result;

pub trait Generator: Send + Sync {
    fn initialize(&self) -> Result<()>;

    /// Writes the generator's files. Existing files are kept unless `overwrite`.
    fn generate(&self, data: &RenderedData, overwrite: bool) -> Result<()>;
}

/// Rendered entries below `prefix/`, keyed by the remainder of the key.
pub(crate) fn entries_under<'a>(
    data: &'a RenderedData,
    prefix: &str,
) -> impl Iterator<Item = (&'a str, &'a serde_json::Value)> + 'a {
    let prefix = format!("{}/", prefix);
    data.iter().filter_map(move |(key, value)| {
        key.strip_prefix(prefix.as_str())
            .filter(|rest| !rest.is_empty())
            .map(|rest| (rest, value))
    })
}
