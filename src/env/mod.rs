//! Environment variables injected into the user's shell and into `exec`
//!
//! Each printer contributes the variables of one tool. Values may reference
//! secrets (`${{ sops.path.to.key }}`), which the secrets providers resolve
//! before anything is printed or exported.

mod printers;
mod sops;

pub use printers::{
    DockerEnvPrinter, KubeEnvPrinter, TalosEnvPrinter, TerraformEnvPrinter, WindsorEnvPrinter,
};
pub use sops::SopsSecretsProvider;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Comma-separated names of the variables windsor last exported.
pub const MANAGED_ENV: &str = "WINDSOR_MANAGED_ENV";

pub type EnvVars = BTreeMap<String, String>;

pub trait EnvPrinter: Send + Sync {
    fn initialize(&self) -> Result<()>;

    fn get_env_vars(&self) -> Result<EnvVars>;
}

#[async_trait]
pub trait SecretsProvider: Send + Sync {
    fn initialize(&self) -> Result<()>;

    /// Replaces every secret reference this provider owns in `input`.
    async fn parse_secrets(&self, input: &str) -> Result<String>;
}

/// Merges every printer's variables (later printers win) and resolves secret
/// references in the values.
pub async fn collect_env(
    printers: &[Arc<dyn EnvPrinter>],
    secrets: &[Arc<dyn SecretsProvider>],
) -> Result<EnvVars> {
    let mut vars = EnvVars::new();
    for printer in printers {
        vars.extend(printer.get_env_vars()?);
    }
    for value in vars.values_mut() {
        for provider in secrets {
            *value = provider.parse_secrets(value).await?;
        }
    }
    Ok(vars)
}

/// Value of [`MANAGED_ENV`] for `vars`.
pub fn managed_list(vars: &EnvVars) -> String {
    vars.keys()
        .filter(|k| k.as_str() != MANAGED_ENV)
        .cloned()
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static [(&'static str, &'static str)]);

    impl EnvPrinter for Fixed {
        fn initialize(&self) -> Result<()> {
            Ok(())
        }
        fn get_env_vars(&self) -> Result<EnvVars> {
            Ok(self
                .0
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect())
        }
    }

    struct Upper;

    #[async_trait]
    impl SecretsProvider for Upper {
        fn initialize(&self) -> Result<()> {
            Ok(())
        }
        async fn parse_secrets(&self, input: &str) -> Result<String> {
            Ok(input.replace("secret", "SECRET"))
        }
    }

    #[tokio::test]
    async fn test_later_printers_win_and_secrets_resolve() {
        let printers: Vec<Arc<dyn EnvPrinter>> = vec![
            Arc::new(Fixed(&[("A", "1"), ("B", "secret")])),
            Arc::new(Fixed(&[("A", "2")])),
        ];
        let secrets: Vec<Arc<dyn SecretsProvider>> = vec![Arc::new(Upper)];

        let vars = collect_env(&printers, &secrets).await.unwrap();
        assert_eq!(vars["A"], "2");
        assert_eq!(vars["B"], "SECRET");
        assert_eq!(managed_list(&vars), "A,B");
    }
}
