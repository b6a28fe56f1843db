use super::{EnvPrinter, EnvVars};
use crate::config::ConfigHandler;
use crate::fs::FileSystem;
use crate::shell::Shell;
use crate::virt::colima_profile;
use anyhow::{Context, Result};
use serde_yaml::Value;
use std::path::PathBuf;
use std::sync::Arc;

/// Windsor's own session variables plus the context's `environment` map.
pub struct WindsorEnvPrinter {
    shell: Arc<dyn Shell>,
    config: Arc<dyn ConfigHandler>,
}

impl WindsorEnvPrinter {
    pub fn new(shell: Arc<dyn Shell>, config: Arc<dyn ConfigHandler>) -> Self {
        Self { shell, config }
    }
}

impl EnvPrinter for WindsorEnvPrinter {
    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    fn get_env_vars(&self) -> Result<EnvVars> {
        let mut vars = EnvVars::new();
        vars.insert("WINDSOR_CONTEXT".into(), self.config.get_context());
        vars.insert(
            "WINDSOR_PROJECT_ROOT".into(),
            self.shell.project_root()?.display().to_string(),
        );
        vars.insert("WINDSOR_SESSION_TOKEN".into(), self.shell.session_token());

        if let Some(Value::Mapping(environment)) = self.config.get("environment") {
            for (key, value) in environment {
                let Value::String(key) = key else { continue };
                let value = match value {
                    Value::String(s) => s,
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => continue,
                };
                vars.insert(key, value);
            }
        }
        Ok(vars)
    }
}

/// `KUBECONFIG` for the context's cluster.
pub struct KubeEnvPrinter {
    config: Arc<dyn ConfigHandler>,
}

impl KubeEnvPrinter {
    pub fn new(config: Arc<dyn ConfigHandler>) -> Self {
        Self { config }
    }
}

impl EnvPrinter for KubeEnvPrinter {
    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    fn get_env_vars(&self) -> Result<EnvVars> {
        let path = self
            .config
            .config_root()?
            .join(".kube")
            .join("config")
            .display()
            .to_string();
        Ok(EnvVars::from([
            ("KUBECONFIG".to_string(), path.clone()),
            ("KUBE_CONFIG_PATH".to_string(), path),
        ]))
    }
}

pub struct TalosEnvPrinter {
    config: Arc<dyn ConfigHandler>,
}

impl TalosEnvPrinter {
    pub fn new(config: Arc<dyn ConfigHandler>) -> Self {
        Self { config }
    }
}

impl EnvPrinter for TalosEnvPrinter {
    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    fn get_env_vars(&self) -> Result<EnvVars> {
        let path = self.config.config_root()?.join(".talos").join("config");
        Ok(EnvVars::from([(
            "TALOSCONFIG".to_string(),
            path.display().to_string(),
        )]))
    }
}

/// `DOCKER_HOST` pointing at the context's Colima socket.
pub struct DockerEnvPrinter {
    config: Arc<dyn ConfigHandler>,
    home: Option<PathBuf>,
}

impl DockerEnvPrinter {
    pub fn new(config: Arc<dyn ConfigHandler>) -> Self {
        Self {
            config,
            home: dirs::home_dir(),
        }
    }

    pub fn with_home(mut self, home: PathBuf) -> Self {
        self.home = Some(home);
        self
    }
}

impl EnvPrinter for DockerEnvPrinter {
    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    fn get_env_vars(&self) -> Result<EnvVars> {
        let mut vars = EnvVars::new();
        if self.config.get_string("vm.driver", "") != "colima" {
            return Ok(vars);
        }
        let home = self
            .home
            .clone()
            .context("Failed to determine home directory")?;
        let socket = home
            .join(".colima")
            .join(colima_profile(&self.config.get_context()))
            .join("docker.sock");
        vars.insert(
            "DOCKER_HOST".into(),
            format!("unix://{}", socket.display()),
        );
        Ok(vars)
    }
}

/// Terraform settings for the component the working directory is in.
///
/// Outside `<project>/terraform/<component>` nothing is printed.
pub struct TerraformEnvPrinter {
    shell: Arc<dyn Shell>,
    config: Arc<dyn ConfigHandler>,
    fs: Arc<dyn FileSystem>,
    working_dir: Option<PathBuf>,
}

impl TerraformEnvPrinter {
    pub fn new(
        shell: Arc<dyn Shell>,
        config: Arc<dyn ConfigHandler>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            shell,
            config,
            fs,
            working_dir: None,
        }
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    fn component(&self) -> Result<Option<String>> {
        let cwd = match &self.working_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("Failed to determine current directory")?,
        };
        let terraform_dir = self.shell.project_root()?.join("terraform");
        Ok(cwd
            .strip_prefix(&terraform_dir)
            .ok()
            .map(|rel| {
                rel.components()
                    .map(|c| c.as_os_str().to_string_lossy().to_string())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .filter(|component| !component.is_empty()))
    }
}

impl EnvPrinter for TerraformEnvPrinter {
    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    fn get_env_vars(&self) -> Result<EnvVars> {
        let mut vars = EnvVars::new();
        let Some(component) = self.component()? else {
            return Ok(vars);
        };
        let config_root = self.config.config_root()?;
        let state = config_root
            .join(".tfstate")
            .join(&component)
            .join("terraform.tfstate");
        vars.insert(
            "TF_DATA_DIR".into(),
            config_root
                .join(".terraform")
                .join(&component)
                .display()
                .to_string(),
        );
        vars.insert(
            "TF_CLI_ARGS_init".into(),
            format!("-backend=true -backend-config=path={}", state.display()),
        );

        let var_file = config_root
            .join("terraform")
            .join(format!("{}.tfvars", component));
        if self.fs.exists(&var_file) {
            let arg = format!("-var-file={}", var_file.display());
            for command in ["plan", "apply", "destroy", "import"] {
                vars.insert(format!("TF_CLI_ARGS_{}", command), arg.clone());
            }
        }
        Ok(vars)
    }
}
