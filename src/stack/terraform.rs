use super::Stack;
use crate::blueprint::model::TerraformComponent;
use crate::blueprint::{Blueprint, BlueprintHandler};
use crate::config::ConfigHandler;
use crate::fs::FileSystem;
use crate::shell::{Shell, ShellCommand};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

pub const MODULES_DIR: &str = ".windsor/.tf_modules";

/// Where a component's working directory and state live
struct ComponentLayout {
    dir: PathBuf,
    data_dir: PathBuf,
    state: PathBuf,
    var_file: PathBuf,
}

/// Runs `terraform` per blueprint component.
pub struct TerraformStack {
    shell: Arc<dyn Shell>,
    config: Arc<dyn ConfigHandler>,
    fs: Arc<dyn FileSystem>,
    blueprint: Arc<dyn BlueprintHandler>,
}

impl TerraformStack {
    pub fn new(
        shell: Arc<dyn Shell>,
        config: Arc<dyn ConfigHandler>,
        fs: Arc<dyn FileSystem>,
        blueprint: Arc<dyn BlueprintHandler>,
    ) -> Self {
        Self {
            shell,
            config,
            fs,
            blueprint,
        }
    }

    fn layout(&self, component: &TerraformComponent) -> Result<ComponentLayout> {
        let root = self.shell.project_root()?;
        let config_root = self.config.config_root()?;
        let dir = match component.source {
            Some(_) => root.join(MODULES_DIR).join(&component.path),
            None => root.join("terraform").join(&component.path),
        };
        Ok(ComponentLayout {
            dir,
            data_dir: config_root.join(".terraform").join(&component.path),
            state: config_root
                .join(".tfstate")
                .join(&component.path)
                .join("terraform.tfstate"),
            var_file: config_root
                .join("terraform")
                .join(format!("{}.tfvars", component.path)),
        })
    }

    fn terraform(&self, layout: &ComponentLayout) -> ShellCommand {
        ShellCommand::new("terraform")
            .arg(format!("-chdir={}", layout.dir.display()))
            .env("TF_DATA_DIR", layout.data_dir.display().to_string())
            .env("TF_IN_AUTOMATION", "1")
    }

    fn with_var_file(&self, command: ShellCommand, layout: &ComponentLayout) -> ShellCommand {
        if self.fs.exists(&layout.var_file) {
            command.arg(format!("-var-file={}", layout.var_file.display()))
        } else {
            command
        }
    }

    async fn init(&self, component: &TerraformComponent, layout: &ComponentLayout) -> Result<()> {
        let mut init = self.terraform(layout).args(["init", "-input=false", "-upgrade"]);
        if let Some(source) = &component.source {
            if !self.fs.exists(&layout.dir) {
                init = init.arg(format!("-from-module={}", source));
            }
        }
        init = init.arg(format!("-backend-config=path={}", layout.state.display()));
        self.shell
            .run_progress(&format!("🌎 Initializing {}", component.path), &init)
            .await
            .with_context(|| format!("error initializing terraform component {}", component.path))?;
        Ok(())
    }
}

#[async_trait]
impl Stack for TerraformStack {
    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn up(&self) -> Result<()> {
        self.blueprint.load_blueprint()?;
        let blueprint = self.blueprint.generate();
        info!(components = blueprint.terraform.len(), "applying stack");

        for component in &blueprint.terraform {
            let layout = self.layout(component)?;
            self.init(component, &layout).await?;

            let apply = self.with_var_file(
                self.terraform(&layout)
                    .args(["apply", "-input=false", "-auto-approve"]),
                &layout,
            );
            self.shell
                .run_progress(&format!("🌎 Applying {}", component.path), &apply)
                .await
                .with_context(|| format!("error applying terraform component {}", component.path))?;
            debug!(component = %component.path, "applied");
        }
        Ok(())
    }

    async fn down(&self, blueprint: &Blueprint) -> Result<()> {
        for component in blueprint.terraform.iter().rev() {
            if !component.destroyable() {
                info!(component = %component.path, "skipping destroy");
                continue;
            }
            let layout = self.layout(component)?;
            if !self.fs.exists(&layout.dir) {
                debug!(component = %component.path, "component directory missing, nothing to destroy");
                continue;
            }
            self.init(component, &layout).await?;

            let destroy = self.with_var_file(
                self.terraform(&layout)
                    .args(["destroy", "-input=false", "-auto-approve"]),
                &layout,
            );
            self.shell
                .run_progress(&format!("🗑️ Destroying {}", component.path), &destroy)
                .await
                .with_context(|| {
                    format!("error destroying terraform component {}", component.path)
                })?;
        }
        Ok(())
    }
}
