use super::{KubernetesManager, Notify};
use crate::config::ConfigHandler;
use crate::context::{Signal, SignalError};
use crate::shell::{Shell, ShellCommand};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct ResourceList {
    #[serde(default)]
    items: Vec<Resource>,
}

#[derive(Debug, Deserialize)]
struct Resource {
    metadata: Metadata,
    #[serde(default)]
    status: Option<Status>,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct Status {
    #[serde(default)]
    conditions: Vec<Condition>,
}

#[derive(Debug, Deserialize)]
struct Condition {
    #[serde(rename = "type")]
    kind: String,
    status: String,
}

impl Resource {
    fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .map(|s| {
                s.conditions
                    .iter()
                    .any(|c| c.kind == "Ready" && c.status == "True")
            })
            .unwrap_or(false)
    }
}

fn ready_by_name(json: &str, names: &[String]) -> Result<HashMap<String, bool>> {
    let list: ResourceList = serde_json::from_str(json).context("Failed to parse kubectl output")?;
    let ready: HashMap<&str, bool> = list
        .items
        .iter()
        .map(|item| (item.metadata.name.as_str(), item.is_ready()))
        .collect();
    Ok(names
        .iter()
        .map(|name| (name.clone(), ready.get(name.as_str()).copied().unwrap_or(false)))
        .collect())
}

/// Kubernetes manager driving `kubectl` against the context's kubeconfig
pub struct KubectlManager {
    shell: Arc<dyn Shell>,
    config: Arc<dyn ConfigHandler>,
    poll_interval: Duration,
}

impl KubectlManager {
    pub fn new(shell: Arc<dyn Shell>, config: Arc<dyn ConfigHandler>) -> Self {
        Self {
            shell,
            config,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn kubectl(&self, endpoint: &str) -> Result<ShellCommand> {
        let kubeconfig = self.config.config_root()?.join(".kube").join("config");
        let mut cmd = ShellCommand::new("kubectl")
            .env("KUBECONFIG", kubeconfig.display().to_string());
        if !endpoint.is_empty() {
            cmd = cmd.arg(format!("--server={}", endpoint));
        }
        Ok(cmd)
    }

    async fn api_ready(&self, endpoint: &str) -> Result<()> {
        let output = self
            .shell
            .run(&self.kubectl(endpoint)?.args(["get", "--raw", "/readyz"]))
            .await?;
        if output.trim() != "ok" {
            bail!("API server not ready: {}", output.trim());
        }
        Ok(())
    }

    async fn node_status(&self, endpoint: &str, names: &[String]) -> Result<HashMap<String, bool>> {
        let output = self
            .shell
            .run(&self.kubectl(endpoint)?.args(["get", "nodes", "-o", "json"]))
            .await?;
        ready_by_name(&output, names)
    }
}

#[async_trait]
impl KubernetesManager for KubectlManager {
    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn wait_for_kubernetes_healthy(
        &self,
        signal: &Signal,
        endpoint: &str,
        output: Notify<'_>,
        node_names: &[String],
    ) -> Result<()> {
        let mut reported: HashSet<String> = HashSet::new();
        let mut last_error = anyhow!("Kubernetes API was never reached");

        loop {
            let attempt = signal
                .run(async {
                    self.api_ready(endpoint).await?;
                    if node_names.is_empty() {
                        return Ok(true);
                    }
                    let status = self.node_status(endpoint, node_names).await?;
                    for (name, ready) in &status {
                        if *ready && reported.insert(name.clone()) {
                            output(&format!("Node {} is Ready", name));
                        }
                    }
                    Ok(status.values().all(|ready| *ready))
                })
                .await;

            match attempt {
                Ok(true) => return Ok(()),
                Ok(false) => last_error = anyhow!("not all nodes are Ready"),
                Err(e) if e.is::<SignalError>() => {
                    return Err(anyhow!("{}: {:#}", e, last_error));
                }
                Err(e) => {
                    debug!(error = %e, "Kubernetes not healthy yet");
                    last_error = e;
                }
            }

            if let Err(reason) = signal.sleep(self.poll_interval).await {
                return Err(anyhow!("{}: {:#}", reason, last_error));
            }
        }
    }

    async fn get_node_ready_status(
        &self,
        signal: &Signal,
        node_names: &[String],
    ) -> Result<HashMap<String, bool>> {
        signal.run(self.node_status("", node_names)).await
    }

    async fn apply_manifest(&self, path: &Path) -> Result<()> {
        self.shell
            .run(
                &self
                    .kubectl("")?
                    .args(["apply", "-f"])
                    .arg(path.display().to_string()),
            )
            .await
            .with_context(|| format!("Failed to apply {}", path.display()))?;
        Ok(())
    }

    async fn delete_kustomization(&self, name: &str, namespace: &str) -> Result<()> {
        self.shell
            .run(&self.kubectl("")?.args([
                "delete",
                "kustomizations.kustomize.toolkit.fluxcd.io",
                name,
                "-n",
                namespace,
                "--ignore-not-found",
                "--wait=true",
            ]))
            .await
            .with_context(|| format!("Failed to delete kustomization {}", name))?;
        Ok(())
    }

    async fn get_kustomization_status(&self, names: &[String]) -> Result<HashMap<String, bool>> {
        let output = self
            .shell
            .run(&self.kubectl("")?.args([
                "get",
                "kustomizations.kustomize.toolkit.fluxcd.io",
                "-A",
                "-o",
                "json",
            ]))
            .await?;
        ready_by_name(&output, names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::YamlConfigHandler;
    use crate::fs::MockFileSystem;
    use crate::shell::MockShell;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    const NODES: &str = r#"{"items":[
        {"metadata":{"name":"cp-1"},"status":{"conditions":[{"type":"Ready","status":"True"}]}},
        {"metadata":{"name":"worker-1"},"status":{"conditions":[{"type":"Ready","status":"False"}]}}
    ]}"#;

    fn manager() -> (KubectlManager, Arc<MockShell>) {
        let shell = Arc::new(MockShell::new("/project"));
        let config = Arc::new(YamlConfigHandler::new(
            shell.clone(),
            Arc::new(MockFileSystem::new()),
        ));
        (
            KubectlManager::new(shell.clone(), config).with_poll_interval(Duration::from_millis(5)),
            shell,
        )
    }

    #[test]
    fn test_ready_by_name_defaults_unknown_to_false() {
        let names = vec!["cp-1".to_string(), "worker-1".to_string(), "ghost".to_string()];
        let status = ready_by_name(NODES, &names).unwrap();
        assert_eq!(status["cp-1"], true);
        assert_eq!(status["worker-1"], false);
        assert_eq!(status["ghost"], false);
    }

    #[tokio::test]
    async fn test_wait_passes_endpoint_and_reports_ready_nodes() {
        let (manager, shell) = manager();
        shell.respond("kubectl --server=https://10.0.0.1:6443 get --raw", "ok");
        shell.respond("kubectl --server=https://10.0.0.1:6443 get nodes", NODES);

        let lines = Mutex::new(Vec::new());
        let sink = |line: &str| lines.lock().unwrap().push(line.to_string());
        let signal = Signal::derive(&CancellationToken::new(), None);

        manager
            .wait_for_kubernetes_healthy(
                &signal,
                "https://10.0.0.1:6443",
                &sink,
                &["cp-1".to_string()],
            )
            .await
            .unwrap();

        assert_eq!(*lines.lock().unwrap(), vec!["Node cp-1 is Ready".to_string()]);
    }

    #[tokio::test]
    async fn test_wait_times_out_on_unready_node() {
        let (manager, shell) = manager();
        shell.respond("kubectl get --raw", "ok");
        shell.respond("kubectl get nodes", NODES);
        let signal = Signal::derive(&CancellationToken::new(), Some(Duration::from_millis(25)));

        let err = manager
            .wait_for_kubernetes_healthy(&signal, "", &|_: &str| {}, &["worker-1".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("deadline exceeded"));
    }
}
