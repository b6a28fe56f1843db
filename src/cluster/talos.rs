use super::ClusterClient;
use crate::context::{Signal, SignalError};
use crate::shell::{Shell, ShellCommand};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Talos node health via `talosctl`
pub struct TalosClusterClient {
    shell: Arc<dyn Shell>,
    talosconfig: Option<PathBuf>,
    poll_interval: Duration,
    closed: AtomicBool,
}

impl TalosClusterClient {
    pub fn new(shell: Arc<dyn Shell>, talosconfig: Option<PathBuf>) -> Self {
        Self {
            shell,
            talosconfig,
            poll_interval: DEFAULT_POLL_INTERVAL,
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn talosctl(&self, node: &str) -> ShellCommand {
        let mut cmd = ShellCommand::new("talosctl");
        if let Some(config) = &self.talosconfig {
            cmd = cmd.arg("--talosconfig").arg(config.display().to_string());
        }
        cmd.args(["--nodes", node])
    }

    async fn node_version(&self, node: &str) -> Result<String> {
        let output = self
            .shell
            .run(&self.talosctl(node).args(["version", "--short"]))
            .await?;
        server_tag(&output).ok_or_else(|| anyhow!("could not parse version reported by node {}", node))
    }

    async fn check_node(&self, node: &str, expected_version: Option<&str>) -> Result<()> {
        self.shell
            .run(&self.talosctl(node).args(["service", "kubelet", "status"]))
            .await
            .with_context(|| format!("node {} is not healthy", node))?;

        if let Some(expected) = expected_version {
            let expected = expected.trim_start_matches('v');
            let actual = self.node_version(node).await?;
            if actual != expected {
                bail!(
                    "node {} is running version {}, expected {}",
                    node,
                    actual,
                    expected
                );
            }
        }
        Ok(())
    }

    async fn check_all(&self, nodes: &[String], expected_version: Option<&str>) -> Result<()> {
        for node in nodes {
            self.check_node(node, expected_version).await?;
            debug!(node = %node, "node healthy");
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterClient for TalosClusterClient {
    async fn wait_for_nodes_healthy(
        &self,
        signal: &Signal,
        nodes: &[String],
        expected_version: Option<&str>,
    ) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            bail!("cluster client is closed");
        }

        info!(nodes = nodes.len(), "waiting for nodes to become healthy");
        let mut last_error = None;
        loop {
            match signal.run(self.check_all(nodes, expected_version)).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is::<SignalError>() => return Err(timed_out(e, last_error)),
                Err(e) => {
                    debug!(error = %e, "nodes not healthy yet");
                    last_error = Some(e);
                }
            }

            if let Err(reason) = signal.sleep(self.poll_interval).await {
                return Err(timed_out(reason.into(), last_error));
            }
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"Tag:\s*v?(\d+\.\d+\.\d+)").expect("tag pattern is valid"))
}

/// Version from the `Tag:` line of the server section. The `NODE:` line and
/// the client section are ignored.
fn server_tag(output: &str) -> Option<String> {
    let (_, server) = output.split_once("Server:")?;
    tag_pattern()
        .captures(server)
        .map(|captures| captures[1].to_string())
}

fn timed_out(reason: anyhow::Error, last_error: Option<anyhow::Error>) -> anyhow::Error {
    match last_error {
        Some(last) => anyhow!("{}: last error: {:#}", reason, last),
        None => reason,
    }
}
