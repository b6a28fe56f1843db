//! Execution context handed to every pipeline.
//!
//! Parameters are typed and optional: `None` means the caller did not provide a
//! value, which is distinct from an explicit `Some(false)` or empty value. The
//! context also carries the output sink and the root cancellation token.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// User-facing progress and status lines.
pub type OutputSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Operation parameters for a single CLI invocation.
#[derive(Debug, Clone, Default)]
pub struct ExecParams {
    pub operation: Option<String>,
    pub nodes: Option<Vec<String>>,
    pub timeout: Option<Duration>,
    pub version: Option<String>,
    pub k8s_endpoint: Option<String>,
    pub k8s_endpoint_provided: Option<bool>,
    pub check_node_ready: Option<bool>,
    pub wait: Option<bool>,
    pub clean: Option<bool>,
    pub skip_k8s: Option<bool>,
    pub skip_terraform: Option<bool>,
    pub skip_docker: Option<bool>,
    pub blueprint: Option<String>,
    pub context_name: Option<String>,
    pub trust: Option<bool>,
    pub install: Option<bool>,
    pub reset: Option<bool>,
    pub shell_name: Option<String>,
    pub command: Option<Vec<String>>,
}

impl ExecParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// A flag that was not provided reads as `false`.
    pub fn flag(value: Option<bool>) -> bool {
        value.unwrap_or(false)
    }

    pub fn nodes(&self) -> &[String] {
        self.nodes.as_deref().unwrap_or(&[])
    }

    /// Empty strings are treated as not provided.
    pub fn non_empty(value: &Option<String>) -> Option<&str> {
        value.as_deref().filter(|v| !v.is_empty())
    }
}

/// Immutable bag of parameters plus the output sink and cancellation root.
#[derive(Clone)]
pub struct ExecContext {
    params: ExecParams,
    output: Option<OutputSink>,
    cancel: CancellationToken,
}

impl ExecContext {
    pub fn new(params: ExecParams) -> Self {
        Self {
            params,
            output: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_output(mut self, output: OutputSink) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn params(&self) -> &ExecParams {
        &self.params
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Writes a line to the output sink. Missing sink is a no-op.
    pub fn emit(&self, message: &str) {
        if let Some(output) = &self.output {
            output(message);
        }
    }

    /// Derives a sub-signal for one blocking wait.
    pub fn signal(&self, timeout: Option<Duration>) -> Signal {
        Signal::derive(&self.cancel, timeout)
    }
}

impl std::fmt::Debug for ExecContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecContext")
            .field("params", &self.params)
            .field("output", &self.output.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// How long a sub-signal may live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    Bounded(Duration),
    Unbounded,
}

impl Deadline {
    /// Positive timeouts bound the signal; zero or absent leaves it unbounded.
    pub fn from_timeout(timeout: Option<Duration>) -> Self {
        match timeout {
            Some(duration) if !duration.is_zero() => Deadline::Bounded(duration),
            _ => Deadline::Unbounded,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignalError {
    #[error("context canceled")]
    Cancelled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation plus optional deadline for a single wait.
///
/// The signal owns a child of the parent token, so cancelling the parent
/// propagates. Dropping the signal cancels the child.
#[derive(Debug)]
pub struct Signal {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Signal {
    pub fn derive(parent: &CancellationToken, timeout: Option<Duration>) -> Self {
        let deadline = match Deadline::from_timeout(timeout) {
            Deadline::Bounded(duration) => Some(Instant::now() + duration),
            Deadline::Unbounded => None,
        };
        Self {
            token: parent.child_token(),
            deadline,
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns why the signal is done, if it is.
    pub fn check(&self) -> Result<(), SignalError> {
        if self.token.is_cancelled() {
            return Err(SignalError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(SignalError::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Resolves when the signal is cancelled or its deadline passes.
    pub async fn done(&self) -> SignalError {
        let deadline = self.deadline;
        tokio::select! {
            biased;
            _ = self.token.cancelled() => SignalError::Cancelled,
            _ = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            } => SignalError::DeadlineExceeded,
        }
    }

    /// Runs `fut` until it completes or the signal is done.
    pub async fn run<T, F>(&self, fut: F) -> anyhow::Result<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        tokio::select! {
            reason = self.done() => Err(reason.into()),
            result = fut => result,
        }
    }

    /// Sleeps for `interval`, failing early when the signal is done.
    pub async fn sleep(&self, interval: Duration) -> Result<(), SignalError> {
        tokio::select! {
            reason = self.done() => Err(reason),
            _ = tokio::time::sleep(interval) => self.check(),
        }
    }
}

impl Drop for Signal {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_absent_flags_read_false() {
        let params = ExecParams::new();
        assert!(!ExecParams::flag(params.clean));
        assert!(params.nodes().is_empty());
        assert_eq!(ExecParams::non_empty(&Some(String::new())), None);
    }

    #[test]
    fn test_emit_without_sink_is_noop() {
        let ctx = ExecContext::new(ExecParams::new());
        ctx.emit("nobody listening");
    }

    #[test]
    fn test_emit_with_sink() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let captured = lines.clone();
        let ctx = ExecContext::new(ExecParams::new()).with_output(Arc::new(move |line: &str| {
            captured.lock().unwrap().push(line.to_string())
        }));

        ctx.emit("hello");
        assert_eq!(*lines.lock().unwrap(), vec!["hello".to_string()]);
    }

    #[test]
    fn test_deadline_derivation() {
        assert_eq!(Deadline::from_timeout(None), Deadline::Unbounded);
        assert_eq!(
            Deadline::from_timeout(Some(Duration::ZERO)),
            Deadline::Unbounded
        );
        assert_eq!(
            Deadline::from_timeout(Some(Duration::from_secs(5))),
            Deadline::Bounded(Duration::from_secs(5))
        );
    }

    #[tokio::test]
    async fn test_unbounded_signal_still_cancellable() {
        let parent = CancellationToken::new();
        let signal = Signal::derive(&parent, None);
        assert!(!signal.is_bounded());
        assert!(signal.check().is_ok());

        parent.cancel();
        assert_eq!(signal.check(), Err(SignalError::Cancelled));
        assert_eq!(signal.done().await, SignalError::Cancelled);
    }

    #[tokio::test]
    async fn test_bounded_signal_times_out() {
        let parent = CancellationToken::new();
        let signal = Signal::derive(&parent, Some(Duration::from_millis(20)));
        assert!(signal.is_bounded());

        let result = signal
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert_eq!(result.unwrap_err().to_string(), "context deadline exceeded");
    }

    #[tokio::test]
    async fn test_dropping_signal_cancels_child_only() {
        let parent = CancellationToken::new();
        let child = {
            let signal = Signal::derive(&parent, None);
            signal.token().clone()
        };
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }
}
