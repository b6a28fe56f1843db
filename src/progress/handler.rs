//! Progress handler trait and events

use std::time::Duration;

/// Events emitted while a pipeline walks its phases
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Pipeline execution started
    Started { pipeline: String },

    /// A phase is about to run
    PhaseStarted { phase: String },

    /// A phase finished successfully
    PhaseComplete { phase: String, duration: Duration },

    /// A phase exists but was skipped by flag or configuration
    PhaseSkipped { phase: String, reason: String },

    /// Pipeline finished successfully
    Completed { pipeline: String, total_time: Duration },

    /// Pipeline stopped on a fatal error
    Failed { pipeline: String, error: String },
}

/// Trait for handling progress events during pipeline execution
pub trait ProgressHandler: Send + Sync {
    /// Called when a progress event occurs
    fn on_progress(&self, event: &ProgressEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {}
}
