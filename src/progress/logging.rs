//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use tracing::{debug, info, warn};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started { pipeline } => {
                info!(pipeline = %pipeline, "Starting pipeline");
            }
            ProgressEvent::PhaseStarted { phase } => {
                debug!(phase = %phase, "Phase started");
            }
            ProgressEvent::PhaseComplete { phase, duration } => {
                debug!(
                    phase = %phase,
                    duration_ms = duration.as_millis(),
                    "Phase complete"
                );
            }
            ProgressEvent::PhaseSkipped { phase, reason } => {
                info!(phase = %phase, reason = %reason, "Phase skipped");
            }
            ProgressEvent::Completed {
                pipeline,
                total_time,
            } => {
                info!(
                    pipeline = %pipeline,
                    total_time_ms = total_time.as_millis(),
                    "Pipeline complete"
                );
            }
            ProgressEvent::Failed { pipeline, error } => {
                warn!(pipeline = %pipeline, error = %error, "Pipeline failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_logging_handler_accepts_every_event() {
        let handler = LoggingHandler;
        handler.on_progress(&ProgressEvent::Started {
            pipeline: "up".to_string(),
        });
        handler.on_progress(&ProgressEvent::PhaseComplete {
            phase: "stack".to_string(),
            duration: Duration::from_millis(10),
        });
        handler.on_progress(&ProgressEvent::Failed {
            pipeline: "up".to_string(),
            error: "boom".to_string(),
        });
    }
}
