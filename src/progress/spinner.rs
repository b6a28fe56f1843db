//! Terminal spinner for long-running steps

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner on stderr. Hidden when stderr is not a terminal.
pub struct Spinner {
    bar: ProgressBar,
    message: String,
}

impl Spinner {
    pub fn start(message: impl Into<String>) -> Self {
        let message = message.into();
        let bar = if atty::is(atty::Stream::Stderr) {
            ProgressBar::new_spinner()
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
            bar.set_style(style);
        }
        bar.set_message(message.clone());
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar, message }
    }

    pub fn success(self) {
        self.bar
            .finish_with_message(format!("{} - \u{2714}", self.message));
    }

    pub fn failure(self) {
        self.bar
            .finish_with_message(format!("{} - \u{2717}", self.message));
    }
}
