//! Progress bar utilities using indicatif for terminal output
//!
//! Bars draw to stderr and are hidden entirely in JSON mode so that stdout
//! only ever carries the command result.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

const PROGRESS_TEMPLATE: &str =
    "[{elapsed_precise}] {prefix:>24} {bar:30.cyan/blue} {pos}/{len} {msg}";
const PROGRESS_CHARS: &str = "█▓▒░ ";

fn style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(PROGRESS_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars(PROGRESS_CHARS)
}

/// Progress bars for one command run, one bar per model.
pub struct RunProgress {
    multi: MultiProgress,
}

impl RunProgress {
    /// Visible on stderr, or hidden when `json_mode` is set.
    pub fn new(json_mode: bool) -> Self {
        let target = if json_mode {
            ProgressDrawTarget::hidden()
        } else {
            ProgressDrawTarget::stderr()
        };
        Self {
            multi: MultiProgress::with_draw_target(target),
        }
    }

    /// Add a bar labelled with `prefix`.
    pub fn add_bar(&self, prefix: &str, total: u64) -> ProgressBar {
        let bar = self.multi.add(ProgressBar::new(total));
        bar.set_style(style());
        bar.set_prefix(prefix.to_string());
        bar.enable_steady_tick(Duration::from_millis(200));
        bar
    }
}

/// Finish helpers with a status mark.
pub trait ProgressBarExt {
    fn finish_success(&self, message: impl Into<String>);

    fn finish_error(&self, message: impl Into<String>);
}

impl ProgressBarExt for ProgressBar {
    fn finish_success(&self, message: impl Into<String>) {
        self.finish_with_message(format!("✓ {}", message.into()));
    }

    fn finish_error(&self, message: impl Into<String>) {
        self.finish_with_message(format!("✗ {}", message.into()));
    }
}
