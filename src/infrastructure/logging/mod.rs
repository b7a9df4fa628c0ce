//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - JSON or pretty console output on stderr
//! - Daily-rolling JSON log files
//! - Retention-based cleanup of old files
//! - Secret scrubbing for persisted error messages

pub mod logger;
pub mod retention;
pub mod secret_scrubbing;

pub use logger::{LogFormat, Logger};
pub use retention::prune_old_logs;
pub use secret_scrubbing::SecretScrubber;
