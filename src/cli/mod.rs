//! Command-line interface.

pub mod commands;
pub mod output;
pub mod types;

use std::process::ExitCode;

pub use types::{Cli, Commands};

/// Exit code for runtime failures, distinct from a pass rate below threshold.
pub const ERROR_EXIT_CODE: u8 = 2;

/// Report a command failure on stderr and map it to an exit code.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ExitCode {
    if json_mode {
        let chain: Vec<String> = err.chain().skip(1).map(ToString::to_string).collect();
        let body = serde_json::json!({
            "error": err.to_string(),
            "causes": chain,
        });
        eprintln!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err:#}");
    }
    ExitCode::from(ERROR_EXIT_CODE)
}
