//! Domain layer for quantbench
//!
//! Tasks, answers, verdicts and reports, plus the ports that the services
//! depend on. Nothing here performs IO.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
