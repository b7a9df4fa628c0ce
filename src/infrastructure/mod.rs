//! Infrastructure layer module
//!
//! Adapters behind the domain ports and the ambient plumbing:
//! - Task catalog loading
//! - Configuration management
//! - Logging infrastructure
//! - Answer providers and completion clients (REST and session)
//! - File-backed outcome stores and evaluation output
//!
//! Infrastructure implementations satisfy the port traits defined in the domain layer.

pub mod catalog;
pub mod config;
pub mod logging;
pub mod providers;
pub mod storage;
