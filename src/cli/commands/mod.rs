//! CLI command implementations.

pub mod evaluate;
pub mod harvest;
pub mod list;
