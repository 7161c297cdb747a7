//! Core types for the quality guard server.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Strongly-typed identifiers (TestRunId, ExecutionId)
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Configuration structures for the server and every tool

mod config;
mod errors;
mod ids;

pub use config::{
    Config, ObservabilityConfig, SecurityConfig, ServerConfig, StabilityConfig, StorageConfig,
    TestRunnerConfig,
};
pub use errors::{Error, Result};
pub use ids::{ExecutionId, TestRunId};
