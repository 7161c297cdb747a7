//! # Quality Guard - QA tool orchestration server
//!
//! Exposes a closed set of quality-assurance tools behind one
//! "invoke a named tool with arguments" contract:
//! - Test suite execution with runner output parsing
//! - Performance profiling of registered operations
//! - Time-bounded stability monitoring
//! - Dependency, static and dynamic security scans
//! - Test configuration storage, data collection and report generation
//!
//! ## Architecture
//!
//! ```text
//!   HTTP (axum)  →  Dispatcher  →  ToolRegistry  →  QualityTool::execute
//!                    │ schema validation (jsonschema)
//!                    │ panic isolation
//!                    └ ExecutionId + timing logs
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod dispatch;
pub mod http;
pub mod tools;
pub mod types;

// Internal utilities
pub mod observability;
pub mod process;
pub mod resources;
pub mod validation;

pub use types::{Config, Error, Result};
