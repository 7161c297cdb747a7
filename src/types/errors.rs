//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context.

use axum::http::StatusCode;
use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the quality guard server.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid tool arguments (map to HTTP 400).
    #[error("validation error: {0}")]
    Validation(String),

    /// Malformed request envelope (map to HTTP 400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Tool arguments that violate the tool's input schema (map to HTTP 400).
    #[error("invalid arguments for tool '{tool}': {}", violations.join("; "))]
    InvalidArguments { tool: String, violations: Vec<String> },

    /// Unknown tool, config, operation... (map to HTTP 404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate registration or exclusive-create collision (map to HTTP 409).
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A tool failed while executing (map to HTTP 500).
    #[error("tool '{tool}' failed: {message}")]
    Execution { tool: String, message: String },

    /// Subprocess could not be launched or observed.
    #[error("process error: {0}")]
    Process(String),

    /// Timeout (map to HTTP 504).
    #[error("timeout: {0}")]
    Timeout(String),

    /// Internal errors (map to HTTP 500).
    #[error("internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Outbound HTTP errors (probes, DAST).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Convert to the HTTP status returned at the server boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) | Error::BadRequest(_) | Error::InvalidArguments { .. } => {
                StatusCode::BAD_REQUEST
            }
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::AlreadyExists(_) => StatusCode::CONFLICT,
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::Execution { .. }
            | Error::Process(_)
            | Error::Internal(_)
            | Error::Serialization(_)
            | Error::Http(_)
            | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Convenience constructors
impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn invalid_arguments(tool: impl Into<String>, violations: Vec<String>) -> Self {
        Self::InvalidArguments {
            tool: tool.into(),
            violations,
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::AlreadyExists(msg.into())
    }

    pub fn execution(tool: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Execution {
            tool: tool.into(),
            message: msg.into(),
        }
    }

    pub fn process(msg: impl Into<String>) -> Self {
        Self::Process(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
