//! Request handlers and the error-to-response mapping.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::dispatch::{Dispatcher, ExecutionRequest};
use crate::tools::ToolDescriptor;
use crate::types::Error;

pub const LIVENESS_TEXT: &str = "Quality-Guard MCP Server is running.";

/// [`Error`] rendered as `{error, details?}` with the matching status.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        let body = match self.0 {
            Error::InvalidArguments { tool, violations } => json!({
                "error": format!("Invalid arguments for tool '{}'.", tool),
                "details": violations,
            }),
            Error::Execution { tool, message } => json!({
                "error": format!("Error executing tool '{}'.", tool),
                "details": message,
            }),
            Error::BadRequest(msg) | Error::NotFound(msg) | Error::Validation(msg) => {
                json!({ "error": msg })
            }
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

pub async fn liveness() -> &'static str {
    LIVENESS_TEXT
}

pub async fn list_tools(State(dispatcher): State<Arc<Dispatcher>>) -> Json<Vec<ToolDescriptor>> {
    Json(dispatcher.list_tools())
}

pub async fn use_tool(
    State(dispatcher): State<Arc<Dispatcher>>,
    payload: std::result::Result<Json<ExecutionRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::warn!("rejected use_tool body: {}", rejection.body_text());
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "Invalid request body.",
                    "details": rejection.body_text(),
                })),
            )
                .into_response();
        }
    };

    match dispatcher.invoke(request).await {
        Ok(envelope) => Json::<Value>(envelope).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (Error::bad_request("Missing tool_name or arguments."), StatusCode::BAD_REQUEST),
            (Error::not_found("Tool 'x' not found."), StatusCode::NOT_FOUND),
            (Error::invalid_arguments("x", vec!["bad".into()]), StatusCode::BAD_REQUEST),
            (Error::execution("x", "boom"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).into_response().status(), status);
        }
    }
}
