//! Route table and request logging.

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Instant;

use super::handlers;
use crate::dispatch::Dispatcher;

/// `GET /`, `GET /tools`, `POST /use_tool`.
pub fn build_router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/", get(handlers::liveness))
        .route("/tools", get(handlers::list_tools))
        .route("/use_tool", post(handlers::use_tool))
        .with_state(dispatcher)
        .layer(middleware::from_fn(log_requests))
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;
    tracing::info!(
        "{} {} -> {} ({}ms)",
        method,
        path,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}
