//! HTTP boundary: axum server, routes and JSON error mapping.

pub mod handlers;
pub mod router;
pub mod server;

pub use router::build_router;
pub use server::HttpServer;
