//! HTTP server with graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::router::build_router;
use crate::dispatch::Dispatcher;

/// HTTP server wrapping the dispatcher.
#[derive(Debug)]
pub struct HttpServer {
    dispatcher: Arc<Dispatcher>,
    addr: SocketAddr,
    cancel: CancellationToken,
}

impl HttpServer {
    pub fn new(dispatcher: Arc<Dispatcher>, addr: SocketAddr) -> Self {
        Self {
            dispatcher,
            addr,
            cancel: CancellationToken::new(),
        }
    }

    /// Bind the configured address and serve until cancelled.
    pub async fn serve(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve_on(listener).await
    }

    /// Serve on an already-bound listener.
    pub async fn serve_on(&self, listener: TcpListener) -> std::io::Result<()> {
        tracing::info!(
            "Quality-Guard server listening on {} ({} tools)",
            listener.local_addr()?,
            self.dispatcher.registry().len()
        );
        let app = build_router(self.dispatcher.clone());
        let cancel = self.cancel.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Token that stops the server when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
