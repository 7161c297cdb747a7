//! Quality Guard HTTP server - main entry point.
//!
//! Loads configuration, registers the tool set and serves:
//! - `GET /`: liveness
//! - `GET /tools`: tool descriptors
//! - `POST /use_tool`: tool invocation

use clap::Parser;
use quality_guard::dispatch::Dispatcher;
use quality_guard::http::HttpServer;
use quality_guard::tools::{OperationRegistry, QualityTool, ToolRegistry};
use quality_guard::Config;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "quality-guard", version, about = "Quality-assurance tool orchestration server")]
struct Cli {
    /// JSON configuration file.
    #[arg(long, env = "QUALITY_GUARD_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind, overrides `server.listenAddr`.
    #[arg(long, env = "QUALITY_GUARD_LISTEN_ADDR")]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen;
    }

    // Initialize observability
    quality_guard::observability::init_tracing(&config.observability);

    let operations = Arc::new(OperationRegistry::with_builtins());
    let registry = ToolRegistry::from_tools(QualityTool::default_set(&config, operations))?;
    for descriptor in registry.list() {
        tracing::info!("  ✓ {}", descriptor.name);
    }
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(registry)));

    let addr: SocketAddr = config.server.listen_addr.parse()?;
    let server = HttpServer::new(dispatcher, addr);

    let cancel = server.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, shutting down");
            cancel.cancel();
        }
    });

    server.serve().await?;
    Ok(())
}
