//! HTTP daemon for the confidential computing lab.
//!
//! Thin boundary over `cclab-core`: parses requests, validates workload
//! payloads, maps core errors to transport codes. Holds no state of its own
//! beyond the shared [`DaemonState`].

mod api;
mod error;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::state::DaemonState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let state = Arc::new(DaemonState::new());
    let app = api::router(state);

    let addr: SocketAddr = std::env::var("CCLAB_LISTEN")
        .unwrap_or_else(|_| "127.0.0.1:8000".to_string())
        .parse()?;
    info!("confidential computing lab daemon listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
