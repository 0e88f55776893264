//! Direct mode: serve the router on a TCP listener.
//!
//! Here the native axum request already is the canonical request, so the
//! router is handed to `axum::serve` unchanged.

use crate::error::ServiceError;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(router: Router, addr: SocketAddr) -> Result<(), ServiceError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServiceError::Internal(format!("Failed to bind {addr}: {e}")))?;
    serve_with_shutdown(router, listener, shutdown_signal()).await
}

/// Serve on an already-bound listener until `shutdown` resolves.
pub async fn serve_with_shutdown<F>(
    router: Router,
    listener: TcpListener,
    shutdown: F,
) -> Result<(), ServiceError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!("Listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
