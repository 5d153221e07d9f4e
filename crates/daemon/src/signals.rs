//! Shutdown signal handling.
//!
//! Resolves on SIGINT (Ctrl+C) or, on Unix, SIGTERM. The web server stops
//! accepting connections once this resolves and drains in-flight requests,
//! so a workflow holding a repository lock always runs to completion.

use tracing::{error, info};

/// Wait for a shutdown signal.
pub async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, draining requests"),
        _ = terminate => info!("received SIGTERM, draining requests"),
    }
}
