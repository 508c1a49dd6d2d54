//! Serve loop and graceful shutdown.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use board_core::Repository;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::http::{router, AppState};

/// Serve until `signal` resolves, then drain.
///
/// Shutdown order: stop accepting connections, give in-flight requests
/// `grace` to finish, cancel every outstanding storage call, close the
/// repository.
///
/// # Errors
/// Returns the I/O error that stopped the server, if any. The repository is
/// closed either way.
pub async fn serve<S>(
    listener: TcpListener,
    repo: Arc<dyn Repository>,
    op_timeout: Duration,
    grace: Duration,
    signal: S,
) -> std::io::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let root = CancellationToken::new();
    let draining = CancellationToken::new();

    let watcher = {
        let root = root.clone();
        let draining = draining.clone();
        tokio::spawn(async move {
            signal.await;
            tracing::info!(grace = ?grace, "shutdown requested, draining");
            draining.cancel();
            tokio::time::sleep(grace).await;
            if !root.is_cancelled() {
                tracing::warn!("grace period elapsed, cancelling in-flight operations");
                root.cancel();
            }
        })
    };

    let app = router(AppState::new(Arc::clone(&repo), op_timeout, root.clone()));
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(draining.cancelled_owned())
        .await;

    root.cancel();
    watcher.abort();

    if let Err(e) = repo.close().await {
        tracing::error!(error = %e, "failed to close repository");
    }
    tracing::info!("server stopped");

    served
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
