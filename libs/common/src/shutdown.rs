//! Shutdown signal handling
//!
//! The polling loops run on blocking threads and watch an `AtomicBool`;
//! [`spawn_shutdown_watcher`] raises it from the async side.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Resolve on Ctrl+C, or SIGTERM on Unix
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let term_signal = match signal(SignalKind::terminate()) {
            Ok(sig) => Some(sig),
            Err(e) => {
                warn!("SIGTERM handler unavailable, Ctrl+C only: {}", e);
                None
            },
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                match term_signal {
                    Some(mut sig) => { sig.recv().await; },
                    None => std::future::pending::<()>().await,
                }
            } => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Raise `stop` once a shutdown signal arrives
pub fn spawn_shutdown_watcher(stop: Arc<AtomicBool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_shutdown().await;
        info!("Shutdown signal received");
        stop.store(true, Ordering::Release);
    })
}
