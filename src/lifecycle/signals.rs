//! OS signal handling.
//!
//! Ctrl-C raises the shared shutdown signal; nothing else is handled.

use crate::lifecycle::Shutdown;

/// Trigger `shutdown` on the first Ctrl-C. Returns once either happened.
pub async fn forward_ctrl_c(shutdown: Shutdown) {
    let mut already = shutdown.subscribe();
    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => {
                tracing::info!("Ctrl-C received");
                shutdown.trigger();
            }
            Err(e) => tracing::error!(error = %e, "Unable to listen for Ctrl-C"),
        },
        _ = already.recv() => {}
    }
}
