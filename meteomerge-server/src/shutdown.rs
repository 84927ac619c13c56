//! Graceful shutdown on Ctrl-C or cancellation.

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Resolve once Ctrl-C arrives or `cancel` is triggered elsewhere, then cancel
/// `cancel` so running fetch loops stop before their next request.
pub async fn shutdown_signal(cancel: CancellationToken) {
    tokio::select! {
        result = signal::ctrl_c() => {
            if let Err(err) = result {
                warn!(error = %err, "Listening for Ctrl-C failed; shutting down");
            }
            info!("Ctrl-C received, shutting down");
        }
        () = cancel.cancelled() => {}
    }
    cancel.cancel();
}
