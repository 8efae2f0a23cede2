//! Shutdown signalling between the coordinator and whoever may abort it.
//!
//! The signal is a watch channel carrying no data. Sending on it asks the coordinator to abort the
//! run, which terminates every pool the same way a hard failure does.

use std::sync::Arc;

use tokio::sync::watch;

/// Receiver side of the shutdown signal.
pub type ShutdownRx = watch::Receiver<()>;

/// Transmitter side of the shutdown signal, cheap to clone.
#[derive(Debug, Clone)]
pub struct ShutdownTx(Arc<watch::Sender<()>>);

impl ShutdownTx {
    /// Notifies every subscriber that the run must stop.
    pub fn shutdown(&self) -> Result<(), watch::error::SendError<()>> {
        self.0.send(())
    }

    /// Returns a new receiver that only observes signals sent after this call.
    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }
}

/// Creates a new shutdown channel.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(());
    (ShutdownTx(Arc::new(tx)), rx)
}
