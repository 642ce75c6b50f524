//! Shutdown coordination for background tasks.

use tokio::sync::broadcast;

/// Coordinator for graceful shutdown.
///
/// Long-running tasks (health monitor, outlier detector) subscribe and leave
/// their loops when the signal arrives.
#[derive(Debug)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Signal every subscriber. Returns how many were listening.
    pub fn trigger(&self) -> usize {
        self.tx.send(()).unwrap_or(0)
    }

    /// Number of tasks still subscribed.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Wait for ctrl-c, then trigger.
    pub async fn trigger_on_ctrl_c(&self) {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received ctrl-c, shutting down"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for ctrl-c, shutting down"),
        }
        let notified = self.trigger();
        tracing::debug!(tasks = notified, "Shutdown signal sent");
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
