// Unix signal handling for graceful shutdown
// Captures SIGTERM and SIGINT so pending vehicle data is merged and saved before exit

use anyhow::Result;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use futures::StreamExt;
use tracing::{info, debug};

/// Future resolving on the first SIGTERM or SIGINT (Ctrl+C)
pub fn create_shutdown_listener() -> Result<impl std::future::Future<Output = ()>> {
    let mut signals = Signals::new([SIGTERM, SIGINT])?;

    Ok(async move {
        while let Some(signal) = signals.next().await {
            let name = match signal {
                SIGTERM => "SIGTERM",
                SIGINT => "SIGINT",
                other => {
                    debug!(signal = other, "Ignoring signal");
                    continue;
                }
            };
            info!(signal = name, "Shutdown requested, saving vehicle data");
            return;
        }
    })
}

/// Fans one shutdown out to the hub and the HTTP server
pub struct ShutdownCoordinator {
    tx: tokio::sync::broadcast::Sender<()>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(16);
        Self { tx }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Future that resolves once shutdown is triggered
    pub fn wait(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.subscribe();
        async move {
            let _ = rx.recv().await;
        }
    }

    pub fn trigger(&self) {
        let notified = self.tx.send(()).unwrap_or(0);
        info!(subsystems = notified, "Shutdown signal broadcast to all subsystems");
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
