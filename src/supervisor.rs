//! Supervisor for long-lived background tasks
//!
//! Owns the purchase worker pool and the lifecycle ticker. Shutdown is a
//! watch channel: flipping it drains every loop, then the handles are
//! awaited so in-flight jobs reach a queue-visible state before exit.

use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::sale::lifecycle::LifecycleTicker;
use crate::worker::PurchaseWorkerPool;

pub struct Supervisor {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Supervisor {
    /// Spawn the worker pool and ticker under one shutdown signal.
    pub fn start(worker_pool: Arc<PurchaseWorkerPool>, ticker: LifecycleTicker) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut handles = worker_pool.spawn(shutdown_rx.clone());
        handles.push(tokio::spawn(async move {
            ticker.run(shutdown_rx).await;
        }));

        Self {
            shutdown_tx,
            handles,
        }
    }

    /// A receiver other components (e.g. the HTTP server) can watch.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Signal shutdown without waiting.
    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Signal shutdown and wait for every task to drain.
    pub async fn shutdown(self) {
        info!("Supervisor shutting down");
        let _ = self.shutdown_tx.send(true);
        join_all(self.handles).await;
        info!("Background tasks drained");
    }
}
