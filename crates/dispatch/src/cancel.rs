//! Cooperative cancellation.
//!
//! Any source (signal handler, UI, timer) may request cancellation by
//! triggering the flag. Dispatch loops only look at it between polls, so an
//! actuator call in flight is never interrupted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    triggered: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Clear a request once it has been honored.
    pub fn reset(&self) {
        self.triggered.store(false, Ordering::SeqCst);
    }
}

/// Trigger `flag` on every ctrl-c until the returned task is aborted.
pub fn watch_ctrl_c(flag: CancellationFlag) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Unable to listen for ctrl-c: {}", e);
                return;
            }
            info!("Cancellation requested");
            flag.trigger();
        }
    })
}
