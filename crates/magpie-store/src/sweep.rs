//! Periodic retention sweeper.
//!
//! Runs `sweep_expired` on a fixed interval until shutdown is signalled.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use magpie_core::config::RetentionConfig;

use crate::store::TranscriptStore;

pub struct RetentionSweeper {
    store: Arc<TranscriptStore>,
    retention: Duration,
    interval: Duration,
}

impl RetentionSweeper {
    pub fn new(store: Arc<TranscriptStore>, retention: Duration, interval: Duration) -> Self {
        Self {
            store,
            retention,
            interval,
        }
    }

    pub fn from_config(store: Arc<TranscriptStore>, cfg: &RetentionConfig) -> Self {
        Self::new(
            store,
            Duration::from_secs(u64::from(cfg.days) * 24 * 3600),
            Duration::from_secs(cfg.sweep_interval_secs),
        )
    }

    /// Sweep loop. Ticks every `interval` until `shutdown` broadcasts `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            retention_secs = self.retention.as_secs(),
            interval_secs = self.interval.as_secs(),
            "retention sweeper started"
        );

        let mut interval = tokio::time::interval(self.interval);
        // The first tick fires immediately; that initial sweep also cleans up
        // anything that aged out while the process was down.
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.store.sweep_expired(self.retention) {
                        Ok(n) if n > 0 => info!(removed = n, "retention sweep complete"),
                        Ok(_) => {}
                        Err(e) => error!("retention sweep failed: {e}"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("retention sweeper shutting down");
                        break;
                    }
                }
            }
        }
    }
}
