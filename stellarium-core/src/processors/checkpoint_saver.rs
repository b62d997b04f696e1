//! Periodic checkpoint persistence.

use crate::checkpoint::CheckpointStore;
use crate::utils::shutdown_requested;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info};

/// Persists stream cursors every `interval` until shutdown.
///
/// The final write at shutdown is left to the caller, after the stream
/// consumers have stopped.
pub struct CheckpointSaver {
    checkpoints: CheckpointStore,
    interval: Duration,
    shutdown_rx: watch::Receiver<bool>,
}

impl CheckpointSaver {
    pub fn new(
        checkpoints: CheckpointStore,
        interval: Duration,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            checkpoints,
            interval,
            shutdown_rx,
        }
    }

    pub async fn run(mut self) {
        info!(interval_secs = self.interval.as_secs(), "CheckpointSaver started");

        let mut tick = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_requested(&mut self.shutdown_rx) => break,

                _ = tick.tick() => {
                    if let Err(e) = self.checkpoints.persist().await {
                        error!(error = %e, "Failed to persist checkpoints");
                    }
                }
            }
        }

        info!("CheckpointSaver shutdown complete");
    }
}
