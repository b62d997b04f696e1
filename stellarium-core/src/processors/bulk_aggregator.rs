//! BulkAggregator processor.
//!
//! Owns the pending buffer of every destination. Notifications arriving
//! within the debounce window are joined into one message; a buffer that
//! fills up gets one overflow marker and stops accepting fragments until it
//! is flushed.

use crate::config::PipelineConfig;
use crate::events::{Notification, NotificationReceiver, SubscriberId};
use crate::processors::delivery::Delivery;
use crate::utils::shutdown_requested;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Appended once when a buffer reaches its fragment limit.
pub const OVERFLOW_MARKER: &str = "... too many messages";

/// Separator between coalesced fragments.
const FRAGMENT_SEPARATOR: &str = "\n\n";

#[derive(Debug)]
struct PendingBuffer {
    fragments: Vec<String>,
    capped: bool,
    touched: Instant,
}

pub struct BulkAggregator {
    notification_rx: NotificationReceiver,
    shutdown_rx: watch::Receiver<bool>,
    delivery: Delivery,
    buffers: HashMap<SubscriberId, PendingBuffer>,
    /// Due texts a shutdown interrupted before they were delivered.
    unflushed: Vec<(SubscriberId, String)>,
    debounce: Duration,
    flush_tick: Duration,
    max_fragments: usize,
    drain_timeout: Duration,
}

impl BulkAggregator {
    pub fn new(
        notification_rx: NotificationReceiver,
        delivery: Delivery,
        shutdown_rx: watch::Receiver<bool>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            notification_rx,
            shutdown_rx,
            delivery,
            buffers: HashMap::new(),
            unflushed: Vec::new(),
            debounce: config.debounce,
            flush_tick: config.flush_tick,
            max_fragments: config.max_fragments.max(1),
            drain_timeout: config.drain_timeout,
        }
    }

    /// Number of destinations with pending fragments.
    pub fn pending(&self) -> usize {
        self.buffers.len()
    }

    /// Buffer one notification received at `now`.
    pub fn push(&mut self, notification: Notification, now: Instant) {
        let Notification { destination, text } = notification;
        let buffer = self
            .buffers
            .entry(destination)
            .or_insert_with(|| PendingBuffer {
                fragments: Vec::new(),
                capped: false,
                touched: now,
            });

        if buffer.capped {
            debug!(chat = %destination, "Buffer full, dropping fragment");
            return;
        }

        buffer.fragments.push(text);
        buffer.touched = now;
        if buffer.fragments.len() >= self.max_fragments {
            buffer.fragments.push(OVERFLOW_MARKER.to_owned());
            buffer.capped = true;
        }
    }

    /// Remove and return every buffer idle for at least the debounce window.
    pub fn take_due(&mut self, now: Instant) -> Vec<(SubscriberId, String)> {
        let due: Vec<SubscriberId> = self
            .buffers
            .iter()
            .filter(|(_, buffer)| now.saturating_duration_since(buffer.touched) >= self.debounce)
            .map(|(destination, _)| *destination)
            .collect();

        due.into_iter()
            .filter_map(|destination| {
                let buffer = self.buffers.remove(&destination)?;
                Some((destination, buffer.fragments.join(FRAGMENT_SEPARATOR)))
            })
            .collect()
    }

    /// Remove and return every buffer regardless of age.
    pub fn take_all(&mut self) -> Vec<(SubscriberId, String)> {
        self.buffers
            .drain()
            .map(|(destination, buffer)| (destination, buffer.fragments.join(FRAGMENT_SEPARATOR)))
            .collect()
    }

    /// Run the aggregator until shutdown, then drain what is left.
    pub async fn run(mut self) {
        info!("BulkAggregator started");

        let mut tick = tokio::time::interval(self.flush_tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_requested(&mut self.shutdown_rx) => {
                    info!("BulkAggregator received shutdown signal");
                    break;
                }

                notification = self.notification_rx.recv() => {
                    match notification {
                        Some(notification) => self.push(notification, Instant::now()),
                        None => {
                            info!("Notification channel closed");
                            break;
                        }
                    }
                }

                _ = tick.tick() => {
                    let due = self.take_due(Instant::now());
                    if !self.flush(due).await {
                        info!("BulkAggregator received shutdown signal during flush");
                        break;
                    }
                }
            }
        }

        self.drain().await;
        info!("BulkAggregator shutdown complete");
    }

    /// Deliver `due` in order. Returns false if shutdown interrupted it; the
    /// undelivered texts are then kept for the final drain.
    async fn flush(&mut self, due: Vec<(SubscriberId, String)>) -> bool {
        let mut due = due.into_iter();
        while let Some((destination, text)) = due.next() {
            let interrupted = tokio::select! {
                biased;

                _ = shutdown_requested(&mut self.shutdown_rx) => true,
                _ = self.delivery.deliver(destination, &text) => false,
            };
            if interrupted {
                self.unflushed.push((destination, text));
                self.unflushed.extend(due);
                return false;
            }
        }
        true
    }

    async fn drain(&mut self) {
        while let Ok(notification) = self.notification_rx.try_recv() {
            self.push(notification, Instant::now());
        }

        let mut pending = std::mem::take(&mut self.unflushed);
        pending.extend(self.take_all());
        if pending.is_empty() {
            return;
        }

        let total = pending.len();
        let delivery = self.delivery.clone();
        let flush = async move {
            for (destination, text) in pending {
                delivery.deliver(destination, &text).await;
            }
        };
        match tokio::time::timeout(self.drain_timeout, flush).await {
            Ok(()) => info!(buffers = total, "Pending buffers flushed"),
            Err(_) => warn!(buffers = total, "Gave up flushing pending buffers"),
        }
    }
}
