//! Delivery policy around the outbound channel.
//!
//! `Delivery` is what the aggregator and the command layer talk to. It
//! throttles liveness probes, truncates oversized texts, and removes
//! subscribers whose destination rejected a message for good.

use crate::config::PipelineConfig;
use crate::events::SubscriberId;
use crate::registry::{RegistryError, SubscriberRegistry};
use async_trait::async_trait;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Appended to texts cut at the length limit.
pub const TRUNCATION_MARKER: &str = "\n... truncated";

/// Failure classes reported by an [`OutboundSender`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Worth trying again later; the message itself is dropped.
    #[error("recoverable delivery failure: {0}")]
    Recoverable(String),

    /// The destination is gone or refuses the bot.
    #[error("permanent delivery failure: {0}")]
    Permanent(String),
}

/// The outbound chat channel.
#[async_trait]
pub trait OutboundSender: Send + Sync {
    /// Deliver one text to one destination.
    async fn send(&self, destination: SubscriberId, text: &str) -> Result<(), DeliveryError>;

    /// Check that the destination is still worth sending to.
    ///
    /// Only `Permanent` is acted upon.
    async fn probe(&self, _destination: SubscriberId) -> Result<(), DeliveryError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Message lost, subscriber kept.
    Dropped,
    /// Permanent failure, subscriber removed.
    Removed,
}

#[derive(Clone)]
pub struct Delivery {
    sender: Arc<dyn OutboundSender>,
    registry: SubscriberRegistry,
    max_chars: usize,
    sanity_interval: Duration,
}

impl Delivery {
    pub fn new(
        sender: Arc<dyn OutboundSender>,
        registry: SubscriberRegistry,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            sender,
            registry,
            max_chars: config.max_message_chars,
            sanity_interval: config.sanity_interval,
        }
    }

    pub async fn deliver(&self, destination: SubscriberId, text: &str) -> DeliveryOutcome {
        if self
            .registry
            .touch_sanity(destination, self.sanity_interval)
            .await
        {
            match self.sender.probe(destination).await {
                Err(DeliveryError::Permanent(reason)) => {
                    warn!(chat = %destination, reason = %reason, "Liveness probe failed, removing chat");
                    return self.remove(destination).await;
                }
                Err(DeliveryError::Recoverable(reason)) => {
                    debug!(chat = %destination, reason = %reason, "Liveness probe inconclusive");
                }
                Ok(()) => {}
            }
        }

        let text = truncate_message(text, self.max_chars);
        match self.sender.send(destination, &text).await {
            Ok(()) => {
                info!(chat = %destination, text = ?text, "Sent to chat");
                DeliveryOutcome::Delivered
            }
            Err(DeliveryError::Permanent(reason)) => {
                warn!(chat = %destination, reason = %reason, "Destination rejected message, removing chat");
                self.remove(destination).await
            }
            Err(DeliveryError::Recoverable(reason)) => {
                warn!(chat = %destination, reason = %reason, "Failed to send message");
                DeliveryOutcome::Dropped
            }
        }
    }

    /// `Removed` once the subscriber is gone, `Dropped` if it is still
    /// registered because storage refused the delete.
    async fn remove(&self, destination: SubscriberId) -> DeliveryOutcome {
        match self.registry.unsubscribe(destination).await {
            Ok(()) => {
                info!(chat = %destination, "Chat removed automatically");
                DeliveryOutcome::Removed
            }
            Err(RegistryError::NotFound(_)) => {
                debug!(chat = %destination, "Chat was not subscribed");
                DeliveryOutcome::Removed
            }
            Err(e) => {
                error!(chat = %destination, error = %e, "Failed to remove chat");
                DeliveryOutcome::Dropped
            }
        }
    }
}

/// Cut `text` to `max_chars` characters plus [`TRUNCATION_MARKER`].
pub fn truncate_message(text: &str, max_chars: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max_chars) {
        None => Cow::Borrowed(text),
        Some((cut, _)) => {
            let mut truncated = String::with_capacity(cut + TRUNCATION_MARKER.len());
            truncated.push_str(&text[..cut]);
            truncated.push_str(TRUNCATION_MARKER);
            Cow::Owned(truncated)
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Records sent texts and fails on demand.
    #[derive(Default)]
    pub struct RecordingSender {
        pub sent: Mutex<Vec<(SubscriberId, String)>>,
        pub send_failures: Mutex<HashMap<SubscriberId, DeliveryError>>,
        pub probe_failures: Mutex<HashMap<SubscriberId, DeliveryError>>,
        pub probes: Mutex<Vec<SubscriberId>>,
    }

    impl RecordingSender {
        pub fn sent(&self) -> Vec<(SubscriberId, String)> {
            self.sent.lock().unwrap().clone()
        }

        pub fn fail_send(&self, destination: SubscriberId, error: DeliveryError) {
            self.send_failures.lock().unwrap().insert(destination, error);
        }

        pub fn fail_probe(&self, destination: SubscriberId, error: DeliveryError) {
            self.probe_failures
                .lock()
                .unwrap()
                .insert(destination, error);
        }
    }

    #[async_trait]
    impl OutboundSender for RecordingSender {
        async fn send(&self, destination: SubscriberId, text: &str) -> Result<(), DeliveryError> {
            if let Some(error) = self.send_failures.lock().unwrap().get(&destination) {
                return Err(error.clone());
            }
            self.sent
                .lock()
                .unwrap()
                .push((destination, text.to_owned()));
            Ok(())
        }

        async fn probe(&self, destination: SubscriberId) -> Result<(), DeliveryError> {
            self.probes.lock().unwrap().push(destination);
            match self.probe_failures.lock().unwrap().get(&destination) {
                Some(error) => Err(error.clone()),
                None => Ok(()),
            }
        }
    }
}
