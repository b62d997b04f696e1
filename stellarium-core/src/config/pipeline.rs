use rust_decimal::Decimal;
use std::time::Duration;

/// Tunables of the ingestion and delivery pipeline.
///
/// `Default` yields the values the bot has always run with; the server
/// overrides individual fields from the `[pipeline]` config section.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Native-asset transfers strictly below this amount are dropped as spam.
    pub spam_threshold: Decimal,
    /// Quiet time after the last fragment before a buffer is flushed.
    pub debounce: Duration,
    /// How often the aggregator checks for due buffers.
    pub flush_tick: Duration,
    /// Fragments kept per buffer before the overflow marker is appended.
    pub max_fragments: usize,
    /// Outbound messages longer than this many characters are truncated.
    pub max_message_chars: usize,
    /// Saved cursors older than this are discarded at startup.
    pub checkpoint_freshness: Duration,
    /// Period of the background cursor persistence.
    pub checkpoint_interval: Duration,
    /// Minimum time between liveness probes of one subscriber.
    pub sanity_interval: Duration,
    /// Depth of the notification queue.
    pub queue_capacity: usize,
    /// A stream connection that lived at least this long resets the failure count.
    pub stable_connection: Duration,
    /// Quick consecutive failures tolerated before cooling down.
    pub max_quick_failures: u32,
    /// Pause after too many quick failures.
    pub reconnect_cooldown: Duration,
    /// Upper bound on flushing pending buffers during shutdown.
    pub drain_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            // 0.001
            spam_threshold: Decimal::new(1, 3),
            debounce: Duration::from_millis(2000),
            flush_tick: Duration::from_millis(200),
            max_fragments: 20,
            max_message_chars: 4000,
            checkpoint_freshness: Duration::from_secs(300),
            checkpoint_interval: Duration::from_secs(30),
            sanity_interval: Duration::from_secs(24 * 60 * 60),
            queue_capacity: crate::events::DEFAULT_NOTIFICATION_BUFFER,
            stable_connection: Duration::from_secs(30),
            max_quick_failures: 10,
            reconnect_cooldown: Duration::from_secs(30),
            drain_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.spam_threshold, Decimal::from_str("0.001").unwrap());
        assert_eq!(config.max_fragments, 20);
        assert_eq!(config.queue_capacity, 5000);
    }
}
