//! StreamConsumer processor.
//!
//! One consumer per ledger stream. It resolves the resume cursor, opens the
//! stream through a [`LedgerSource`], hands every event to the translator in
//! arrival order, and reconnects after failures:
//!
//! ```text
//! Connecting -> Streaming -> BackingOff -> Connecting -> ... -> Stopped
//! ```
//!
//! Connections that die quickly are counted; past the limit every further
//! quick failure waits out a cooldown before reconnecting.

use crate::checkpoint::CheckpointStore;
use crate::config::PipelineConfig;
use crate::events::{Cursor, LedgerEvent, StreamKind};
use crate::processors::translator::EventTranslator;
use crate::utils::{FailureCounter, shutdown_requested};
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors reported by a ledger source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Connecting to or reading from the source failed.
    #[error("ledger source error: {0}")]
    Client(#[source] BoxError),

    /// The source ended the stream.
    #[error("stream closed by source")]
    Closed,
}

impl SourceError {
    pub fn client(error: impl Into<BoxError>) -> Self {
        Self::Client(error.into())
    }
}

pub type LedgerEventStream = BoxStream<'static, Result<LedgerEvent, SourceError>>;

/// A ledger event feed that can be resumed from a cursor.
#[async_trait]
pub trait LedgerSource: Send + Sync {
    /// Open `stream` starting after `cursor`.
    async fn open(
        &self,
        stream: StreamKind,
        cursor: &Cursor,
    ) -> Result<LedgerEventStream, SourceError>;
}

enum ConsumerState {
    Connecting,
    Streaming {
        events: LedgerEventStream,
        opened: Instant,
    },
    BackingOff {
        lived: Duration,
    },
    Stopped,
}

pub struct StreamConsumer {
    kind: StreamKind,
    source: Arc<dyn LedgerSource>,
    translator: EventTranslator,
    checkpoints: CheckpointStore,
    shutdown_rx: watch::Receiver<bool>,
    failures: FailureCounter,
}

impl StreamConsumer {
    pub fn new(
        kind: StreamKind,
        source: Arc<dyn LedgerSource>,
        translator: EventTranslator,
        checkpoints: CheckpointStore,
        shutdown_rx: watch::Receiver<bool>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            kind,
            source,
            translator,
            checkpoints,
            shutdown_rx,
            failures: FailureCounter::new(
                config.stable_connection,
                config.max_quick_failures,
                config.reconnect_cooldown,
            ),
        }
    }

    pub async fn run(mut self) {
        info!(stream = %self.kind, "StreamConsumer started");

        let mut state = ConsumerState::Connecting;
        loop {
            state = match state {
                ConsumerState::Connecting => self.connect().await,
                ConsumerState::Streaming { events, opened } => self.stream(events, opened).await,
                ConsumerState::BackingOff { lived } => self.back_off(lived).await,
                ConsumerState::Stopped => break,
            };
        }

        info!(stream = %self.kind, "StreamConsumer shutdown complete");
    }

    async fn connect(&mut self) -> ConsumerState {
        let started = Instant::now();
        let cursor = self.checkpoints.get(self.kind).await;
        debug!(stream = %self.kind, cursor = %cursor, "Connecting");

        tokio::select! {
            biased;

            _ = shutdown_requested(&mut self.shutdown_rx) => ConsumerState::Stopped,

            opened = self.source.open(self.kind, &cursor) => match opened {
                Ok(events) => {
                    info!(stream = %self.kind, cursor = %cursor, "Streaming");
                    ConsumerState::Streaming { events, opened: started }
                }
                Err(e) => {
                    warn!(
                        stream = %self.kind,
                        error = %e,
                        attempt = self.failures.count(),
                        "Failed to open ledger stream"
                    );
                    ConsumerState::BackingOff { lived: started.elapsed() }
                }
            },
        }
    }

    async fn stream(&mut self, mut events: LedgerEventStream, opened: Instant) -> ConsumerState {
        loop {
            tokio::select! {
                biased;

                _ = shutdown_requested(&mut self.shutdown_rx) => return ConsumerState::Stopped,

                next = events.next() => match next {
                    Some(Ok(event)) => {
                        let handled = self
                            .translator
                            .handle(self.kind, event, &mut self.shutdown_rx)
                            .await;
                        if handled.is_none() {
                            return ConsumerState::Stopped;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(
                            stream = %self.kind,
                            error = %e,
                            attempt = self.failures.count(),
                            "Ledger stream failure"
                        );
                        return ConsumerState::BackingOff { lived: opened.elapsed() };
                    }
                    None => {
                        warn!(
                            stream = %self.kind,
                            error = %SourceError::Closed,
                            attempt = self.failures.count(),
                            "Ledger stream failure"
                        );
                        return ConsumerState::BackingOff { lived: opened.elapsed() };
                    }
                },
            }
        }
    }

    async fn back_off(&mut self, lived: Duration) -> ConsumerState {
        let Some(cooldown) = self.failures.record(lived) else {
            return ConsumerState::Connecting;
        };

        warn!(
            stream = %self.kind,
            attempt = self.failures.count(),
            cooldown_secs = cooldown.as_secs(),
            "Too many quick failures, cooling down"
        );
        tokio::select! {
            biased;

            _ = shutdown_requested(&mut self.shutdown_rx) => ConsumerState::Stopped,
            _ = tokio::time::sleep(cooldown) => ConsumerState::Connecting,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{
        Asset, LedgerEventKind, NotificationReceiver, SubscriberId, Transfer, notification_channel,
    };
    use crate::framework::DatabaseProcessor;
    use crate::registry::SubscriberRegistry;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    type Session = Result<Vec<Result<LedgerEvent, SourceError>>, SourceError>;

    /// Plays back scripted sessions; once the script is exhausted, every
    /// open yields a stream that never produces anything.
    #[derive(Default)]
    struct ScriptedSource {
        sessions: Mutex<VecDeque<Session>>,
        opened: Mutex<Vec<Cursor>>,
    }

    impl ScriptedSource {
        fn new(sessions: Vec<Session>) -> Self {
            Self {
                sessions: Mutex::new(sessions.into()),
                opened: Mutex::default(),
            }
        }

        fn opened(&self) -> Vec<Cursor> {
            self.opened.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LedgerSource for ScriptedSource {
        async fn open(
            &self,
            _stream: StreamKind,
            cursor: &Cursor,
        ) -> Result<LedgerEventStream, SourceError> {
            self.opened.lock().unwrap().push(cursor.clone());
            let next = self.sessions.lock().unwrap().pop_front();
            match next {
                Some(Ok(events)) => Ok(futures_util::stream::iter(events).boxed()),
                Some(Err(e)) => Err(e),
                None => Ok(futures_util::stream::pending::<Result<LedgerEvent, SourceError>>().boxed()),
            }
        }
    }

    fn payment(cursor: &str) -> Result<LedgerEvent, SourceError> {
        Ok(LedgerEvent {
            cursor: cursor.into(),
            kind: LedgerEventKind::Transfer(Transfer {
                from: "GFROM".into(),
                to: "GTO".into(),
                amount: "1".into(),
                asset: Asset::Native,
                memo: None,
            }),
        })
    }

    fn io_error() -> SourceError {
        SourceError::client(std::io::Error::other("connection reset"))
    }

    struct Harness {
        checkpoints: CheckpointStore,
        notifications: NotificationReceiver,
        shutdown_tx: watch::Sender<bool>,
        consumer: StreamConsumer,
    }

    async fn harness(source: Arc<dyn LedgerSource>) -> Harness {
        harness_with_capacity(source, 64).await
    }

    async fn harness_with_capacity(source: Arc<dyn LedgerSource>, capacity: usize) -> Harness {
        let db = DatabaseProcessor::in_memory().await.unwrap();
        let registry = SubscriberRegistry::load(db.clone()).await.unwrap();
        registry.subscribe(SubscriberId(1), "GTO").await.unwrap();
        let config = PipelineConfig::default();
        let checkpoints = CheckpointStore::load(db, config.checkpoint_freshness)
            .await
            .unwrap();
        let (tx, notifications) = notification_channel(capacity);
        let translator = EventTranslator::new(registry, checkpoints.clone(), tx, &config);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let consumer = StreamConsumer::new(
            StreamKind::Operations,
            source,
            translator,
            checkpoints.clone(),
            shutdown_rx,
            &config,
        );
        Harness {
            checkpoints,
            notifications,
            shutdown_tx,
            consumer,
        }
    }

    #[tokio::test]
    async fn resumes_from_last_handled_cursor_after_failure() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(vec![payment("1"), payment("2"), Err(io_error())]),
            Ok(vec![payment("3")]),
        ]));
        let mut h = harness(source.clone()).await;
        tokio::time::pause();
        let handle = tokio::spawn(h.consumer.run());

        let mut texts = Vec::new();
        for _ in 0..3 {
            texts.push(h.notifications.recv().await.unwrap().text);
        }
        assert_eq!(texts, vec!["Received 1 XLM from GFROM"; 3]);

        // Give the consumer time to reconnect after the second session ended.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            h.checkpoints.get(StreamKind::Operations).await,
            Cursor::Token("3".into())
        );
        assert_eq!(
            source.opened(),
            vec![
                Cursor::Now,
                Cursor::Token("2".into()),
                Cursor::Token("3".into())
            ]
        );

        h.shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn cools_down_after_too_many_quick_failures() {
        let sessions = (0..20).map(|_| Err(io_error())).collect();
        let source = Arc::new(ScriptedSource::new(sessions));
        let h = harness(source.clone()).await;
        tokio::time::pause();
        let handle = tokio::spawn(h.consumer.run());

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(source.opened().len(), 11);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(source.opened().len(), 12);

        h.shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn stops_promptly_while_stream_is_idle() {
        let source = Arc::new(ScriptedSource::default());
        let h = harness(source.clone()).await;
        let handle = tokio::spawn(h.consumer.run());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(source.opened(), vec![Cursor::Now]);

        h.shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    /// An unbounded burst of payments with increasing cursors.
    struct EndlessSource;

    #[async_trait]
    impl LedgerSource for EndlessSource {
        async fn open(
            &self,
            _stream: StreamKind,
            _cursor: &Cursor,
        ) -> Result<LedgerEventStream, SourceError> {
            Ok(futures_util::stream::iter(1u64..)
                .map(|n| payment(&n.to_string()))
                .boxed())
        }
    }

    #[tokio::test]
    async fn stops_while_blocked_on_a_full_queue() {
        let h = harness_with_capacity(Arc::new(EndlessSource), 4).await;
        let handle = tokio::spawn(h.consumer.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        h.shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(3), handle)
            .await
            .unwrap()
            .unwrap();

        // Four events made it into the queue; the fifth never did.
        assert_eq!(
            h.checkpoints.get(StreamKind::Operations).await,
            Cursor::Token("4".into())
        );
        drop(h.notifications);
    }
}
