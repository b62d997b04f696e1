//! Stream checkpoints.
//!
//! The in-memory cursor of each stream is updated after every handled event;
//! each stream has its own lock so the two consumers never wait on each
//! other. A periodic task (and shutdown) persists all of them at once. Saved
//! cursors are only trusted at startup if they are fresh enough, otherwise
//! the stream resumes from the live tip.

use crate::entities::checkpoints::{CheckpointRecord, ListCheckpoints, SaveCheckpoints};
use crate::events::{Cursor, StreamKind};
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

struct Slots {
    operations: RwLock<Cursor>,
    trades: RwLock<Cursor>,
}

#[derive(Clone)]
pub struct CheckpointStore {
    db: DatabaseProcessor,
    slots: Arc<Slots>,
}

impl CheckpointStore {
    /// Load saved cursors, discarding those older than `freshness`.
    pub async fn load(db: DatabaseProcessor, freshness: Duration) -> Result<Self, sqlx::Error> {
        Self::load_at(db, freshness, OffsetDateTime::now_utc()).await
    }

    pub async fn load_at(
        db: DatabaseProcessor,
        freshness: Duration,
        now: OffsetDateTime,
    ) -> Result<Self, sqlx::Error> {
        let records = db.process(ListCheckpoints).await?;
        let now = now.unix_timestamp();
        let max_age = i64::try_from(freshness.as_secs()).unwrap_or(i64::MAX);

        let mut operations = Cursor::Now;
        let mut trades = Cursor::Now;
        for CheckpointRecord {
            stream,
            cursor,
            saved_at,
        } in records
        {
            let Some(kind) = StreamKind::from_name(&stream) else {
                debug!(stream = %stream, "Ignoring checkpoint of unknown stream");
                continue;
            };
            let age = now.saturating_sub(saved_at);
            if age > max_age {
                warn!(stream = %kind, age_secs = age, "Checkpoint too old, starting from now");
                continue;
            }
            info!(stream = %kind, cursor = %cursor, "Resuming from checkpoint");
            let slot = match kind {
                StreamKind::Operations => &mut operations,
                StreamKind::Trades => &mut trades,
            };
            *slot = Cursor::Token(cursor);
        }

        Ok(Self {
            db,
            slots: Arc::new(Slots {
                operations: RwLock::new(operations),
                trades: RwLock::new(trades),
            }),
        })
    }

    fn slot(&self, kind: StreamKind) -> &RwLock<Cursor> {
        match kind {
            StreamKind::Operations => &self.slots.operations,
            StreamKind::Trades => &self.slots.trades,
        }
    }

    /// Cursor to resume `kind` from.
    pub async fn get(&self, kind: StreamKind) -> Cursor {
        self.slot(kind).read().await.clone()
    }

    pub async fn set(&self, kind: StreamKind, cursor: impl Into<String>) {
        *self.slot(kind).write().await = Cursor::Token(cursor.into());
    }

    /// Write every known cursor in one transaction, stamped with the
    /// current time. Returns the number of streams written.
    pub async fn persist(&self) -> Result<usize, sqlx::Error> {
        let mut cursors = Vec::with_capacity(StreamKind::ALL.len());
        for kind in StreamKind::ALL {
            if let Cursor::Token(token) = self.get(kind).await {
                cursors.push((kind.as_str().to_owned(), token));
            }
        }
        let written = cursors.len();

        self.db
            .process(SaveCheckpoints {
                cursors,
                saved_at: OffsetDateTime::now_utc().unix_timestamp(),
            })
            .await?;

        debug!(streams = written, "Checkpoints persisted");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRESHNESS: Duration = Duration::from_secs(300);

    async fn seeded(saved_at: i64) -> DatabaseProcessor {
        let db = DatabaseProcessor::in_memory().await.unwrap();
        db.process(SaveCheckpoints {
            cursors: vec![("operations".into(), "12345".into())],
            saved_at,
        })
        .await
        .unwrap();
        db
    }

    fn at(unix: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(unix).unwrap()
    }

    #[tokio::test]
    async fn fresh_checkpoint_is_resumed_exactly() {
        let db = seeded(1_000).await;
        let store = CheckpointStore::load_at(db, FRESHNESS, at(1_300))
            .await
            .unwrap();
        assert_eq!(
            store.get(StreamKind::Operations).await,
            Cursor::Token("12345".into())
        );
        assert_eq!(store.get(StreamKind::Trades).await, Cursor::Now);
    }

    #[tokio::test]
    async fn stale_checkpoint_is_discarded() {
        let db = seeded(1_000).await;
        let store = CheckpointStore::load_at(db, FRESHNESS, at(1_301))
            .await
            .unwrap();
        assert_eq!(store.get(StreamKind::Operations).await, Cursor::Now);
    }

    #[tokio::test]
    async fn persist_writes_only_known_cursors() {
        let db = DatabaseProcessor::in_memory().await.unwrap();
        let store = CheckpointStore::load(db.clone(), FRESHNESS).await.unwrap();
        assert_eq!(store.persist().await.unwrap(), 0);

        store.set(StreamKind::Trades, "99-1").await;
        store.set(StreamKind::Trades, "100-1").await;
        assert_eq!(store.persist().await.unwrap(), 1);

        let reloaded = CheckpointStore::load(db, FRESHNESS).await.unwrap();
        assert_eq!(
            reloaded.get(StreamKind::Trades).await,
            Cursor::Token("100-1".into())
        );
        assert_eq!(reloaded.get(StreamKind::Operations).await, Cursor::Now);
    }

    #[tokio::test]
    async fn persist_failure_is_reported() {
        let db = DatabaseProcessor::in_memory().await.unwrap();
        let store = CheckpointStore::load(db.clone(), FRESHNESS).await.unwrap();
        store.set(StreamKind::Operations, "1").await;
        db.close().await;
        assert!(store.persist().await.is_err());
        assert_eq!(
            store.get(StreamKind::Operations).await,
            Cursor::Token("1".into())
        );
    }

    #[tokio::test]
    async fn streams_do_not_contend() {
        let db = DatabaseProcessor::in_memory().await.unwrap();
        let store = CheckpointStore::load(db, FRESHNESS).await.unwrap();

        let held = store.slot(StreamKind::Operations).write().await;
        tokio::time::timeout(Duration::from_secs(1), store.set(StreamKind::Trades, "7-1"))
            .await
            .unwrap();
        assert_eq!(
            tokio::time::timeout(Duration::from_secs(1), store.get(StreamKind::Trades))
                .await
                .unwrap(),
            Cursor::Token("7-1".into())
        );
        drop(held);
    }
}
