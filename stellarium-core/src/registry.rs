//! Subscriber registry.
//!
//! Durable mapping of subscriber id to watched account, with an in-memory
//! inverse index (account -> subscribers) used by the translator. Both maps
//! live behind one `RwLock`; every mutation writes the database first and
//! only then updates memory, all while holding the write lock.

use crate::entities::subscribers::{
    DeleteSubscriber, InsertSubscriber, ListSubscribers, SubscriberRecord,
};
use crate::events::SubscriberId;
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("subscriber {0} already watches an account")]
    AlreadyExists(SubscriberId),

    #[error("subscriber {0} not found")]
    NotFound(SubscriberId),

    #[error("storage failure: {0}")]
    Storage(#[from] sqlx::Error),
}

/// A registered subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub account: String,
    /// Last liveness probe; `None` until the first one.
    pub last_sanity: Option<Instant>,
}

#[derive(Debug, Default)]
struct RegistryState {
    subscribers: HashMap<SubscriberId, Subscriber>,
    accounts: HashMap<String, HashSet<SubscriberId>>,
}

impl RegistryState {
    fn insert(&mut self, id: SubscriberId, account: String) {
        self.accounts.entry(account.clone()).or_default().insert(id);
        self.subscribers.insert(
            id,
            Subscriber {
                id,
                account,
                last_sanity: None,
            },
        );
    }

    fn remove(&mut self, id: SubscriberId) -> Option<Subscriber> {
        let subscriber = self.subscribers.remove(&id)?;
        if let Some(ids) = self.accounts.get_mut(&subscriber.account) {
            ids.remove(&id);
            if ids.is_empty() {
                self.accounts.remove(&subscriber.account);
            }
        }
        Some(subscriber)
    }
}

/// Shared handle to the registry. Cloning is cheap.
#[derive(Clone)]
pub struct SubscriberRegistry {
    db: DatabaseProcessor,
    state: Arc<RwLock<RegistryState>>,
}

impl SubscriberRegistry {
    /// Replay every durable record into memory.
    pub async fn load(db: DatabaseProcessor) -> Result<Self, RegistryError> {
        let records = db.process(ListSubscribers).await?;
        let mut state = RegistryState::default();
        for SubscriberRecord {
            id,
            stellar_account,
        } in records
        {
            match stellar_account {
                Some(account) if !account.is_empty() => state.insert(SubscriberId(id), account),
                _ => debug!(chat = id, "Skipping subscriber row without account"),
            }
        }

        info!(
            subscribers = state.subscribers.len(),
            accounts = state.accounts.len(),
            "Subscriber registry loaded"
        );

        Ok(Self {
            db,
            state: Arc::new(RwLock::new(state)),
        })
    }

    pub async fn subscribe(
        &self,
        id: SubscriberId,
        account: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let account = account.into();
        let mut state = self.state.write().await;
        if state.subscribers.contains_key(&id) {
            return Err(RegistryError::AlreadyExists(id));
        }

        self.db
            .process(InsertSubscriber {
                id: id.0,
                stellar_account: account.clone(),
            })
            .await?;

        info!(chat = %id, account = %account, "Subscribed");
        state.insert(id, account);
        Ok(())
    }

    pub async fn unsubscribe(&self, id: SubscriberId) -> Result<(), RegistryError> {
        let mut state = self.state.write().await;
        if !state.subscribers.contains_key(&id) {
            return Err(RegistryError::NotFound(id));
        }

        self.db.process(DeleteSubscriber { id: id.0 }).await?;

        if let Some(removed) = state.remove(id) {
            info!(chat = %id, account = %removed.account, "Unsubscribed");
        }
        Ok(())
    }

    pub async fn lookup(&self, id: SubscriberId) -> Option<Subscriber> {
        self.state.read().await.subscribers.get(&id).cloned()
    }

    /// Snapshot of the subscribers watching `account`.
    pub async fn subscribers_of(&self, account: &str) -> Vec<SubscriberId> {
        self.state
            .read()
            .await
            .accounts
            .get(account)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// `(subscribers, distinct accounts)`.
    pub async fn count(&self) -> (usize, usize) {
        let state = self.state.read().await;
        (state.subscribers.len(), state.accounts.len())
    }

    /// Returns true, and restarts the interval, when `id` has not been
    /// probed within `min_interval`. Unknown ids are never due.
    pub async fn touch_sanity(&self, id: SubscriberId, min_interval: Duration) -> bool {
        let mut state = self.state.write().await;
        let Some(subscriber) = state.subscribers.get_mut(&id) else {
            return false;
        };
        let now = Instant::now();
        let due = subscriber
            .last_sanity
            .is_none_or(|last| now.duration_since(last) >= min_interval);
        if due {
            subscriber.last_sanity = Some(now);
        }
        due
    }
}
