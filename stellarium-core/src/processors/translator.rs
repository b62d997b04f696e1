//! EventTranslator.
//!
//! Turns ledger events into per-subscriber notification texts and advances
//! the stream cursor once the event has been dealt with, whatever the
//! outcome (notified, filtered as spam, malformed, ignored).

use crate::checkpoint::CheckpointStore;
use crate::config::PipelineConfig;
use crate::events::{
    AccountCreated, LedgerEvent, LedgerEventKind, Notification, NotificationSender, StreamKind,
    Trade, Transfer,
};
use crate::registry::SubscriberRegistry;
use crate::utils::shutdown_requested;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Decimal places of the unit price in trade notifications.
const PRICE_DECIMALS: u32 = 6;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    #[error("malformed {field}: {value:?}")]
    Malformed { field: &'static str, value: String },
}

impl TranslateError {
    fn malformed(field: &'static str, value: &str) -> Self {
        Self::Malformed {
            field,
            value: value.to_owned(),
        }
    }
}

#[derive(Clone)]
pub struct EventTranslator {
    registry: SubscriberRegistry,
    checkpoints: CheckpointStore,
    notifications: NotificationSender,
    spam_threshold: Decimal,
}

impl EventTranslator {
    pub fn new(
        registry: SubscriberRegistry,
        checkpoints: CheckpointStore,
        notifications: NotificationSender,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            registry,
            checkpoints,
            notifications,
            spam_threshold: config.spam_threshold,
        }
    }

    /// Translate one event, queue its notifications and advance the cursor
    /// of `stream`.
    ///
    /// Returns the number of notifications queued, or `None` when shutdown
    /// was requested while waiting for queue space. The cursor is left
    /// untouched in that case so the event is replayed on the next start.
    pub async fn handle(
        &self,
        stream: StreamKind,
        event: LedgerEvent,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Option<usize> {
        let notifications = match self.translate(&event.kind).await {
            Ok(notifications) => notifications,
            Err(e) => {
                warn!(stream = %stream, cursor = %event.cursor, error = %e, "Skipping malformed event");
                Vec::new()
            }
        };

        let mut queued = 0;
        for notification in notifications {
            let permit = tokio::select! {
                biased;

                _ = shutdown_requested(shutdown_rx) => {
                    debug!(stream = %stream, cursor = %event.cursor, "Shutdown while queueing notifications");
                    return None;
                }
                permit = self.notifications.reserve() => permit,
            };
            match permit {
                Ok(permit) => {
                    permit.send(notification);
                    queued += 1;
                }
                Err(_) => {
                    debug!(stream = %stream, "Notification channel closed");
                    break;
                }
            }
        }

        self.checkpoints.set(stream, event.cursor).await;
        Some(queued)
    }

    /// Notifications for one event, based on the current subscribers.
    pub async fn translate(
        &self,
        kind: &LedgerEventKind,
    ) -> Result<Vec<Notification>, TranslateError> {
        match kind {
            LedgerEventKind::Transfer(transfer) => self.transfer(transfer).await,
            LedgerEventKind::AccountCreated(created) => Ok(self.account_created(created).await),
            LedgerEventKind::Trade(trade) => self.trade(trade).await,
            LedgerEventKind::Ignored => Ok(Vec::new()),
            LedgerEventKind::Malformed { reason } => {
                Err(TranslateError::malformed("payload", reason))
            }
        }
    }

    async fn transfer(&self, transfer: &Transfer) -> Result<Vec<Notification>, TranslateError> {
        let amount = parse_amount("amount", &transfer.amount)?;
        let memo = memo_line(transfer.memo.as_deref());

        if transfer.asset.is_native() && amount < self.spam_threshold {
            info!(
                from = %transfer.from,
                to = %transfer.to,
                amount = %transfer.amount,
                "SPAM transfer filtered"
            );
            return Ok(Vec::new());
        }

        let mut notifications = Vec::new();
        let sent = format!(
            "Sent {} {} to {}{memo}",
            transfer.amount, transfer.asset, transfer.to
        );
        self.notify(&transfer.from, &sent, &mut notifications).await;

        let received = format!(
            "Received {} {} from {}{memo}",
            transfer.amount, transfer.asset, transfer.from
        );
        self.notify(&transfer.to, &received, &mut notifications).await;

        Ok(notifications)
    }

    async fn account_created(&self, created: &AccountCreated) -> Vec<Notification> {
        let memo = memo_line(created.memo.as_deref());
        let mut notifications = Vec::new();

        let funder_text = format!(
            "Create account {} with {} XLM{memo}",
            created.account, created.starting_balance
        );
        self.notify(&created.funder, &funder_text, &mut notifications)
            .await;

        let account_text = format!(
            "Account created by funder {} with {} XLM{memo}",
            created.funder, created.starting_balance
        );
        self.notify(&created.account, &account_text, &mut notifications)
            .await;

        notifications
    }

    async fn trade(&self, trade: &Trade) -> Result<Vec<Notification>, TranslateError> {
        let base = parse_amount("base_amount", &trade.base_amount)?;
        let counter = parse_amount("counter_amount", &trade.counter_amount)?;
        let price = base
            .checked_div(counter)
            .ok_or_else(|| TranslateError::malformed("counter_amount", &trade.counter_amount))?
            .round_dp_with_strategy(PRICE_DECIMALS, RoundingStrategy::MidpointAwayFromZero);

        let details = format!(
            "{} {} for {} {}\nPrice: {price:.prec$} {}/{}",
            trade.counter_amount,
            trade.counter_asset,
            trade.base_amount,
            trade.base_asset,
            trade.base_asset,
            trade.counter_asset,
            prec = PRICE_DECIMALS as usize,
        );

        let mut notifications = Vec::new();
        if let Some(account) = &trade.base_account {
            self.notify(account, &format!("Bought {details}"), &mut notifications)
                .await;
        }
        if let Some(account) = &trade.counter_account {
            self.notify(account, &format!("Sold {details}"), &mut notifications)
                .await;
        }
        Ok(notifications)
    }

    async fn notify(&self, account: &str, text: &str, out: &mut Vec<Notification>) {
        for destination in self.registry.subscribers_of(account).await {
            out.push(Notification::new(destination, text));
        }
    }
}

fn parse_amount(field: &'static str, value: &str) -> Result<Decimal, TranslateError> {
    Decimal::from_str(value).map_err(|_| TranslateError::malformed(field, value))
}

fn memo_line(memo: Option<&str>) -> String {
    match memo {
        Some(memo) if !memo.is_empty() => format!("\nMemo: {memo}"),
        _ => String::new(),
    }
}
