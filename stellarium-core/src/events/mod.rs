//! Event system for the ingestion-to-delivery pipeline.
//!
//! # Event Flow
//!
//! 1. `StreamConsumer` pulls `LedgerEvent`s from a `LedgerSource`
//! 2. `EventTranslator` turns each into zero or more `Notification`s
//! 3. `Notification`s travel over the notification channel to `BulkAggregator`
//! 4. `BulkAggregator` coalesces them per destination and hands the text to
//!    `Delivery`
//!
//! Ledger events carry their own stream cursor so the translator can advance
//! the checkpoint after deciding how to handle each one.

pub mod channels;
pub mod types;

pub use channels::{
    NotificationReceiver, NotificationSender, DEFAULT_NOTIFICATION_BUFFER, notification_channel,
};

pub use types::{
    AccountCreated, Asset, Cursor, LedgerEvent, LedgerEventKind, Notification, StreamKind,
    SubscriberId, Trade, Transfer,
};
