//! Long-running processors of the notification pipeline.
//!
//! - `StreamConsumer`: pulls `LedgerEvent`s from a `LedgerSource`, one per stream
//! - `EventTranslator`: turns events into `Notification`s and advances cursors
//! - `BulkAggregator`: coalesces `Notification`s per destination
//! - `Delivery`: hands texts to the `OutboundSender`, removing dead chats
//! - `CheckpointSaver`: persists cursors periodically

pub mod bulk_aggregator;
pub mod checkpoint_saver;
pub mod delivery;
pub mod stream_consumer;
pub mod translator;

pub use bulk_aggregator::BulkAggregator;
pub use checkpoint_saver::CheckpointSaver;
pub use delivery::{Delivery, DeliveryError, DeliveryOutcome, OutboundSender};
pub use stream_consumer::{LedgerEventStream, LedgerSource, SourceError, StreamConsumer};
pub use translator::{EventTranslator, TranslateError};
