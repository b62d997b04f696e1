//! Channel factory for notifications headed to the aggregator.

use super::types::Notification;
use tokio::sync::mpsc;

/// Default depth of the notification queue.
///
/// Deep enough to absorb a busy ledger close; when it fills up, stream
/// consumers wait on `send` instead of growing memory.
pub const DEFAULT_NOTIFICATION_BUFFER: usize = 5000;

/// Sender handle for notifications.
pub type NotificationSender = mpsc::Sender<Notification>;
/// Receiver handle for notifications.
pub type NotificationReceiver = mpsc::Receiver<Notification>;

/// Create a new notification channel of the given depth.
///
/// Multiple senders (one per stream consumer) can be cloned from the
/// returned sender; the aggregator owns the receiver.
pub fn notification_channel(depth: usize) -> (NotificationSender, NotificationReceiver) {
    mpsc::channel(depth.max(1))
}
