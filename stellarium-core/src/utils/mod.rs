pub mod failure_counter;

pub use failure_counter::FailureCounter;

use tokio::sync::watch;

/// Resolves once shutdown has been requested on `rx`, or once every sender
/// is gone.
pub async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
