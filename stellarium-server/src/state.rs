//! State shared with the diagnostics endpoint.

use stellarium_core::registry::SubscriberRegistry;
use tokio::time::Instant;

/// Cheap to clone; everything inside is shared.
#[derive(Clone)]
pub struct AppState {
    pub registry: SubscriberRegistry,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(registry: SubscriberRegistry, started_at: Instant) -> Self {
        Self {
            registry,
            started_at,
        }
    }
}
