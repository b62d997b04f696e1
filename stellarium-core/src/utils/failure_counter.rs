use std::time::Duration;

/// Counts connections that die quickly and decides when to cool down.
///
/// A connection that lived at least `stable_after` resets the count; a
/// shorter one increments it. Once the count exceeds `max_quick`, every
/// further quick failure asks for a `cooldown` pause until a stable
/// connection resets the count.
#[derive(Debug, Clone)]
pub struct FailureCounter {
    count: u32,
    stable_after: Duration,
    max_quick: u32,
    cooldown: Duration,
}

impl FailureCounter {
    pub fn new(stable_after: Duration, max_quick: u32, cooldown: Duration) -> Self {
        Self {
            count: 0,
            stable_after,
            max_quick,
            cooldown,
        }
    }

    /// Record the end of a connection that lived for `lived`.
    ///
    /// Returns how long to wait before reconnecting.
    pub fn record(&mut self, lived: Duration) -> Option<Duration> {
        if lived < self.stable_after {
            self.count = self.count.saturating_add(1);
        } else {
            self.count = 0;
        }
        (self.count > self.max_quick).then_some(self.cooldown)
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}
