//! Pause between mutating API calls

use std::time::Duration;

/// Fixed delay inserted after each direct deletion and between state polls.
///
/// A zero pause never yields to the timer, so tests stay deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacer {
    pause: Duration,
}

impl Pacer {
    pub fn new(pause: Duration) -> Self {
        Self { pause }
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn pause(&self) -> Duration {
        self.pause
    }

    pub fn is_disabled(&self) -> bool {
        self.pause.is_zero()
    }

    /// Sleep for the configured pause
    pub async fn wait(&self) {
        if self.is_disabled() {
            return;
        }
        tracing::trace!(pause_ms = self.pause.as_millis() as u64, "Pausing");
        tokio::time::sleep(self.pause).await;
    }
}

impl Default for Pacer {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}
