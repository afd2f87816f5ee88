use std::time::Duration;

/// Exponential backoff between retries of the same window.
///
/// Starts at `base`, doubles per consecutive failure and stops at `max`.
/// Setting `base == max` gives a fixed interval.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    failures: u32,
}

impl Backoff {
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            failures: 0,
        }
    }

    /// Record a failure and return how long to wait before retrying.
    ///
    /// A server-provided hint wins when it asks for a longer wait.
    pub fn next_delay(&mut self, hint: Option<Duration>) -> Duration {
        let factor = 2u32.saturating_pow(self.failures.min(16));
        self.failures = self.failures.saturating_add(1);
        let delay = self.base.saturating_mul(factor).min(self.max);
        hint.map_or(delay, |hint| hint.max(delay))
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }
}
