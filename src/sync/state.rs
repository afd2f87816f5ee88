use std::time::{Duration, Instant};

/// Whether the last fetch returned anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Consecutive fetches return non-empty windows; the store is behind.
    CatchingUp,
    /// The last fetch was empty; polling at the idle interval.
    Idle,
}

/// Throughput of one catch-up pass, reported when the pass ends.
#[derive(Debug, Clone)]
pub struct PassStats {
    started: Instant,
    messages: u64,
    batches: u64,
}

/// Summary emitted on the catch-up to idle transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassSummary {
    pub messages: u64,
    pub batches: u64,
    pub elapsed: Duration,
}

impl PassSummary {
    #[must_use]
    pub fn rate_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.messages as f64 / secs
        } else {
            0.0
        }
    }
}

impl PassStats {
    #[must_use]
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            messages: 0,
            batches: 0,
        }
    }

    pub fn record_batch(&mut self, messages: usize) {
        self.messages += messages as u64;
        self.batches += 1;
    }

    #[must_use]
    pub fn messages(&self) -> u64 {
        self.messages
    }

    #[must_use]
    pub fn summary(&self) -> PassSummary {
        PassSummary {
            messages: self.messages,
            batches: self.batches,
            elapsed: self.started.elapsed(),
        }
    }
}
