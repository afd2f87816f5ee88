//! Incremental sync engine: the cursor-driven fetch/write loop.

mod backoff;
mod engine;
mod source;
mod state;

pub use backoff::Backoff;
pub use engine::{StepOutcome, SyncLoop, SyncSettings};
pub use source::{Connector, FetchError, MessageSource};
pub use state::{PassStats, PassSummary, SyncState};
