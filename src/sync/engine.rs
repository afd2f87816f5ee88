use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use super::backoff::Backoff;
use super::source::{Connector, FetchError, MessageSource};
use super::state::{PassStats, SyncState};
use crate::db::{get_cursor, BatchWriter, CommitResult, Database};
use crate::discord::Message;
use crate::materialize::Materializer;

/// Tuning for the sync loop.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Cursor used when the store has never been advanced (the genesis message id).
    pub seed_cursor: String,
    pub fetch_limit: u8,
    pub idle_interval: Duration,
    pub retry_backoff: Duration,
    pub retry_backoff_max: Duration,
    pub reconnect_interval: Duration,
}

/// What one cycle of the loop did, and how long to wait before the next.
#[derive(Debug)]
pub enum StepOutcome {
    /// A non-empty window was stored and the cursor advanced.
    Committed(CommitResult),
    /// The fetch returned nothing.
    Idle(Duration),
    /// The fetch failed transiently; the same window will be retried.
    FetchRetry(Duration),
    /// The batch transaction rolled back; the same window will be retried.
    WriteRetry(Duration),
    /// The upstream session was dropped after a fatal error.
    Disconnected,
    /// Reconnecting failed.
    ConnectFailed(Duration),
}

impl StepOutcome {
    #[must_use]
    pub fn delay(&self) -> Option<Duration> {
        match self {
            Self::Committed(_) | Self::Disconnected => None,
            Self::Idle(delay)
            | Self::FetchRetry(delay)
            | Self::WriteRetry(delay)
            | Self::ConnectFailed(delay) => Some(*delay),
        }
    }
}

/// Mirrors one channel into one store.
///
/// Cycles are strictly sequential: fetch the window after the cursor, store it
/// in one transaction, move the in-memory cursor forward. The only state that
/// survives a restart is the cursor committed by the batch writer.
pub struct SyncLoop<C: Connector> {
    connector: C,
    source: Option<C::Source>,
    db: Database,
    writer: BatchWriter,
    materializer: Materializer,
    settings: SyncSettings,
    cursor: String,
    state: SyncState,
    pass: PassStats,
    backoff: Backoff,
}

impl<C: Connector> SyncLoop<C> {
    /// Create a loop resuming from the stored cursor.
    ///
    /// # Errors
    ///
    /// Returns an error if the cursor cannot be read.
    pub async fn new(connector: C, db: Database, settings: SyncSettings) -> Result<Self> {
        let cursor = get_cursor(db.pool(), &settings.seed_cursor).await?;
        if cursor == settings.seed_cursor {
            info!(cursor = %cursor, "Starting from genesis");
        } else {
            info!(cursor = %cursor, "Resuming from stored cursor");
        }

        Ok(Self {
            connector,
            source: None,
            writer: BatchWriter::new(db.clone()),
            materializer: Materializer::new(db.profile()),
            db,
            backoff: Backoff::new(settings.retry_backoff, settings.retry_backoff_max),
            settings,
            cursor,
            state: SyncState::CatchingUp,
            pass: PassStats::start(),
        })
    }

    #[must_use]
    pub fn cursor(&self) -> &str {
        &self.cursor
    }

    #[must_use]
    pub fn state(&self) -> SyncState {
        self.state
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.source.is_some()
    }

    /// Run forever.
    pub async fn run(&mut self) {
        loop {
            let outcome = self.step().await;
            if let Some(delay) = outcome.delay() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Execute exactly one fetch/write cycle without sleeping.
    pub async fn step(&mut self) -> StepOutcome {
        if let Err(delay) = self.ensure_connected().await {
            return StepOutcome::ConnectFailed(delay);
        }

        let fetched = match &self.source {
            Some(source) => {
                source
                    .fetch_after(&self.cursor, self.settings.fetch_limit)
                    .await
            }
            None => return StepOutcome::ConnectFailed(self.settings.reconnect_interval),
        };

        match fetched {
            Ok(window) if window.is_empty() => self.on_empty_window(),
            Ok(mut window) => {
                // The API answers newest first; store oldest first so the
                // cursor only ever moves forward.
                window.reverse();
                self.on_window(&window).await
            }
            Err(FetchError::Transient {
                reason,
                retry_after,
            }) => {
                let delay = self.backoff.next_delay(retry_after);
                warn!(
                    cursor = %self.cursor,
                    attempt = self.backoff.failures(),
                    delay_ms = millis(delay),
                    "Transient fetch error, retrying same window: {reason}"
                );
                StepOutcome::FetchRetry(delay)
            }
            Err(e) => {
                error!(cursor = %self.cursor, "Upstream session lost, reconnecting: {e}");
                self.source = None;
                StepOutcome::Disconnected
            }
        }
    }

    /// Store the genesis message itself, which pagination would otherwise skip
    /// since windows start strictly after the cursor.
    ///
    /// Does nothing once the cursor has moved past the seed. Connect failures,
    /// transient fetch errors and failed writes are retried with the loop's
    /// backoff until the message is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream reports a fatal error for the session.
    pub async fn capture_genesis(&mut self) -> Result<Option<CommitResult>> {
        let seed = self.settings.seed_cursor.clone();

        let message = loop {
            if self.cursor != seed {
                return Ok(None);
            }
            if let Err(delay) = self.ensure_connected().await {
                tokio::time::sleep(delay).await;
                continue;
            }
            // A fresh session reloads the cursor, which may have moved on.
            if self.cursor != seed {
                return Ok(None);
            }
            let Some(source) = &self.source else {
                continue;
            };

            match source.fetch_single(&seed).await {
                Ok(message) => break message,
                Err(FetchError::NotFound(id)) => {
                    self.backoff.reset();
                    warn!(genesis = %id, "Genesis message not found, syncing strictly after it");
                    return Ok(None);
                }
                Err(FetchError::Transient {
                    reason,
                    retry_after,
                }) => {
                    let delay = self.backoff.next_delay(retry_after);
                    warn!(
                        genesis = %seed,
                        attempt = self.backoff.failures(),
                        delay_ms = millis(delay),
                        "Transient error fetching genesis message, retrying: {reason}"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    self.source = None;
                    return Err(e).context("Failed to fetch genesis message");
                }
            }
        };
        self.backoff.reset();

        let rows = [self.materializer.materialize(&message)];
        loop {
            match self.writer.write_batch(&rows, &seed).await {
                Ok(result) => {
                    self.backoff.reset();
                    info!(
                        genesis = %seed,
                        inserted = result.inserted,
                        "Genesis message captured"
                    );
                    return Ok(Some(result));
                }
                Err(e) => {
                    let delay = self.backoff.next_delay(None);
                    let e = anyhow::Error::new(e);
                    error!(
                        genesis = %seed,
                        delay_ms = millis(delay),
                        "Failed to store genesis message, retrying: {e:#}"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn ensure_connected(&mut self) -> Result<(), Duration> {
        if self.source.is_some() {
            return Ok(());
        }

        let source = match self.connector.connect().await {
            Ok(source) => source,
            Err(e) => {
                warn!(
                    retry_in_ms = millis(self.settings.reconnect_interval),
                    "Failed to connect upstream: {e}"
                );
                return Err(self.settings.reconnect_interval);
            }
        };

        // The cursor is durable, so a fresh session always resumes from the store.
        match get_cursor(self.db.pool(), &self.settings.seed_cursor).await {
            Ok(cursor) => self.cursor = cursor,
            Err(e) => {
                error!("Failed to reload cursor after connecting: {e:#}");
                return Err(self.settings.reconnect_interval);
            }
        }

        info!(cursor = %self.cursor, "Upstream session ready");
        self.materializer =
            Materializer::new(self.db.profile()).with_channel(source.channel().cloned());
        self.source = Some(source);
        Ok(())
    }

    fn on_empty_window(&mut self) -> StepOutcome {
        self.backoff.reset();
        if self.state == SyncState::CatchingUp {
            let summary = self.pass.summary();
            info!(
                messages = summary.messages,
                batches = summary.batches,
                elapsed_secs = %format!("{:.2}", summary.elapsed.as_secs_f64()),
                rate = %format!("{:.1}/s", summary.rate_per_sec()),
                cursor = %self.cursor,
                "Caught up, switching to idle polling"
            );
            self.state = SyncState::Idle;
        } else {
            debug!(cursor = %self.cursor, "No new messages");
        }
        StepOutcome::Idle(self.settings.idle_interval)
    }

    async fn on_window(&mut self, window: &[Message]) -> StepOutcome {
        let Some(newest) = window.last().map(|m| m.id.clone()) else {
            return self.on_empty_window();
        };
        let rows: Vec<_> = window
            .iter()
            .map(|m| self.materializer.materialize(m))
            .collect();

        match self.writer.write_batch(&rows, &newest).await {
            Ok(result) => {
                self.backoff.reset();
                if self.state == SyncState::Idle {
                    debug!(cursor = %self.cursor, "New messages, catching up");
                    self.state = SyncState::CatchingUp;
                    self.pass = PassStats::start();
                }
                self.pass.record_batch(rows.len());
                self.cursor = newest;
                info!(
                    batch_size = rows.len(),
                    inserted = result.inserted,
                    duplicates = result.duplicates,
                    pass_total = self.pass.messages(),
                    cursor = %self.cursor,
                    "Batch committed"
                );
                StepOutcome::Committed(result)
            }
            Err(e) => {
                let delay = self.backoff.next_delay(None);
                let e = anyhow::Error::new(e);
                error!(
                    cursor = %self.cursor,
                    batch_size = rows.len(),
                    delay_ms = millis(delay),
                    "Batch write failed, retrying same window: {e:#}"
                );
                StepOutcome::WriteRetry(delay)
            }
        }
    }
}

fn millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}
