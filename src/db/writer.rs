//! Atomic, idempotent persistence of one fetched window.

use sqlx::{Any, Transaction};
use thiserror::Error;
use tracing::{debug, warn};

use super::cursor::set_cursor;
use super::rows::{MaterializedMessage, SqlValue};
use super::Database;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("failed to begin batch transaction")]
    Begin(#[source] sqlx::Error),
    #[error("failed to {stage} for message {message_id}")]
    Row {
        stage: &'static str,
        message_id: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("failed to advance cursor to {cursor}")]
    Cursor {
        cursor: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("failed to commit batch ending at {cursor}")]
    Commit {
        cursor: String,
        #[source]
        source: sqlx::Error,
    },
}

/// Outcome of a committed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitResult {
    pub inserted: usize,
    /// Posts skipped because they were already stored.
    pub duplicates: usize,
    /// Cursor value committed with the batch; `None` for an empty batch.
    pub cursor: Option<String>,
}

/// Writes batches of materialized messages together with the cursor advance.
#[derive(Debug, Clone)]
pub struct BatchWriter {
    db: Database,
}

impl BatchWriter {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Store every message of `batch` and advance the cursor to `new_cursor`
    /// in one transaction.
    ///
    /// Posts already present are skipped along with their attachments and
    /// embeds. Either all new rows and the cursor become visible, or nothing
    /// does. An empty batch touches nothing.
    ///
    /// # Errors
    ///
    /// Returns an error naming the failing stage; the transaction has been
    /// rolled back and the stored cursor is unchanged.
    pub async fn write_batch(
        &self,
        batch: &[MaterializedMessage],
        new_cursor: &str,
    ) -> Result<CommitResult, BatchError> {
        if batch.is_empty() {
            return Ok(CommitResult::default());
        }

        let mut tx = self.db.pool().begin().await.map_err(BatchError::Begin)?;
        let mut result = CommitResult::default();

        for message in batch {
            match self.write_message(&mut tx, message).await {
                Ok(true) => result.inserted += 1,
                Ok(false) => {
                    debug!(discord_id = %message.post.discord_id, "Post already stored, skipping");
                    result.duplicates += 1;
                }
                Err(e) => {
                    rollback(tx).await;
                    return Err(e);
                }
            }
        }

        if let Err(source) = set_cursor(&mut tx, new_cursor).await {
            rollback(tx).await;
            return Err(BatchError::Cursor {
                cursor: new_cursor.to_string(),
                source,
            });
        }

        tx.commit().await.map_err(|source| BatchError::Commit {
            cursor: new_cursor.to_string(),
            source,
        })?;

        result.cursor = Some(new_cursor.to_string());
        Ok(result)
    }

    /// Returns `false` when the post was already stored.
    async fn write_message(
        &self,
        tx: &mut Transaction<'_, Any>,
        message: &MaterializedMessage,
    ) -> Result<bool, BatchError> {
        let id = message.post.discord_id.as_str();
        let row_error = |stage: &'static str| {
            move |source: sqlx::Error| BatchError::Row {
                stage,
                message_id: id.to_string(),
                source,
            }
        };

        let existing = sqlx::query("SELECT 1 FROM posts WHERE discord_id = ? LIMIT 1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(row_error("check existing post"))?;
        if existing.is_some() {
            return Ok(false);
        }

        for attachment in &message.attachments {
            insert_row(tx, "attachments", &attachment.values())
                .await
                .map_err(row_error("insert attachment"))?;
        }

        if self.db.profile().embeds {
            for embed in &message.embeds {
                insert_row(tx, "embeds", &embed.values())
                    .await
                    .map_err(row_error("insert embed"))?;
            }
        }

        insert_row(tx, "posts", &message.post.values(self.db.profile().embeds))
            .await
            .map_err(row_error("insert post"))?;

        Ok(true)
    }
}

async fn insert_row(
    tx: &mut Transaction<'_, Any>,
    table: &str,
    values: &[(&'static str, SqlValue)],
) -> Result<(), sqlx::Error> {
    let columns = values
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; values.len()].join(", ");
    let sql = format!("INSERT INTO {table} ({columns}) VALUES ({placeholders})");

    let mut query = sqlx::query(&sql);
    for (_, value) in values {
        query = value.bind_to(query);
    }
    query.execute(&mut **tx).await?;
    Ok(())
}

async fn rollback(tx: Transaction<'_, Any>) {
    if let Err(e) = tx.rollback().await {
        warn!("Failed to roll back batch transaction: {e:#}");
    }
}
