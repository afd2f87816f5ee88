//! The persisted resume point: id of the newest durably stored message.

use anyhow::{Context, Result};
use sqlx::{Any, AnyPool, Transaction};

use super::schema::CURSOR_TABLE;

/// Read the stored cursor, or `seed` if the store has never been advanced.
///
/// # Errors
///
/// Returns an error if the cursor table cannot be read.
pub async fn get_cursor(pool: &AnyPool, seed: &str) -> Result<String> {
    let sql = format!("SELECT top_message FROM {CURSOR_TABLE} LIMIT 1");
    let stored = sqlx::query_scalar::<_, Option<String>>(&sql)
        .fetch_optional(pool)
        .await
        .context("Failed to read cursor")?;

    Ok(stored
        .flatten()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| seed.to_string()))
}

/// Advance the cursor inside the transaction that commits the batch it names.
///
/// Only an open transaction is accepted, so the cursor commits atomically
/// with the rows it names.
///
/// # Errors
///
/// Returns the driver error; the caller rolls the batch back.
pub async fn set_cursor(tx: &mut Transaction<'_, Any>, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query(&format!("UPDATE {CURSOR_TABLE} SET top_message = ?"))
        .bind(id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
