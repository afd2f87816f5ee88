mod cursor;
mod profile;
mod rows;
mod schema;
mod writer;

pub use cursor::{get_cursor, set_cursor};
pub use profile::{Backend, StoreProfile, TimestampFormat, MYSQL_COLLATION};
pub use rows::*;
pub use schema::{ensure_schema, table_specs, ColumnSpec, ColumnType, SchemaReport, TableSpec};
pub use writer::{BatchError, BatchWriter, CommitResult};

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use tracing::info;

const SQLITE_PRAGMAS: &[&str] = &[
    "PRAGMA journal_mode = WAL",
    "PRAGMA synchronous = NORMAL",
    "PRAGMA busy_timeout = 10000",
];

/// Connection URL for an embedded store file, created if missing.
#[must_use]
pub fn sqlite_url(path: &Path) -> String {
    format!("sqlite://{}?mode=rwc", path.display())
}

/// Connection pool plus the profile describing what the store looks like.
#[derive(Debug, Clone)]
pub struct Database {
    pool: AnyPool,
    profile: StoreProfile,
}

impl Database {
    /// Connect to the store at `url` and verify it accepts writes.
    ///
    /// The schema is not touched; call [`ensure_schema`] afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or the store is read-only.
    pub async fn connect(url: &str, profile: StoreProfile, max_connections: u32) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let mut options = AnyPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30));

        if profile.backend == Backend::Sqlite {
            options = options.after_connect(|conn, _meta| {
                Box::pin(async move {
                    // Match the pragmas used for embedded deployments: WAL keeps
                    // readers unblocked while a batch transaction is open.
                    for pragma in SQLITE_PRAGMAS {
                        sqlx::query(pragma).execute(&mut *conn).await?;
                    }
                    Ok(())
                })
            });
        }

        let pool = options
            .connect(url)
            .await
            .with_context(|| format!("Failed to connect to {} store", profile.backend.as_str()))?;

        let db = Self { pool, profile };
        db.verify_writable().await?;
        info!(backend = profile.backend.as_str(), "Store connected");

        Ok(db)
    }

    async fn verify_writable(&self) -> Result<()> {
        // Detect read-only mounts and missing grants at startup rather than on
        // the first batch. Starting a transaction requires write capability on SQLite.
        let tx = self.pool.begin().await.with_context(|| {
            format!(
                "{} store is not writable. Check file permissions or grants",
                self.profile.backend.as_str()
            )
        })?;

        tx.commit()
            .await
            .context("Failed to commit writability check")?;
        Ok(())
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub const fn pool(&self) -> &AnyPool {
        &self.pool
    }

    #[must_use]
    pub const fn profile(&self) -> StoreProfile {
        self.profile
    }
}
