//! Introspecting schema manager.
//!
//! Tables are described declaratively by [`TableSpec`]s derived from the
//! [`StoreProfile`]. On every boot the manager creates what is missing, adds
//! missing columns to existing tables, normalizes the client/server charset and
//! makes sure the cursor table holds exactly one row.

use std::collections::HashSet;

use anyhow::{bail, Context, Result};
use sqlx::AnyPool;
use tracing::{debug, info, warn};

use super::profile::{Backend, StoreProfile, TimestampFormat, MYSQL_COLLATION};
use super::Database;
use crate::materialize::EMBED_COLUMNS;

/// Name of the single-row table that holds the cursor.
pub const CURSOR_TABLE: &str = "internal";

/// Logical column types, rendered per backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Discord snowflake.
    Id,
    Text,
    Integer,
    Bool,
    /// Integer or text depending on [`TimestampFormat`].
    Timestamp,
}

impl ColumnType {
    #[must_use]
    pub fn sql(&self, backend: Backend, timestamps: TimestampFormat) -> &'static str {
        match (self, backend) {
            (Self::Id | Self::Text, Backend::Sqlite) => "TEXT",
            (Self::Integer, Backend::Sqlite) => "INTEGER",
            (Self::Bool, Backend::Sqlite) => "BOOLEAN",
            (Self::Id, Backend::MySql) => "VARCHAR(32)",
            (Self::Text, Backend::MySql) => "MEDIUMTEXT",
            (Self::Integer, Backend::MySql) => "BIGINT",
            (Self::Bool, Backend::MySql) => "TINYINT(1)",
            (Self::Timestamp, _) => match timestamps {
                TimestampFormat::EpochMillis => Self::Integer.sql(backend, timestamps),
                TimestampFormat::Rfc3339 => match backend {
                    Backend::Sqlite => "TEXT",
                    Backend::MySql => "VARCHAR(40)",
                },
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub ty: ColumnType,
    pub unique: bool,
}

impl ColumnSpec {
    const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            unique: false,
        }
    }

    const fn unique(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            unique: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    pub columns: Vec<ColumnSpec>,
}

impl TableSpec {
    /// `CREATE TABLE` statement for this table.
    #[must_use]
    pub fn create_sql(&self, profile: StoreProfile) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let ty = c.ty.sql(profile.backend, profile.timestamps);
                if c.unique {
                    format!("{} {ty} UNIQUE", c.name)
                } else {
                    format!("{} {ty}", c.name)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({columns}){}",
            self.name,
            profile.backend.table_options()
        )
    }

    /// `ALTER TABLE` statement adding one column. Constraints are not carried
    /// over since `SQLite` cannot add a `UNIQUE` column in place.
    #[must_use]
    pub fn add_column_sql(&self, column: &ColumnSpec, profile: StoreProfile) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            self.name,
            column.name,
            column.ty.sql(profile.backend, profile.timestamps)
        )
    }
}

/// The full set of tables for a profile, in creation order.
#[must_use]
pub fn table_specs(profile: StoreProfile) -> Vec<TableSpec> {
    let mut post_columns = vec![
        ColumnSpec::unique("discord_id", ColumnType::Id),
        ColumnSpec::new("author_id", ColumnType::Id),
        ColumnSpec::new("author_name", ColumnType::Text),
        ColumnSpec::new("author_avatar", ColumnType::Text),
        ColumnSpec::new("comment", ColumnType::Text),
        ColumnSpec::new("timestamp", ColumnType::Timestamp),
        ColumnSpec::new("pinned", ColumnType::Bool),
        ColumnSpec::new("attachments", ColumnType::Bool),
    ];
    if profile.embeds {
        post_columns.push(ColumnSpec::new("embeds", ColumnType::Bool));
    }

    let mut tables = vec![
        TableSpec {
            name: "posts",
            columns: post_columns,
        },
        TableSpec {
            name: "attachments",
            columns: vec![
                ColumnSpec::new("id", ColumnType::Id),
                ColumnSpec::new("post_id", ColumnType::Id),
                ColumnSpec::new("attachment", ColumnType::Text),
                ColumnSpec::new("url", ColumnType::Text),
                ColumnSpec::new("proxy_url", ColumnType::Text),
                ColumnSpec::new("size", ColumnType::Integer),
                ColumnSpec::new("height", ColumnType::Integer),
                ColumnSpec::new("width", ColumnType::Integer),
                ColumnSpec::new("name", ColumnType::Text),
            ],
        },
    ];

    if profile.embeds {
        let mut columns = vec![ColumnSpec::new("post_id", ColumnType::Id)];
        columns.extend(
            EMBED_COLUMNS
                .iter()
                .map(|c| ColumnSpec::new(c.name, c.column_type())),
        );
        tables.push(TableSpec {
            name: "embeds",
            columns,
        });
    }

    tables.push(TableSpec {
        name: CURSOR_TABLE,
        columns: vec![ColumnSpec::new("top_message", ColumnType::Id)],
    });

    tables
}

/// What [`ensure_schema`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaReport {
    pub created_tables: Vec<&'static str>,
    /// `table.column` entries added to existing tables.
    pub added_columns: Vec<String>,
    pub normalized_tables: Vec<&'static str>,
    pub seeded_cursor: bool,
}

impl SchemaReport {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.created_tables.is_empty()
            && self.added_columns.is_empty()
            && self.normalized_tables.is_empty()
            && !self.seeded_cursor
    }
}

/// Bring the store's schema in line with its profile. Safe to run on every boot.
///
/// # Errors
///
/// Returns an error if metadata cannot be read or DDL fails (permissions,
/// connectivity). Callers treat this as fatal at startup.
pub async fn ensure_schema(db: &Database) -> Result<SchemaReport> {
    let profile = db.profile();
    let pool = db.pool();
    let mut report = SchemaReport::default();

    let existing: HashSet<String> =
        sqlx::query_scalar::<_, String>(profile.backend.list_tables_sql())
            .fetch_all(pool)
            .await
            .context("Failed to list existing tables")?
            .into_iter()
            .collect();

    for table in table_specs(profile) {
        if existing.contains(table.name) {
            add_missing_columns(pool, &table, profile, &mut report).await?;
        } else {
            create_table(pool, &table, profile).await?;
            report.created_tables.push(table.name);
        }

        if profile.backend == Backend::MySql && normalize_charset(pool, &table).await? {
            report.normalized_tables.push(table.name);
        }
    }

    report.seeded_cursor = ensure_cursor_row(pool).await?;

    if report.is_noop() {
        debug!("Schema already up to date");
    } else {
        info!(
            created = ?report.created_tables,
            added_columns = ?report.added_columns,
            normalized = ?report.normalized_tables,
            seeded_cursor = report.seeded_cursor,
            "Schema updated"
        );
    }

    Ok(report)
}

async fn create_table(pool: &AnyPool, table: &TableSpec, profile: StoreProfile) -> Result<()> {
    debug!(table = table.name, "Creating table");
    let sql = table.create_sql(profile);
    let mut tx = pool
        .begin()
        .await
        .with_context(|| format!("Failed to begin creation of {}", table.name))?;
    sqlx::query(&sql)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to create {} table", table.name))?;
    tx.commit()
        .await
        .with_context(|| format!("Failed to commit creation of {}", table.name))?;
    Ok(())
}

async fn add_missing_columns(
    pool: &AnyPool,
    table: &TableSpec,
    profile: StoreProfile,
    report: &mut SchemaReport,
) -> Result<()> {
    let present: HashSet<String> =
        sqlx::query_scalar::<_, String>(profile.backend.list_columns_sql())
            .bind(table.name)
            .fetch_all(pool)
            .await
            .with_context(|| format!("Failed to list columns of {}", table.name))?
            .into_iter()
            .collect();

    for column in &table.columns {
        if present.contains(column.name) {
            continue;
        }
        if column.unique {
            warn!(
                table = table.name,
                column = column.name,
                "Adding column without its UNIQUE constraint"
            );
        }
        sqlx::query(&table.add_column_sql(column, profile))
            .execute(pool)
            .await
            .with_context(|| format!("Failed to add column {}.{}", table.name, column.name))?;
        report
            .added_columns
            .push(format!("{}.{}", table.name, column.name));
    }

    Ok(())
}

/// Convert a client/server table to the expected charset and collation.
/// Returns whether a conversion ran.
async fn normalize_charset(pool: &AnyPool, table: &TableSpec) -> Result<bool> {
    let collation = sqlx::query_scalar::<_, String>(
        "SELECT CAST(TABLE_COLLATION AS CHAR) FROM information_schema.TABLES \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?",
    )
    .bind(table.name)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("Failed to read collation of {}", table.name))?;

    if collation.as_deref() == Some(MYSQL_COLLATION) {
        return Ok(false);
    }

    info!(
        table = table.name,
        from = collation.as_deref().unwrap_or("unknown"),
        to = MYSQL_COLLATION,
        "Normalizing table charset"
    );
    let sql = format!(
        "ALTER TABLE {} CONVERT TO CHARACTER SET utf8mb4 COLLATE {MYSQL_COLLATION}",
        table.name
    );
    sqlx::query(&sql)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to normalize charset of {}", table.name))?;
    Ok(true)
}

/// Make sure the cursor table holds exactly one row, seeding an empty one.
async fn ensure_cursor_row(pool: &AnyPool) -> Result<bool> {
    let count = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {CURSOR_TABLE}"))
        .fetch_one(pool)
        .await
        .context("Failed to count cursor rows")?;

    match count {
        0 => {
            sqlx::query(&format!(
                "INSERT INTO {CURSOR_TABLE} (top_message) VALUES (NULL)"
            ))
            .execute(pool)
            .await
            .context("Failed to seed cursor row")?;
            Ok(true)
        }
        1 => Ok(false),
        n => bail!("{CURSOR_TABLE} table holds {n} rows; expected exactly one"),
    }
}
