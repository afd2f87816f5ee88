//! Capability descriptor for the target store.
//!
//! The schema variants (attachments only, attachments + embeds, and the
//! client/server backend with charset normalization) are all expressed by one
//! [`StoreProfile`] value instead of separate code paths.

use chrono::{DateTime, SecondsFormat, Utc};

use super::rows::SqlValue;

/// Storage engine behind the connection pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Embedded, file-based `SQLite`.
    Sqlite,
    /// Client/server `MySQL` or `MariaDB`.
    MySql,
}

impl Backend {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::MySql => "mysql",
        }
    }

    /// Timestamp representation used when none is configured explicitly.
    #[must_use]
    pub fn default_timestamp_format(&self) -> TimestampFormat {
        match self {
            Self::Sqlite => TimestampFormat::EpochMillis,
            Self::MySql => TimestampFormat::Rfc3339,
        }
    }

    /// Query listing the names of all tables in the current database.
    #[must_use]
    pub fn list_tables_sql(&self) -> &'static str {
        match self {
            Self::Sqlite => "SELECT name FROM sqlite_master WHERE type = 'table'",
            Self::MySql => {
                "SELECT CAST(TABLE_NAME AS CHAR) FROM information_schema.TABLES \
                 WHERE TABLE_SCHEMA = DATABASE()"
            }
        }
    }

    /// Query listing the column names of one table, bound to the table name.
    #[must_use]
    pub fn list_columns_sql(&self) -> &'static str {
        match self {
            Self::Sqlite => "SELECT name FROM pragma_table_info(?)",
            Self::MySql => {
                "SELECT CAST(COLUMN_NAME AS CHAR) FROM information_schema.COLUMNS \
                 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?"
            }
        }
    }

    /// Suffix appended to `CREATE TABLE` statements.
    #[must_use]
    pub fn table_options(&self) -> &'static str {
        match self {
            Self::Sqlite => "",
            Self::MySql => " DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci",
        }
    }
}

/// Collation every client/server table is normalized to.
pub const MYSQL_COLLATION: &str = "utf8mb4_unicode_ci";

/// How timestamps are written to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampFormat {
    /// Integer milliseconds since the Unix epoch.
    EpochMillis,
    /// RFC 3339 text in UTC.
    Rfc3339,
}

impl TimestampFormat {
    /// Render an ISO 8601 timestamp. Missing or unparseable input yields `NULL`.
    #[must_use]
    pub fn render(&self, iso: Option<&str>) -> SqlValue {
        let parsed = iso.and_then(|s| DateTime::parse_from_rfc3339(s).ok());
        match self {
            Self::EpochMillis => SqlValue::Integer(parsed.map(|dt| dt.timestamp_millis())),
            Self::Rfc3339 => SqlValue::Text(parsed.map(|dt| {
                dt.with_timezone(&Utc)
                    .to_rfc3339_opts(SecondsFormat::Millis, true)
            })),
        }
    }

    /// Render Unix milliseconds.
    #[must_use]
    pub fn render_millis(&self, millis: i64) -> SqlValue {
        match self {
            Self::EpochMillis => SqlValue::Integer(Some(millis)),
            Self::Rfc3339 => SqlValue::Text(
                DateTime::<Utc>::from_timestamp_millis(millis)
                    .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
            ),
        }
    }
}

/// Everything that varies between deployments of the mirror's schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreProfile {
    pub backend: Backend,
    /// Whether the embeds table and the posts `embeds` flag exist.
    pub embeds: bool,
    pub timestamps: TimestampFormat,
}

impl StoreProfile {
    #[must_use]
    pub fn sqlite() -> Self {
        Self {
            backend: Backend::Sqlite,
            embeds: true,
            timestamps: TimestampFormat::EpochMillis,
        }
    }

    #[must_use]
    pub fn without_embeds(self) -> Self {
        Self {
            embeds: false,
            ..self
        }
    }
}
