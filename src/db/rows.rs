//! Flat row shapes written by the batch writer.

use sqlx::any::AnyArguments;
use sqlx::query::Query;
use sqlx::Any;

pub type AnyQuery<'q> = Query<'q, Any, AnyArguments<'q>>;

/// A nullable column value in one of the representations every backend supports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Text(Option<String>),
    Integer(Option<i64>),
    Bool(bool),
}

impl SqlValue {
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(Some(value.into()))
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Text(None) | Self::Integer(None))
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => value.as_deref(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => *value,
            _ => None,
        }
    }

    pub fn bind_to<'q>(&self, query: AnyQuery<'q>) -> AnyQuery<'q> {
        match self {
            Self::Text(value) => query.bind(value.clone()),
            Self::Integer(value) => query.bind(*value),
            Self::Bool(value) => query.bind(*value),
        }
    }
}

/// Named column values for one insert, in column order.
pub type RowValues = Vec<(&'static str, SqlValue)>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRow {
    pub discord_id: String,
    pub author_id: String,
    pub author_name: String,
    pub author_avatar: Option<String>,
    pub comment: String,
    pub timestamp: SqlValue,
    pub pinned: bool,
    pub has_attachments: bool,
    pub has_embeds: bool,
}

impl PostRow {
    /// Column values for the posts table; the `embeds` flag only exists when
    /// the store keeps embeds.
    #[must_use]
    pub fn values(&self, with_embeds: bool) -> RowValues {
        let mut values = vec![
            ("discord_id", SqlValue::text(&self.discord_id)),
            ("author_id", SqlValue::text(&self.author_id)),
            ("author_name", SqlValue::text(&self.author_name)),
            ("author_avatar", SqlValue::Text(self.author_avatar.clone())),
            ("comment", SqlValue::text(&self.comment)),
            ("timestamp", self.timestamp.clone()),
            ("pinned", SqlValue::Bool(self.pinned)),
            ("attachments", SqlValue::Bool(self.has_attachments)),
        ];
        if with_embeds {
            values.push(("embeds", SqlValue::Bool(self.has_embeds)));
        }
        values
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRow {
    pub id: String,
    pub post_id: String,
    pub attachment: String,
    pub url: String,
    pub proxy_url: String,
    pub size: i64,
    pub height: Option<i64>,
    pub width: Option<i64>,
    pub name: String,
}

impl AttachmentRow {
    #[must_use]
    pub fn values(&self) -> RowValues {
        vec![
            ("id", SqlValue::text(&self.id)),
            ("post_id", SqlValue::text(&self.post_id)),
            ("attachment", SqlValue::text(&self.attachment)),
            ("url", SqlValue::text(&self.url)),
            ("proxy_url", SqlValue::text(&self.proxy_url)),
            ("size", SqlValue::Integer(Some(self.size))),
            ("height", SqlValue::Integer(self.height)),
            ("width", SqlValue::Integer(self.width)),
            ("name", SqlValue::text(&self.name)),
        ]
    }
}

/// One embed, flattened by the declarative embed column table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedRow {
    pub post_id: String,
    pub columns: RowValues,
}

impl EmbedRow {
    #[must_use]
    pub fn values(&self) -> RowValues {
        let mut values = Vec::with_capacity(self.columns.len() + 1);
        values.push(("post_id", SqlValue::text(&self.post_id)));
        values.extend(self.columns.iter().cloned());
        values
    }

    /// Look up a flattened column by name.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, value)| value)
    }
}

/// Everything one fetched message turns into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedMessage {
    pub post: PostRow,
    pub attachments: Vec<AttachmentRow>,
    pub embeds: Vec<EmbedRow>,
}
