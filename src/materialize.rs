//! Mapping from fetched Discord messages to flat store rows.
//!
//! Everything here is pure: no I/O and no failure modes. Missing optional
//! structures on the source message become `NULL` columns.

use crate::db::{
    AttachmentRow, ColumnType, EmbedRow, MaterializedMessage, PostRow, SqlValue, StoreProfile,
};
use crate::discord::{clean_content, Attachment, Channel, Embed, Message};

/// Where an embed column's value comes from.
#[derive(Clone, Copy)]
pub enum EmbedSource {
    Text(fn(&Embed) -> Option<String>),
    Integer(fn(&Embed) -> Option<i64>),
    /// ISO 8601 text rendered through the store's timestamp format.
    Timestamp(fn(&Embed) -> Option<String>),
}

/// One column of the embeds table and how to fill it.
#[derive(Clone, Copy)]
pub struct EmbedColumn {
    pub name: &'static str,
    pub source: EmbedSource,
}

impl EmbedColumn {
    #[must_use]
    pub fn column_type(&self) -> ColumnType {
        match self.source {
            EmbedSource::Text(_) => ColumnType::Text,
            EmbedSource::Integer(_) => ColumnType::Integer,
            EmbedSource::Timestamp(_) => ColumnType::Timestamp,
        }
    }
}

fn dimension(value: Option<u32>) -> Option<i64> {
    value.map(i64::from)
}

/// Field mapping for the embeds table, excluding the owning `post_id`.
///
/// The schema manager builds the table from this list, so adding an entry
/// here is all it takes to capture another embed attribute.
pub static EMBED_COLUMNS: &[EmbedColumn] = &[
    EmbedColumn {
        name: "embed_type",
        source: EmbedSource::Text(|e| e.kind.clone()),
    },
    EmbedColumn {
        name: "title",
        source: EmbedSource::Text(|e| e.title.clone()),
    },
    EmbedColumn {
        name: "description",
        source: EmbedSource::Text(|e| e.description.clone()),
    },
    EmbedColumn {
        name: "url",
        source: EmbedSource::Text(|e| e.url.clone()),
    },
    EmbedColumn {
        name: "color",
        source: EmbedSource::Integer(|e| e.color.map(i64::from)),
    },
    EmbedColumn {
        name: "timestamp",
        source: EmbedSource::Timestamp(|e| e.timestamp.clone()),
    },
    EmbedColumn {
        name: "fields",
        source: EmbedSource::Text(|e| serde_json::to_string(&e.fields).ok()),
    },
    // thumbnail
    EmbedColumn {
        name: "thumbnail_url",
        source: EmbedSource::Text(|e| e.thumbnail.as_ref().and_then(|m| m.url.clone())),
    },
    EmbedColumn {
        name: "thumbnail_proxy_url",
        source: EmbedSource::Text(|e| e.thumbnail.as_ref().and_then(|m| m.proxy_url.clone())),
    },
    EmbedColumn {
        name: "thumbnail_height",
        source: EmbedSource::Integer(|e| dimension(e.thumbnail.as_ref().and_then(|m| m.height))),
    },
    EmbedColumn {
        name: "thumbnail_width",
        source: EmbedSource::Integer(|e| dimension(e.thumbnail.as_ref().and_then(|m| m.width))),
    },
    // image
    EmbedColumn {
        name: "image_url",
        source: EmbedSource::Text(|e| e.image.as_ref().and_then(|m| m.url.clone())),
    },
    EmbedColumn {
        name: "image_proxy_url",
        source: EmbedSource::Text(|e| e.image.as_ref().and_then(|m| m.proxy_url.clone())),
    },
    EmbedColumn {
        name: "image_height",
        source: EmbedSource::Integer(|e| dimension(e.image.as_ref().and_then(|m| m.height))),
    },
    EmbedColumn {
        name: "image_width",
        source: EmbedSource::Integer(|e| dimension(e.image.as_ref().and_then(|m| m.width))),
    },
    // video
    EmbedColumn {
        name: "video_url",
        source: EmbedSource::Text(|e| e.video.as_ref().and_then(|m| m.url.clone())),
    },
    EmbedColumn {
        name: "video_proxy_url",
        source: EmbedSource::Text(|e| e.video.as_ref().and_then(|m| m.proxy_url.clone())),
    },
    EmbedColumn {
        name: "video_height",
        source: EmbedSource::Integer(|e| dimension(e.video.as_ref().and_then(|m| m.height))),
    },
    EmbedColumn {
        name: "video_width",
        source: EmbedSource::Integer(|e| dimension(e.video.as_ref().and_then(|m| m.width))),
    },
    // author
    EmbedColumn {
        name: "author_name",
        source: EmbedSource::Text(|e| e.author.as_ref().and_then(|a| a.name.clone())),
    },
    EmbedColumn {
        name: "author_url",
        source: EmbedSource::Text(|e| e.author.as_ref().and_then(|a| a.url.clone())),
    },
    EmbedColumn {
        name: "author_icon_url",
        source: EmbedSource::Text(|e| e.author.as_ref().and_then(|a| a.icon_url.clone())),
    },
    EmbedColumn {
        name: "author_proxy_icon_url",
        source: EmbedSource::Text(|e| e.author.as_ref().and_then(|a| a.proxy_icon_url.clone())),
    },
    // provider
    EmbedColumn {
        name: "provider_name",
        source: EmbedSource::Text(|e| e.provider.as_ref().and_then(|p| p.name.clone())),
    },
    EmbedColumn {
        name: "provider_url",
        source: EmbedSource::Text(|e| e.provider.as_ref().and_then(|p| p.url.clone())),
    },
    // footer
    EmbedColumn {
        name: "footer_text",
        source: EmbedSource::Text(|e| e.footer.as_ref().and_then(|f| f.text.clone())),
    },
    EmbedColumn {
        name: "footer_icon_url",
        source: EmbedSource::Text(|e| e.footer.as_ref().and_then(|f| f.icon_url.clone())),
    },
    EmbedColumn {
        name: "footer_proxy_icon_url",
        source: EmbedSource::Text(|e| e.footer.as_ref().and_then(|f| f.proxy_icon_url.clone())),
    },
];

/// Turns messages into row sets for one store profile.
#[derive(Debug, Clone)]
pub struct Materializer {
    profile: StoreProfile,
    channel: Option<Channel>,
}

impl Materializer {
    #[must_use]
    pub fn new(profile: StoreProfile) -> Self {
        Self {
            profile,
            channel: None,
        }
    }

    /// Resolve mentions of the mirrored channel in stored text.
    #[must_use]
    pub fn with_channel(self, channel: Option<Channel>) -> Self {
        Self { channel, ..self }
    }

    #[must_use]
    pub fn materialize(&self, message: &Message) -> MaterializedMessage {
        let format = self.profile.timestamps;
        let mut timestamp = format.render(Some(&message.timestamp));
        if timestamp.is_null() {
            if let Some(millis) = message.snowflake_millis() {
                timestamp = format.render_millis(millis);
            }
        }

        let post = PostRow {
            discord_id: message.id.clone(),
            author_id: message.author.id.clone(),
            author_name: message.author.display_name().to_string(),
            author_avatar: message.author.avatar.clone(),
            comment: clean_content(message, self.channel.as_ref()),
            timestamp,
            pinned: message.pinned,
            has_attachments: !message.attachments.is_empty(),
            has_embeds: !message.embeds.is_empty(),
        };

        let attachments = message
            .attachments
            .iter()
            .map(|a| attachment_row(&message.id, a))
            .collect();

        let embeds = if self.profile.embeds {
            message
                .embeds
                .iter()
                .map(|e| self.embed_row(&message.id, e))
                .collect()
        } else {
            Vec::new()
        };

        MaterializedMessage {
            post,
            attachments,
            embeds,
        }
    }

    fn embed_row(&self, post_id: &str, embed: &Embed) -> EmbedRow {
        let columns = EMBED_COLUMNS
            .iter()
            .map(|column| {
                let value = match column.source {
                    EmbedSource::Text(get) => SqlValue::Text(get(embed)),
                    EmbedSource::Integer(get) => SqlValue::Integer(get(embed)),
                    EmbedSource::Timestamp(get) => {
                        self.profile.timestamps.render(get(embed).as_deref())
                    }
                };
                (column.name, value)
            })
            .collect();

        EmbedRow {
            post_id: post_id.to_string(),
            columns,
        }
    }
}

fn attachment_row(post_id: &str, attachment: &Attachment) -> AttachmentRow {
    AttachmentRow {
        id: attachment.id.clone(),
        post_id: post_id.to_string(),
        attachment: attachment.url.clone(),
        url: attachment.url.clone(),
        proxy_url: attachment.proxy_url.clone(),
        size: i64::try_from(attachment.size).unwrap_or(i64::MAX),
        height: dimension(attachment.height),
        width: dimension(attachment.width),
        name: attachment.filename.clone(),
    }
}
