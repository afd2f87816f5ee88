use serde::{Deserialize, Serialize};

use crate::constants::DISCORD_EPOCH_MS;

/// A Discord user as embedded in message payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl User {
    /// Name shown in the client: the global display name when set, otherwise the username.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.global_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.username)
    }
}

/// A channel message as returned by `GET /channels/{id}/messages`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub channel_id: String,
    pub author: User,
    #[serde(default)]
    pub content: String,
    /// ISO8601 creation time.
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub mentions: Vec<User>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub embeds: Vec<Embed>,
}

impl Message {
    /// Creation time in Unix milliseconds, derived from the snowflake id.
    #[must_use]
    pub fn snowflake_millis(&self) -> Option<i64> {
        snowflake_millis(&self.id)
    }
}

/// Extract the creation time encoded in a Discord snowflake.
#[must_use]
pub fn snowflake_millis(id: &str) -> Option<i64> {
    let raw: u64 = id.parse().ok()?;
    Some(((raw >> 22) + DISCORD_EPOCH_MS) as i64)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub proxy_url: String,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub color: Option<u32>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub fields: Vec<EmbedField>,
    #[serde(default)]
    pub thumbnail: Option<EmbedMedia>,
    #[serde(default)]
    pub image: Option<EmbedMedia>,
    #[serde(default)]
    pub video: Option<EmbedMedia>,
    #[serde(default)]
    pub author: Option<EmbedAuthor>,
    #[serde(default)]
    pub provider: Option<EmbedProvider>,
    #[serde(default)]
    pub footer: Option<EmbedFooter>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

/// Thumbnail, image and video share one shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedMedia {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub proxy_url: Option<String>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedAuthor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub proxy_icon_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedProvider {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedFooter {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub proxy_icon_url: Option<String>,
}

/// Channel metadata used to verify the configured channel on connect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snowflake_millis() {
        // Example id from the Discord API reference.
        assert_eq!(snowflake_millis("175928847299117063"), Some(1_462_015_105_796));
        assert_eq!(snowflake_millis("0"), Some(DISCORD_EPOCH_MS as i64));
        assert_eq!(snowflake_millis("not-a-number"), None);
    }

    #[test]
    fn test_display_name_prefers_global_name() {
        let mut user = User {
            id: "1".to_string(),
            username: "alice".to_string(),
            global_name: Some("Alice A.".to_string()),
            avatar: None,
        };
        assert_eq!(user.display_name(), "Alice A.");
        user.global_name = Some(String::new());
        assert_eq!(user.display_name(), "alice");
        user.global_name = None;
        assert_eq!(user.display_name(), "alice");
    }

    #[test]
    fn test_deserialize_minimal_message() {
        let json = r#"{
            "id": "1100",
            "author": {"id": "42", "username": "bob"},
            "timestamp": "2023-05-01T12:00:00.000000+00:00",
            "embeds": [{"type": "rich", "fields": [{"name": "a", "value": "b"}]}]
        }"#;
        let message: Message = serde_json::from_str(json).unwrap();
        assert_eq!(message.author.username, "bob");
        assert!(message.attachments.is_empty());
        assert!(!message.pinned);
        assert_eq!(message.embeds[0].kind.as_deref(), Some("rich"));
        assert!(!message.embeds[0].fields[0].inline);
        assert!(message.embeds[0].thumbnail.is_none());
    }
}
