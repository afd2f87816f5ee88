//! Mention cleanup for stored message text.
//!
//! Raw content carries mention markup such as `<@1234>`; the mirror stores the
//! text the way a reader saw it in the client.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::models::{Channel, Message};

static USER_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@!?(\d{15,21})>").expect("valid mention regex"));

static CHANNEL_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<#(\d{15,21})>").expect("valid channel mention regex"));

static MASS_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@(everyone|here)").expect("valid mass mention regex"));

/// Return the message content with user mentions resolved to display names,
/// mentions of `channel` resolved to `#name`, and `@everyone`/`@here` defused
/// with a zero-width space.
///
/// Mentions that cannot be resolved from the message's `mentions` list or the
/// given channel are left untouched, as are role mentions (`<@&id>`).
#[must_use]
pub fn clean_content(message: &Message, channel: Option<&Channel>) -> String {
    let users = USER_MENTION.replace_all(&message.content, |caps: &Captures<'_>| {
        let id = &caps[1];
        message
            .mentions
            .iter()
            .find(|user| user.id == id)
            .map_or_else(
                || caps[0].to_string(),
                |user| format!("@{}", user.display_name()),
            )
    });

    let channels = CHANNEL_MENTION.replace_all(&users, |caps: &Captures<'_>| {
        channel
            .filter(|c| c.id == caps[1])
            .and_then(|c| c.name.as_deref())
            .map_or_else(|| caps[0].to_string(), |name| format!("#{name}"))
    });

    MASS_MENTION
        .replace_all(&channels, "@\u{200b}$1")
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discord::models::User;

    fn message(content: &str, mentions: Vec<User>) -> Message {
        Message {
            id: "1".to_string(),
            content: content.to_string(),
            mentions,
            ..Message::default()
        }
    }

    fn user(id: &str, username: &str, global_name: Option<&str>) -> User {
        User {
            id: id.to_string(),
            username: username.to_string(),
            global_name: global_name.map(ToString::to_string),
            avatar: None,
        }
    }

    #[test]
    fn test_resolves_known_mentions() {
        let msg = message(
            "hi <@123456789012345678> and <@!223456789012345678>",
            vec![
                user("123456789012345678", "alice", None),
                user("223456789012345678", "bob", Some("Bobby")),
            ],
        );
        assert_eq!(clean_content(&msg, None), "hi @alice and @Bobby");
    }

    #[test]
    fn test_unknown_mentions_are_kept() {
        let msg = message("ping <@999999999999999999>", vec![]);
        assert_eq!(clean_content(&msg, None), "ping <@999999999999999999>");
    }

    #[test]
    fn test_mass_mentions_are_defused() {
        let msg = message("@everyone look, @here too", vec![]);
        assert_eq!(
            clean_content(&msg, None),
            "@\u{200b}everyone look, @\u{200b}here too"
        );
    }

    #[test]
    fn test_plain_text_is_unchanged() {
        let msg = message("nothing special", vec![]);
        assert_eq!(clean_content(&msg, None), "nothing special");
    }

    #[test]
    fn test_resolves_mirrored_channel_mention() {
        let channel = Channel {
            id: "100000000000000000".to_string(),
            name: Some("general".to_string()),
            kind: 0,
        };
        let msg = message(
            "see <#100000000000000000> and <#200000000000000000>, ask <@&300000000000000000>",
            vec![],
        );
        assert_eq!(
            clean_content(&msg, Some(&channel)),
            "see #general and <#200000000000000000>, ask <@&300000000000000000>"
        );
        assert_eq!(clean_content(&msg, None), msg.content);
    }
}
