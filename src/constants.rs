//! Shared constants used across the application.

/// User agent sent with every Discord API request.
///
/// Discord requires bots to identify themselves with a `DiscordBot (url, version)` agent.
pub const USER_AGENT: &str = concat!(
    "DiscordBot (https://github.com/discord-channel-mirror, ",
    env!("CARGO_PKG_VERSION"),
    ")"
);

/// Default root of the Discord REST API.
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Largest window the messages endpoint will return in one request.
pub const MAX_FETCH_LIMIT: u8 = 100;

/// Milliseconds between the Unix epoch and the Discord epoch (2015-01-01T00:00:00Z).
pub const DISCORD_EPOCH_MS: u64 = 1_420_070_400_000;
