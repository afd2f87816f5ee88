//! Discord REST client: the upstream collaborator the sync loop pages through.

mod client;
mod content;
mod models;

pub use client::{DiscordChannel, DiscordConfig, DiscordConnector};
pub use content::clean_content;
pub use models::*;
