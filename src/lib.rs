//! Discord Channel Mirror library.
//!
//! A service that follows one Discord channel and mirrors every message, with
//! its attachments and embeds, into a relational store, resuming from a
//! durable cursor after restarts.

// Allow raw string hashes for safety - they're harmless and prevent issues if content changes
#![allow(clippy::needless_raw_string_hashes)]

pub mod config;
pub mod constants;
pub mod db;
pub mod discord;
pub mod materialize;
pub mod sync;
