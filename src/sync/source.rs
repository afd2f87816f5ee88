use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::discord::{Channel, Message};

/// Failure while talking to the upstream chat platform.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Timeout, rate limit or temporary outage. The same request may be retried.
    #[error("transient fetch error: {reason}")]
    Transient {
        reason: String,
        /// Server-provided hint for how long to wait before retrying.
        retry_after: Option<Duration>,
    },
    /// The session or channel is unusable and the client must be recreated.
    #[error("fatal connection error: {0}")]
    Fatal(String),
    /// A specific message does not exist.
    #[error("message {0} not found")]
    NotFound(String),
}

impl FetchError {
    #[must_use]
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient {
            reason: reason.into(),
            retry_after: None,
        }
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// A connected session able to page through one channel's history.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Fetch up to `limit` messages strictly newer than `after`, newest first.
    async fn fetch_after(&self, after: &str, limit: u8) -> Result<Vec<Message>, FetchError>;

    /// Fetch a single message by id.
    async fn fetch_single(&self, message_id: &str) -> Result<Message, FetchError>;

    /// Metadata of the mirrored channel, when the session looked it up.
    fn channel(&self) -> Option<&Channel> {
        None
    }
}

/// Creates sessions. The sync loop calls this at startup and again after every
/// fatal connection error, discarding the previous source.
#[async_trait]
pub trait Connector: Send + Sync {
    type Source: MessageSource;

    async fn connect(&self) -> Result<Self::Source, FetchError>;
}
