use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::models::{Channel, Message, User};
use crate::constants::USER_AGENT;
use crate::sync::{Connector, FetchError, MessageSource};

/// Settings needed to open a Discord REST session.
#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub token: String,
    pub channel_id: String,
    /// API root without a trailing slash.
    pub api_base: String,
    pub request_timeout: Duration,
}

/// Builds authenticated [`DiscordChannel`] sessions.
#[derive(Debug, Clone)]
pub struct DiscordConnector {
    config: DiscordConfig,
}

impl DiscordConnector {
    #[must_use]
    pub fn new(config: DiscordConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for DiscordConnector {
    type Source = DiscordChannel;

    async fn connect(&self) -> Result<DiscordChannel, FetchError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bot {}", self.config.token))
            .map_err(|_| FetchError::Fatal("DISCORD_TOKEN contains invalid characters".into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .timeout(self.config.request_timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| FetchError::Fatal(format!("failed to build HTTP client: {e}")))?;

        let mut channel = DiscordChannel {
            http,
            api_base: self.config.api_base.clone(),
            channel_id: self.config.channel_id.clone(),
            info: None,
        };

        let me: User = channel.get_json("users/@me").await?;
        info!(user_id = %me.id, username = %me.username, "Logged in to Discord");

        let info: Channel = channel
            .get_json(&format!("channels/{}", channel.channel_id))
            .await?;
        info!(
            channel_id = %info.id,
            channel_name = info.name.as_deref().unwrap_or(""),
            channel_type = info.kind,
            "Channel ready"
        );
        channel.info = Some(info);

        Ok(channel)
    }
}

/// An authenticated session scoped to one channel.
#[derive(Debug, Clone)]
pub struct DiscordChannel {
    http: reqwest::Client,
    api_base: String,
    channel_id: String,
    info: Option<Channel>,
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: Option<f64>,
}

impl DiscordChannel {
    async fn send(&self, path: &str, query: &[(&str, String)]) -> Result<Response, FetchError> {
        let url = format!("{}/{path}", self.api_base);
        self.http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| FetchError::transient(format!("request to {path} failed: {e}")))
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Response, FetchError> {
        let response = self.send(path, query).await?;
        check_status(path, response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let response = self.get(path, &[]).await?;
        decode(path, response).await
    }
}

#[async_trait]
impl MessageSource for DiscordChannel {
    async fn fetch_after(&self, after: &str, limit: u8) -> Result<Vec<Message>, FetchError> {
        let path = format!("channels/{}/messages", self.channel_id);
        debug!(after, limit, "Fetching message window");
        let response = self
            .get(
                &path,
                &[("after", after.to_string()), ("limit", limit.to_string())],
            )
            .await?;
        decode(&path, response).await
    }

    async fn fetch_single(&self, message_id: &str) -> Result<Message, FetchError> {
        let path = format!("channels/{}/messages/{message_id}", self.channel_id);
        let response = self.send(&path, &[]).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(message_id.to_string()));
        }
        let response = check_status(&path, response).await?;
        decode(&path, response).await
    }

    fn channel(&self) -> Option<&Channel> {
        self.info.as_ref()
    }
}

/// Map HTTP status codes onto the fetch error taxonomy.
async fn check_status(path: &str, response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let header_hint = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<f64>().ok());
        let body_hint = response
            .json::<RateLimitBody>()
            .await
            .ok()
            .and_then(|body| body.retry_after);
        let retry_after = body_hint
            .or(header_hint)
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64);
        warn!(path, ?retry_after, "Rate limited by Discord");
        return Err(FetchError::Transient {
            reason: format!("rate limited on {path}"),
            retry_after,
        });
    }

    if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        return Err(FetchError::transient(format!("{path} returned {status}")));
    }

    Err(FetchError::Fatal(format!("{path} returned {status}")))
}

async fn decode<T: DeserializeOwned>(path: &str, response: Response) -> Result<T, FetchError> {
    let body = response
        .bytes()
        .await
        .map_err(|e| FetchError::transient(format!("failed to read {path} body: {e}")))?;
    serde_json::from_slice(&body)
        .map_err(|e| FetchError::transient(format!("failed to decode {path} body: {e}")))
}
