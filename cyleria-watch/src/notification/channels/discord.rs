//! Discord notification channel.
//!
//! A destination that is an `https://` URL is posted to as a webhook; any
//! other destination is a channel id posted to through the bot REST API.
//! 429 responses are retried after the `Retry-After` delay.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::Notifier;
use crate::monitor::AlertEvent;
use crate::{Error, Result};

/// Maximum number of attempts for rate-limited requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Longest server-requested wait honored before retrying.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Discord channel configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    /// Whether alerts go to Discord at all.
    pub enabled: bool,
    /// Bot token. Usually supplied through `DISCORD_TOKEN`.
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub api_base: String,
    /// Display name used for webhook posts.
    pub username: Option<String>,
    pub avatar_url: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token: None,
            api_base: DEFAULT_API_BASE.to_string(),
            username: Some("cyleria-watch".to_string()),
            avatar_url: None,
            request_timeout_secs: 10,
        }
    }
}

impl fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("enabled", &self.enabled)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .field("username", &self.username)
            .field("avatar_url", &self.avatar_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Where a destination string points.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Webhook(String),
    Channel(String),
}

impl Target {
    fn parse(destination: &str) -> Self {
        let destination = destination.trim();
        if destination.starts_with("https://") {
            Target::Webhook(destination.to_string())
        } else {
            Target::Channel(destination.to_string())
        }
    }
}

/// Discord notification channel.
pub struct DiscordNotifier {
    config: DiscordConfig,
    token: RwLock<Option<String>>,
    client: Client,
}

impl DiscordNotifier {
    pub fn new(config: DiscordConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::notification(format!("failed to build Discord client: {e}")))?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: DiscordConfig, client: Client) -> Self {
        let token = config.token.clone().filter(|t| !t.trim().is_empty());
        Self {
            config,
            token: RwLock::new(token),
            client,
        }
    }

    /// Replace the bot token used for channel-id destinations.
    pub fn set_token(&self, token: Option<String>) {
        *self.token.write() = token.filter(|t| !t.trim().is_empty());
    }

    pub fn has_token(&self) -> bool {
        self.token.read().is_some()
    }

    fn get_color(event: &AlertEvent) -> u32 {
        match event {
            AlertEvent::LevelUp { .. } => 0x2ecc71, // Green
            AlertEvent::Death { .. } => 0xe74c3c,   // Red
        }
    }

    /// Build the message payload for an event.
    fn build_payload(&self, event: &AlertEvent, webhook: bool) -> serde_json::Value {
        let mut embed = json!({
            "title": event.title(),
            "description": event.description(),
            "color": Self::get_color(event),
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "footer": { "text": "cyleria-watch" }
        });
        if !event.profile_url().is_empty() {
            embed["url"] = json!(event.profile_url());
        }

        let mut payload = json!({ "embeds": [embed] });

        // Only webhooks accept a per-message identity.
        if webhook {
            if let Some(username) = &self.config.username {
                payload["username"] = json!(username);
            }
            if let Some(avatar_url) = &self.config.avatar_url {
                payload["avatar_url"] = json!(avatar_url);
            }
        }

        payload
    }

    fn request(&self, target: &Target, payload: &serde_json::Value) -> Result<reqwest::RequestBuilder> {
        match target {
            Target::Webhook(url) => Ok(self.client.post(url).json(payload)),
            Target::Channel(id) => {
                let token = self
                    .token
                    .read()
                    .clone()
                    .ok_or_else(|| Error::notification("Discord bot token is not configured"))?;
                let url = format!(
                    "{}/channels/{}/messages",
                    self.config.api_base.trim_end_matches('/'),
                    id
                );
                Ok(self
                    .client
                    .post(url)
                    .header(reqwest::header::AUTHORIZATION, format!("Bot {token}"))
                    .json(payload))
            }
        }
    }

    /// Send with rate limit handling.
    async fn send_with_retry(&self, target: &Target, payload: &serde_json::Value) -> Result<()> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            let response = self
                .request(target, payload)?
                .send()
                .await
                .map_err(|e| Error::notification(format!("Discord request failed: {e}")))?;

            let status = response.status();

            if status.is_success() {
                return Ok(());
            }

            if status.as_u16() == 429 {
                let retry_after = parse_retry_after(response.headers());

                if attempts >= MAX_RATE_LIMIT_RETRIES {
                    warn!(
                        attempts,
                        retry_after = ?retry_after,
                        "Discord rate limit: max retries exceeded"
                    );
                    return Err(Error::notification(format!(
                        "Discord rate limit exceeded after {MAX_RATE_LIMIT_RETRIES} attempts"
                    )));
                }

                let wait_duration = retry_after.unwrap_or(Duration::from_secs(1));
                debug!(
                    wait = ?wait_duration,
                    attempt = attempts,
                    "Discord rate limited (429), waiting before retry"
                );
                tokio::time::sleep(wait_duration).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(Error::notification(format!(
                "Discord request failed: {status} - {body}"
            )));
        }
    }
}

/// Retry delay from a 429 response's headers.
fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    ["Retry-After", "X-RateLimit-Reset-After"]
        .into_iter()
        .filter_map(|name| headers.get(name))
        .filter_map(|value| value.to_str().ok()?.trim().parse::<f64>().ok())
        .find(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| {
            Duration::try_from_secs_f64(secs)
                .unwrap_or(MAX_RETRY_AFTER)
                .min(MAX_RETRY_AFTER)
        })
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn channel_type(&self) -> &'static str {
        "discord"
    }

    async fn notify(&self, destination: &str, event: &AlertEvent) -> Result<()> {
        let target = Target::parse(destination);
        let payload = self.build_payload(event, matches!(target, Target::Webhook(_)));
        self.send_with_retry(&target, &payload).await?;
        debug!(destination, nickname = event.nickname(), "Discord notification sent");
        Ok(())
    }
}
