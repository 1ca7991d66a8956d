//! Telegram Bot API client
//!
//! Used both as a primary channel and as the secondary channel that
//! receives fallback copies of posts another platform rejected.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::TelegramConfig;
use crate::error::{ConfigError, DispatchError, Result};
use crate::platforms::{classify_status, map_transport_error, read_response, PlatformClient};
use crate::types::{Action, ActionKind, Channel, Classification, RawResponse};

const API_BASE_URL: &str = "https://api.telegram.org";

pub struct TelegramClient {
    client: reqwest::Client,
    bot_token: SecretString,
    chat_id: String,
    base_url: String,
}

impl TelegramClient {
    pub fn new(bot_token: String, chat_id: String, base_url: Option<String>) -> Result<Self> {
        if bot_token.trim().is_empty() {
            return Err(ConfigError::MissingField("telegram.bot_token".to_string()).into());
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "telegram".to_string(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            bot_token: SecretString::from(bot_token),
            chat_id,
            base_url: base_url
                .unwrap_or_else(|| API_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }

    /// Build a client that posts to `chat`
    pub fn from_config(config: &TelegramConfig, chat: &str) -> Result<Self> {
        Self::new(
            config.bot_token.clone(),
            chat.to_string(),
            config.base_url.clone(),
        )
    }
}

#[async_trait]
impl PlatformClient for TelegramClient {
    fn channel(&self) -> Channel {
        Channel::Telegram
    }

    async fn send(&self, action: &Action) -> std::result::Result<RawResponse, DispatchError> {
        let mut payload = json!({
            "chat_id": self.chat_id,
            "text": action.text,
        });

        if let ActionKind::Reply { in_reply_to } = &action.kind {
            let message_id: i64 = in_reply_to.parse().map_err(|_| {
                DispatchError::TerminalRejection(format!(
                    "Telegram message id '{}' is not numeric",
                    in_reply_to
                ))
            })?;
            payload["reply_parameters"] = json!({ "message_id": message_id });
        }

        let url = format!(
            "{}/bot{}/sendMessage",
            self.base_url,
            self.bot_token.expose_secret()
        );

        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            // reqwest includes the URL in its errors, which carries the token
            .map_err(|e| map_transport_error("sendMessage", e.without_url()))?;

        read_response("sendMessage", response).await
    }

    fn classify(&self, _action: &Action, response: &RawResponse) -> Classification {
        let body = response.json();
        let ok = body
            .as_ref()
            .and_then(|b| b.get("ok"))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        if response.is_success_status() && ok {
            let remote_id = body
                .as_ref()
                .and_then(|b| b.pointer("/result/message_id"))
                .and_then(Value::as_i64)
                .map(|id| id.to_string());
            return Classification::Success { remote_id };
        }

        let description = body
            .as_ref()
            .and_then(|b| b.get("description"))
            .and_then(Value::as_str)
            .map(str::to_string);

        match (classify_status(response), description) {
            (Classification::RateLimited(_), Some(d)) => Classification::RateLimited(d),
            (Classification::Retryable(_), Some(d)) => Classification::Retryable(d),
            (Classification::Success { .. }, d) => Classification::Terminal(
                d.unwrap_or_else(|| "Telegram returned ok=false".to_string()),
            ),
            (_, Some(d)) => Classification::Terminal(d),
            (other, None) => other,
        }
    }
}
