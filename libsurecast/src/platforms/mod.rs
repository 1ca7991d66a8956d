//! Platform client abstraction and implementations
//!
//! A platform client knows how to put one [`Action`] on the wire and how to
//! read the platform's answer. Retry, backoff and duplicate handling live in
//! the dispatcher; clients never retry on their own.
//!
//! # Examples
//!
//! ```no_run
//! use libsurecast::config::Config;
//! use libsurecast::platforms::create_clients;
//!
//! # fn example() -> libsurecast::error::Result<()> {
//! let config = Config::load()?;
//! let clients = create_clients(&config)?;
//! for (channel, client) in &clients.primary {
//!     println!("{} accepts up to {} characters", channel, client.character_limit());
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{DispatchError, Result};
use crate::types::{Action, Channel, Classification, RawResponse};

pub mod composio;
pub mod linkedin;
pub mod media;
pub mod telegram;
pub mod twitter;

// Available outside tests so integration tests can drive the pipeline
pub mod mock;

/// Outbound capability for one channel
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// The channel this client publishes to
    fn channel(&self) -> Channel;

    /// Maximum characters accepted for a single post or message
    fn character_limit(&self) -> usize {
        self.channel().character_limit()
    }

    /// Whether the platform can attach a reply to a created post
    fn supports_replies(&self) -> bool {
        true
    }

    /// Whether the client accepts [`ActionKind::UploadMedia`] actions
    ///
    /// [`ActionKind::UploadMedia`]: crate::types::ActionKind::UploadMedia
    fn supports_media(&self) -> bool {
        false
    }

    /// Send the action once
    ///
    /// # Errors
    ///
    /// Only transport-level failures are returned as errors (connection
    /// refused, timeouts). Any HTTP response, including 4xx and 5xx, is
    /// returned as `Ok` and judged by [`PlatformClient::classify`].
    async fn send(&self, action: &Action) -> std::result::Result<RawResponse, DispatchError>;

    /// Judge a raw response
    fn classify(&self, action: &Action, response: &RawResponse) -> Classification;
}

/// Fallback classification from HTTP status alone
pub fn classify_status(response: &RawResponse) -> Classification {
    match response.status {
        200..=299 => Classification::Success { remote_id: None },
        408 | 500..=599 => Classification::Retryable(format!(
            "HTTP {}: {}",
            response.status,
            truncate_chars(&response.body, 200)
        )),
        429 => Classification::RateLimited(format!(
            "HTTP 429: {}",
            truncate_chars(&response.body, 200)
        )),
        status => Classification::Terminal(format!(
            "HTTP {}: {}",
            status,
            truncate_chars(&response.body, 200)
        )),
    }
}

/// Map a reqwest failure onto the dispatch taxonomy
pub(crate) fn map_transport_error(context: &str, error: reqwest::Error) -> DispatchError {
    if error.is_builder() {
        DispatchError::TerminalRejection(format!("{} request could not be built: {}", context, error))
    } else {
        DispatchError::RetryableTransport(format!("{} request failed: {}", context, error))
    }
}

/// Read a response into a [`RawResponse`], treating a body read failure as transient
pub(crate) async fn read_response(
    context: &str,
    response: reqwest::Response,
) -> std::result::Result<RawResponse, DispatchError> {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|e| map_transport_error(context, e))?;
    debug!("{} responded with HTTP {}", context, status);
    Ok(RawResponse::new(status, body))
}

/// Truncate to at most `max` characters without splitting a code point
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Clients built from configuration
pub struct PlatformClients {
    /// Clients for primary publishing, one per enabled channel
    pub primary: HashMap<Channel, Arc<dyn PlatformClient>>,
    /// Client used by the fallback router, if configured
    pub secondary: Option<Arc<dyn PlatformClient>>,
}

/// Create platform clients for all enabled channels
///
/// # Errors
///
/// Returns an error if an enabled channel is missing required settings or
/// an HTTP client cannot be constructed.
pub fn create_clients(config: &Config) -> Result<PlatformClients> {
    let mut primary: HashMap<Channel, Arc<dyn PlatformClient>> = HashMap::new();
    let mut secondary: Option<Arc<dyn PlatformClient>> = None;

    let gateway = match &config.composio {
        Some(composio) => Some(composio::ComposioGateway::from_config(composio)?),
        None => None,
    };

    if let (Some(twitter), Some(gateway)) = (&config.twitter, &gateway) {
        if twitter.enabled {
            info!("Creating Twitter client");
            primary.insert(
                Channel::Twitter,
                Arc::new(twitter::TwitterClient::new(
                    gateway.clone(),
                    twitter.connected_account_id.clone(),
                )),
            );
        }
    }

    if let (Some(linkedin), Some(gateway)) = (&config.linkedin, &gateway) {
        if linkedin.enabled {
            info!("Creating LinkedIn client");
            primary.insert(
                Channel::LinkedIn,
                Arc::new(linkedin::LinkedInClient::new(
                    gateway.clone(),
                    linkedin.connected_account_id.clone(),
                    linkedin.visibility.clone(),
                )),
            );
        }
    }

    if let Some(telegram) = &config.telegram {
        if telegram.enabled {
            if let Some(chat_id) = &telegram.chat_id {
                info!("Creating Telegram client for chat {}", chat_id);
                primary.insert(
                    Channel::Telegram,
                    Arc::new(telegram::TelegramClient::from_config(telegram, chat_id)?),
                );
            }
            if let Some(fallback_chat) = &telegram.fallback_chat {
                info!("Telegram fallback delivery enabled for {}", fallback_chat);
                secondary = Some(Arc::new(telegram::TelegramClient::from_config(
                    telegram,
                    fallback_chat,
                )?));
            }
        }
    }

    if primary.is_empty() {
        warn!("No platforms are enabled in configuration");
    } else {
        info!("Created {} platform client(s)", primary.len());
    }

    Ok(PlatformClients { primary, secondary })
}
