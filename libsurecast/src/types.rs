//! Core types for Surecast

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::str::FromStr;

/// A destination platform
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Twitter,
    Telegram,
    LinkedIn,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Twitter => "twitter",
            Channel::Telegram => "telegram",
            Channel::LinkedIn => "linkedin",
        }
    }

    /// Default character limit for primary posts on this channel
    pub fn character_limit(&self) -> usize {
        match self {
            Channel::Twitter => 280,
            Channel::Telegram => 4096,
            Channel::LinkedIn => 3000,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "twitter" | "x" => Ok(Channel::Twitter),
            "telegram" => Ok(Channel::Telegram),
            "linkedin" => Ok(Channel::LinkedIn),
            _ => Err(format!(
                "Invalid channel: '{}'. Valid options: twitter, telegram, linkedin",
                s
            )),
        }
    }
}

/// A finished content payload handed to the pipeline
///
/// Length limits and content rules are enforced by the caller before the
/// item reaches the pipeline. An empty `reply_text` means no reply is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub primary_text: String,
    pub attachment_ref: Option<String>,
    pub reply_text: String,
    pub destination_channel: Channel,
}

impl Content {
    pub fn new(
        destination_channel: Channel,
        primary_text: impl Into<String>,
        reply_text: impl Into<String>,
    ) -> Self {
        Self {
            primary_text: primary_text.into(),
            attachment_ref: None,
            reply_text: reply_text.into(),
            destination_channel,
        }
    }

    /// Attach a media id obtained from a platform upload
    pub fn with_attachment(mut self, media_id: impl Into<String>) -> Self {
        self.attachment_ref = Some(media_id.into());
        self
    }

    pub fn has_reply(&self) -> bool {
        !self.reply_text.trim().is_empty()
    }
}

/// The last successfully published primary post on a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRecord {
    pub channel: Channel,
    /// Verbatim primary text; idempotency checks compare this exactly
    pub text: String,
    /// SHA-256 of `text`, hex encoded. Informational only.
    pub content_hash: String,
    pub remote_id: String,
    pub published_at: DateTime<Utc>,
}

impl PublishRecord {
    pub fn new(channel: Channel, text: impl Into<String>, remote_id: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            channel,
            content_hash: content_hash(&text),
            text,
            remote_id: remote_id.into(),
            published_at: Utc::now(),
        }
    }

    /// Whether this record can stand in for a create of `text`
    pub fn matches(&self, text: &str) -> bool {
        !self.remote_id.is_empty() && self.text == text
    }
}

/// Hex-encoded SHA-256 of the given text
pub fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// Content that could not be published, kept for manual recovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingItem {
    pub id: String,
    pub channel: Channel,
    pub primary_text: String,
    pub reply_text: String,
    pub failure_reason: String,
    pub created_at: DateTime<Utc>,
}

impl PendingItem {
    pub fn from_content(content: &Content, failure_reason: impl Into<String>) -> Self {
        let created_at = Utc::now();
        Self {
            id: format!(
                "pending_{}_{}",
                content.destination_channel,
                created_at.format("%Y%m%d_%H%M%S_%6f")
            ),
            channel: content.destination_channel,
            primary_text: content.primary_text.clone(),
            reply_text: content.reply_text.clone(),
            failure_reason: failure_reason.into(),
            created_at,
        }
    }
}

/// One source's contribution to a research batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceResult {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceResult {
    pub fn ok(url: impl Into<String>, title: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            snippet: snippet.into(),
            error: None,
        }
    }

    pub fn failed(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: String::new(),
            snippet: String::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// A day's consolidated research results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub date_key: String,
    pub fetched_at: DateTime<Utc>,
    pub results: Vec<SourceResult>,
}

/// What an outbound action asks the platform to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    /// Create a primary post
    Create,
    /// Reply to an existing post
    Reply { in_reply_to: String },
    /// Deliver a standalone message (fallback notifications)
    SendMessage,
    /// Upload base64-encoded media; the remote id is the media id
    UploadMedia { media_data: String },
}

/// A single outbound platform call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub kind: ActionKind,
    pub text: String,
    pub attachment_ref: Option<String>,
}

impl Action {
    pub fn create(text: impl Into<String>, attachment_ref: Option<String>) -> Self {
        Self {
            kind: ActionKind::Create,
            text: text.into(),
            attachment_ref,
        }
    }

    pub fn reply(in_reply_to: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Reply {
                in_reply_to: in_reply_to.into(),
            },
            text: text.into(),
            attachment_ref: None,
        }
    }

    pub fn send_message(text: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::SendMessage,
            text: text.into(),
            attachment_ref: None,
        }
    }

    pub fn upload_media(media_data: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::UploadMedia {
                media_data: media_data.into(),
            },
            text: String::new(),
            attachment_ref: None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self.kind {
            ActionKind::Create => "create",
            ActionKind::Reply { .. } => "reply",
            ActionKind::SendMessage => "send_message",
            ActionKind::UploadMedia { .. } => "upload_media",
        }
    }
}

/// Raw HTTP response as seen by a platform client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.body).ok()
    }

    pub fn is_success_status(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A platform's verdict on a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Accepted; carries the remote id when the platform returned one
    Success { remote_id: Option<String> },
    /// Rejected because identical content already exists
    Duplicate(String),
    /// Explicit rate-limit signal
    RateLimited(String),
    /// Network-level or 5xx failure worth retrying unchanged
    Retryable(String),
    /// Rejected for good (auth, validation, unknown 4xx)
    Terminal(String),
}
