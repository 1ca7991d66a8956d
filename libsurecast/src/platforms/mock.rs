//! Scriptable mock platform for testing
//!
//! Responses are queued per action kind and consumed in order. When a queue
//! runs dry the mock succeeds with a generated id (`mock-1`, `mock-2`, ...).
//! Every sent action is recorded so tests can assert on exactly what went
//! over the wire. Clones share state, so a test can keep a handle while the
//! pipeline owns another.

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::DispatchError;
use crate::platforms::{classify_status, PlatformClient};
use crate::types::{Action, ActionKind, Channel, Classification, RawResponse};

/// One scripted platform answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockResponse {
    /// Accepted, optionally with a remote id
    Success(Option<String>),
    /// HTTP 403 mentioning duplicate content
    Duplicate,
    /// HTTP 429
    RateLimited,
    /// HTTP 503
    ServerError,
    /// HTTP 401
    Unauthorized,
    /// Connection failure before any response
    Transport,
}

impl MockResponse {
    pub fn success(id: &str) -> Self {
        MockResponse::Success(Some(id.to_string()))
    }
}

#[derive(Debug, Default)]
struct MockState {
    creates: VecDeque<MockResponse>,
    replies: VecDeque<MockResponse>,
    messages: VecDeque<MockResponse>,
    uploads: VecDeque<MockResponse>,
    sent: Vec<Action>,
    next_id: u64,
}

#[derive(Debug, Clone)]
pub struct MockPlatform {
    channel: Channel,
    limit: Option<usize>,
    replies_supported: bool,
    media_supported: bool,
    state: Arc<Mutex<MockState>>,
}

impl MockPlatform {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            limit: None,
            replies_supported: true,
            media_supported: false,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Override the channel's character limit
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn without_replies(mut self) -> Self {
        self.replies_supported = false;
        self
    }

    pub fn with_media(mut self) -> Self {
        self.media_supported = true;
        self
    }

    pub fn push_create(&self, response: MockResponse) -> &Self {
        self.state().creates.push_back(response);
        self
    }

    pub fn push_reply(&self, response: MockResponse) -> &Self {
        self.state().replies.push_back(response);
        self
    }

    pub fn push_message(&self, response: MockResponse) -> &Self {
        self.state().messages.push_back(response);
        self
    }

    pub fn push_upload(&self, response: MockResponse) -> &Self {
        self.state().uploads.push_back(response);
        self
    }

    /// All actions sent so far, in order
    pub fn sent(&self) -> Vec<Action> {
        self.state().sent.clone()
    }

    /// Texts of sent actions of one kind
    pub fn sent_texts(&self, label: &str) -> Vec<String> {
        self.state()
            .sent
            .iter()
            .filter(|a| a.label() == label)
            .map(|a| a.text.clone())
            .collect()
    }

    pub fn create_count(&self) -> usize {
        self.sent_texts("create").len()
    }

    pub fn reply_count(&self) -> usize {
        self.sent_texts("reply").len()
    }

    pub fn message_count(&self) -> usize {
        self.sent_texts("send_message").len()
    }

    /// Base64 payloads of sent uploads
    pub fn uploaded_media(&self) -> Vec<String> {
        self.state()
            .sent
            .iter()
            .filter_map(|a| match &a.kind {
                ActionKind::UploadMedia { media_data } => Some(media_data.clone()),
                _ => None,
            })
            .collect()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // Poisoning from a panicked test is ignored
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PlatformClient for MockPlatform {
    fn channel(&self) -> Channel {
        self.channel
    }

    fn character_limit(&self) -> usize {
        self.limit
            .unwrap_or_else(|| self.channel.character_limit())
    }

    fn supports_replies(&self) -> bool {
        self.replies_supported
    }

    fn supports_media(&self) -> bool {
        self.media_supported
    }

    async fn send(&self, action: &Action) -> Result<RawResponse, DispatchError> {
        let mut state = self.state();
        state.sent.push(action.clone());

        let scripted = match action.kind {
            ActionKind::Create => state.creates.pop_front(),
            ActionKind::Reply { .. } => state.replies.pop_front(),
            ActionKind::SendMessage => state.messages.pop_front(),
            ActionKind::UploadMedia { .. } => state.uploads.pop_front(),
        };
        let scripted = match scripted {
            Some(response) => response,
            None => {
                state.next_id += 1;
                MockResponse::Success(Some(format!("mock-{}", state.next_id)))
            }
        };

        match scripted {
            MockResponse::Success(Some(id)) => Ok(RawResponse::new(
                200,
                json!({"data": {"id": id}}).to_string(),
            )),
            MockResponse::Success(None) => Ok(RawResponse::new(200, "{}")),
            MockResponse::Duplicate => Ok(RawResponse::new(
                403,
                json!({"error": "You are not allowed to create a Tweet with duplicate content."})
                    .to_string(),
            )),
            MockResponse::RateLimited => Ok(RawResponse::new(429, "Too Many Requests")),
            MockResponse::ServerError => Ok(RawResponse::new(503, "Service Unavailable")),
            MockResponse::Unauthorized => Ok(RawResponse::new(401, "Unauthorized")),
            MockResponse::Transport => Err(DispatchError::RetryableTransport(
                "mock connection refused".to_string(),
            )),
        }
    }

    fn classify(&self, _action: &Action, response: &RawResponse) -> Classification {
        if response.status == 403 && response.body.contains("duplicate") {
            return Classification::Duplicate(response.body.clone());
        }
        match classify_status(response) {
            Classification::Success { .. } => Classification::Success {
                remote_id: response
                    .json()
                    .and_then(|body| body.pointer("/data/id").cloned())
                    .and_then(|id| id.as_str().map(str::to_string)),
            },
            other => other,
        }
    }
}
