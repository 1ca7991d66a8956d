//! Composio tool-execution gateway
//!
//! Twitter and LinkedIn are reached through Composio's v3 `tools/execute`
//! endpoint. Every call has the same envelope: the tool name, the connected
//! account that owns the platform credentials, and tool arguments. Responses
//! carry `successful`, `data` and `error` fields.

use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::ComposioConfig;
use crate::error::{ConfigError, DispatchError, Result};
use crate::platforms::{classify_status, map_transport_error, read_response, truncate_chars};
use crate::types::{Classification, RawResponse};

const API_BASE_URL: &str = "https://backend.composio.dev/api/v3/tools/execute";

#[derive(Clone)]
pub struct ComposioGateway {
    client: reqwest::Client,
    api_key: SecretString,
    user_id: String,
    base_url: String,
}

impl std::fmt::Debug for ComposioGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposioGateway")
            .field("user_id", &self.user_id)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ComposioGateway {
    pub fn new(api_key: String, user_id: String, base_url: Option<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "composio".to_string(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key: SecretString::from(api_key),
            user_id,
            base_url: base_url
                .unwrap_or_else(|| API_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }

    pub fn from_config(config: &ComposioConfig) -> Result<Self> {
        Self::new(
            config.api_key.clone(),
            config.user_id.clone(),
            config.base_url.clone(),
        )
    }

    /// Execute one tool call on behalf of a connected account
    pub async fn execute(
        &self,
        tool: &str,
        connected_account_id: &str,
        arguments: Value,
    ) -> std::result::Result<RawResponse, DispatchError> {
        let payload = json!({
            "connected_account_id": connected_account_id,
            "user_id": self.user_id,
            "name": tool,
            "arguments": arguments,
        });

        let response = self
            .client
            .post(format!("{}/{}", self.base_url, tool))
            .header("x-api-key", self.api_key.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| map_transport_error(tool, e))?;

        read_response(tool, response).await
    }
}

/// Pull the created object's id out of a Composio `data` payload
///
/// The id shows up either as `data.id` or nested as `data.data.id`.
pub fn extract_id(body: &Value) -> Option<String> {
    extract_field(body, "id")
}

/// Pull `field` out of `data`, or out of `data.data`, as a non-empty string
pub fn extract_field(body: &Value, field: &str) -> Option<String> {
    let data = body.get("data")?;
    let id = data
        .get(field)
        .or_else(|| data.get("data").and_then(|inner| inner.get(field)))?;
    match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Classify a Composio response
///
/// `duplicate_statuses` lists the HTTP statuses on which the platform signals
/// duplicate content; the body must also mention "duplicate".
pub fn classify(response: &RawResponse, duplicate_statuses: &[u16]) -> Classification {
    let body = response.json();
    let successful = body
        .as_ref()
        .and_then(|b| b.get("successful"))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if response.is_success_status() && successful {
        return Classification::Success {
            remote_id: body.as_ref().and_then(extract_id),
        };
    }

    let error_text = body
        .as_ref()
        .and_then(|b| b.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| truncate_chars(&response.body, 200));
    let lowered = response.body.to_lowercase();

    if duplicate_statuses.contains(&response.status) && lowered.contains("duplicate") {
        return Classification::Duplicate(error_text);
    }
    if response.status == 429 || lowered.contains("rate limit") {
        return Classification::RateLimited(error_text);
    }
    if response.is_success_status() {
        // HTTP 200 with `successful: false`: the tool itself refused
        return Classification::Terminal(error_text);
    }

    match classify_status(response) {
        Classification::Retryable(_) => Classification::Retryable(error_text),
        _ => Classification::Terminal(error_text),
    }
}
