//! Firecrawl scrape client

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::ResearchConfig;
use crate::error::{ConfigError, DispatchError, Result};
use crate::platforms::{classify_status, map_transport_error, read_response, truncate_chars};
use crate::research::batch::{FetchedPage, ResearchFetcher};
use crate::types::{Classification, RawResponse};

const API_BASE_URL: &str = "https://api.firecrawl.dev";

/// Accept Firecrawl's own cached copy of a page up to an hour old
const MAX_AGE_MS: u64 = 3_600_000;

pub struct FirecrawlFetcher {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
}

impl FirecrawlFetcher {
    pub fn new(api_key: String, base_url: Option<String>) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(ConfigError::MissingField("research.firecrawl_api_key".to_string()).into());
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "research".to_string(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key: SecretString::from(api_key),
            base_url: base_url
                .unwrap_or_else(|| API_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }

    pub fn from_config(config: &ResearchConfig) -> Result<Self> {
        Self::new(config.firecrawl_api_key.clone(), config.base_url.clone())
    }
}

/// Turn a scrape response into a page or a typed failure
fn interpret(response: &RawResponse) -> std::result::Result<FetchedPage, DispatchError> {
    let body = response.json();
    let error_text = body
        .as_ref()
        .and_then(|b| b.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| truncate_chars(&response.body, 200));

    if response.status == 429 || response.body.to_lowercase().contains("rate limit") {
        return Err(DispatchError::RateLimited(error_text));
    }

    match classify_status(response) {
        Classification::Success { .. } => {}
        Classification::Retryable(_) => return Err(DispatchError::RetryableTransport(error_text)),
        _ => return Err(DispatchError::TerminalRejection(error_text)),
    }

    let body = body.ok_or_else(|| {
        DispatchError::TerminalRejection("Firecrawl returned a non-JSON body".to_string())
    })?;
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(DispatchError::TerminalRejection(error_text));
    }

    let data = body.get("data").unwrap_or(&Value::Null);
    Ok(FetchedPage {
        title: data
            .pointer("/metadata/title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        content: data
            .get("markdown")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

#[async_trait]
impl ResearchFetcher for FirecrawlFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<FetchedPage, DispatchError> {
        let payload = json!({
            "url": url,
            "formats": ["markdown"],
            "maxAge": MAX_AGE_MS,
        });

        let response = self
            .client
            .post(format!("{}/v1/scrape", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| map_transport_error("scrape", e))?;

        let raw = read_response("scrape", response).await?;
        interpret(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_scrape_returns_title_and_markdown() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/scrape"))
            .and(header("authorization", "Bearer fc_test"))
            .and(body_partial_json(json!({
                "url": "https://yieldbot.cc",
                "formats": ["markdown"],
                "maxAge": 3600000
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {
                    "markdown": "# Yieldbot\nDaily yields",
                    "metadata": {"title": "Yieldbot", "statusCode": 200}
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = FirecrawlFetcher::new("fc_test".to_string(), Some(server.uri())).unwrap();
        let page = fetcher.fetch("https://yieldbot.cc").await.unwrap();
        assert_eq!(page.title, "Yieldbot");
        assert_eq!(page.content, "# Yieldbot\nDaily yields");
    }

    #[tokio::test]
    async fn test_rate_limit_is_typed() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "success": false,
                "error": "Rate limit exceeded. Consumed 10/10 requests"
            })))
            .mount(&server)
            .await;

        let fetcher = FirecrawlFetcher::new("fc_test".to_string(), Some(server.uri())).unwrap();
        let err = fetcher.fetch("https://yieldbot.cc").await.unwrap_err();
        assert!(matches!(err, DispatchError::RateLimited(msg) if msg.contains("Consumed")));
    }

    #[test]
    fn test_interpret_failures() {
        assert!(matches!(
            interpret(&RawResponse::new(502, "Bad Gateway")),
            Err(DispatchError::RetryableTransport(_))
        ));
        assert!(matches!(
            interpret(&RawResponse::new(402, r#"{"error": "Payment required"}"#)),
            Err(DispatchError::TerminalRejection(msg)) if msg == "Payment required"
        ));
        assert!(matches!(
            interpret(&RawResponse::new(200, r#"{"success": false, "error": "blocked"}"#)),
            Err(DispatchError::TerminalRejection(_))
        ));
    }

    #[test]
    fn test_missing_key_is_rejected() {
        assert!(FirecrawlFetcher::new("  ".to_string(), None).is_err());
    }
}
