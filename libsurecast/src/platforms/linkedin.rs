//! LinkedIn client over the Composio gateway
//!
//! Posting needs the author URN of the connected profile. It is looked up
//! once per client and reused for later posts.

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::DispatchError;
use crate::platforms::composio::{self, ComposioGateway};
use crate::platforms::PlatformClient;
use crate::types::{Action, Channel, Classification, RawResponse};

const GET_MY_INFO_TOOL: &str = "LINKEDIN_GET_MY_INFO";
const CREATE_POST_TOOL: &str = "LINKEDIN_CREATE_LINKED_IN_POST";

/// LinkedIn answers a repeated post with 409 or 422 and a DUPLICATE_POST code
const DUPLICATE_STATUSES: &[u16] = &[409, 422];

pub struct LinkedInClient {
    gateway: ComposioGateway,
    connected_account_id: String,
    visibility: String,
    author_urn: OnceCell<String>,
}

impl LinkedInClient {
    pub fn new(gateway: ComposioGateway, connected_account_id: String, visibility: String) -> Self {
        Self {
            gateway,
            connected_account_id,
            visibility,
            author_urn: OnceCell::new(),
        }
    }

    async fn author_urn(&self) -> Result<&str, DispatchError> {
        let urn = self
            .author_urn
            .get_or_try_init(|| async {
                let response = self
                    .gateway
                    .execute(GET_MY_INFO_TOOL, &self.connected_account_id, json!({}))
                    .await?;

                match composio::classify(&response, &[]) {
                    Classification::Success {
                        remote_id: Some(urn),
                    } => {
                        debug!("Resolved LinkedIn author URN {}", urn);
                        Ok(urn)
                    }
                    Classification::Success { remote_id: None } => {
                        Err(DispatchError::TerminalRejection(
                            "LinkedIn profile response did not include an author id".to_string(),
                        ))
                    }
                    Classification::RateLimited(msg) => Err(DispatchError::RateLimited(msg)),
                    Classification::Retryable(msg) => Err(DispatchError::RetryableTransport(msg)),
                    Classification::Duplicate(msg) | Classification::Terminal(msg) => Err(
                        DispatchError::TerminalRejection(format!("LinkedIn profile lookup failed: {}", msg)),
                    ),
                }
            })
            .await?;
        Ok(urn.as_str())
    }
}

#[async_trait]
impl PlatformClient for LinkedInClient {
    fn channel(&self) -> Channel {
        Channel::LinkedIn
    }

    fn supports_replies(&self) -> bool {
        false
    }

    async fn send(&self, action: &Action) -> Result<RawResponse, DispatchError> {
        let author = self.author_urn().await?;

        let arguments = json!({
            "author": author,
            "commentary": action.text,
            "visibility": self.visibility,
            "lifecycleState": "PUBLISHED",
            "feedDistribution": "MAIN_FEED",
            "isReshareDisabledByAuthor": false,
        });

        self.gateway
            .execute(CREATE_POST_TOOL, &self.connected_account_id, arguments)
            .await
    }

    fn classify(&self, _action: &Action, response: &RawResponse) -> Classification {
        composio::classify(response, DUPLICATE_STATUSES)
    }
}
