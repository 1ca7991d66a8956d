//! Twitter client over the Composio gateway

use async_trait::async_trait;
use serde_json::json;

use crate::error::DispatchError;
use crate::platforms::composio::{self, ComposioGateway};
use crate::platforms::PlatformClient;
use crate::types::{Action, ActionKind, Channel, Classification, RawResponse};

const CREATE_POST_TOOL: &str = "TWITTER_CREATION_OF_A_POST";
const UPLOAD_MEDIA_TOOL: &str = "TWITTER_UPLOAD_MEDIA";

/// Twitter signals duplicate content with 403 Forbidden
const DUPLICATE_STATUSES: &[u16] = &[403];

pub struct TwitterClient {
    gateway: ComposioGateway,
    connected_account_id: String,
}

impl TwitterClient {
    pub fn new(gateway: ComposioGateway, connected_account_id: String) -> Self {
        Self {
            gateway,
            connected_account_id,
        }
    }
}

#[async_trait]
impl PlatformClient for TwitterClient {
    fn channel(&self) -> Channel {
        Channel::Twitter
    }

    fn supports_media(&self) -> bool {
        true
    }

    async fn send(&self, action: &Action) -> Result<RawResponse, DispatchError> {
        if let ActionKind::UploadMedia { media_data } = &action.kind {
            let arguments = json!({
                "media_data": media_data,
                "media_category": "tweet_image",
            });
            return self
                .gateway
                .execute(UPLOAD_MEDIA_TOOL, &self.connected_account_id, arguments)
                .await;
        }

        let mut arguments = json!({
            "text": action.text,
            "for_super_followers_only": false,
            "nullcast": false,
        });

        if let ActionKind::Reply { in_reply_to } = &action.kind {
            arguments["reply"] = json!({ "in_reply_to_tweet_id": in_reply_to });
        }
        if let Some(media_id) = &action.attachment_ref {
            arguments["media_media_ids"] = json!([media_id]);
        }

        self.gateway
            .execute(CREATE_POST_TOOL, &self.connected_account_id, arguments)
            .await
    }

    fn classify(&self, action: &Action, response: &RawResponse) -> Classification {
        if let ActionKind::UploadMedia { .. } = action.kind {
            return match composio::classify(response, &[]) {
                Classification::Success { .. } => Classification::Success {
                    remote_id: response
                        .json()
                        .and_then(|body| composio::extract_field(&body, "media_id_string")),
                },
                other => other,
            };
        }
        composio::classify(response, DUPLICATE_STATUSES)
    }
}
