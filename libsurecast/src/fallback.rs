//! Fallback handling for content the primary platform rejected
//!
//! The rejected content is always persisted as a new pending item, then
//! a copy is sent through the secondary channel (Telegram) so the audience
//! still sees it. Neither step raises: both results are reported.

use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::dispatcher::RetryingDispatcher;
use crate::error::DispatchError;
use crate::platforms::{truncate_chars, PlatformClient};
use crate::store::PendingStore;
use crate::types::{Action, Channel, Content, PendingItem};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PendingResult {
    Saved { location: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SecondaryResult {
    Delivered {
        channel: Channel,
        remote_id: Option<String>,
    },
    NotConfigured,
    Failed {
        channel: Channel,
        error: DispatchError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FallbackOutcome {
    pub pending: PendingResult,
    pub secondary: SecondaryResult,
}

/// Text sent through the secondary channel
pub fn fallback_message(content: &Content) -> String {
    if content.has_reply() {
        format!("{}\n\n{}", content.primary_text, content.reply_text)
    } else {
        content.primary_text.clone()
    }
}

pub struct FallbackRouter {
    dispatcher: RetryingDispatcher,
    pending: Arc<dyn PendingStore>,
    secondary: Option<Arc<dyn PlatformClient>>,
}

impl FallbackRouter {
    pub fn new(
        dispatcher: RetryingDispatcher,
        pending: Arc<dyn PendingStore>,
        secondary: Option<Arc<dyn PlatformClient>>,
    ) -> Self {
        Self {
            dispatcher,
            pending,
            secondary,
        }
    }

    pub async fn handle_failure(&self, content: &Content, failure_reason: &str) -> FallbackOutcome {
        let item = PendingItem::from_content(content, failure_reason);
        let pending = match self.pending.save(&item).await {
            Ok(location) => {
                info!("Saved unpublished {} content to {}", content.destination_channel, location);
                PendingResult::Saved { location }
            }
            Err(e) => {
                error!("Could not save pending content {}: {}", item.id, e);
                PendingResult::Failed {
                    error: e.to_string(),
                }
            }
        };

        let secondary = self.deliver(content).await;
        FallbackOutcome { pending, secondary }
    }

    async fn deliver(&self, content: &Content) -> SecondaryResult {
        let Some(client) = &self.secondary else {
            info!("No fallback channel configured");
            return SecondaryResult::NotConfigured;
        };
        let channel = client.channel();

        let text = truncate_chars(&fallback_message(content), client.character_limit());
        match self
            .dispatcher
            .dispatch(client.as_ref(), &Action::send_message(text))
            .await
        {
            Ok(report) => {
                info!("Fallback copy delivered via {}", channel);
                SecondaryResult::Delivered {
                    channel,
                    remote_id: report.remote_id,
                }
            }
            Err(error) => {
                warn!("Fallback delivery via {} failed: {}", channel, error);
                SecondaryResult::Failed { channel, error }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::RetryPolicy;
    use crate::platforms::mock::{MockPlatform, MockResponse};
    use crate::store::FilePendingStore;
    use tempfile::TempDir;

    fn router(dir: &TempDir, secondary: Option<&MockPlatform>) -> FallbackRouter {
        FallbackRouter::new(
            RetryingDispatcher::new(RetryPolicy::immediate(2)),
            Arc::new(FilePendingStore::new(dir.path().join("pending"))),
            secondary.map(|m| Arc::new(m.clone()) as Arc<dyn PlatformClient>),
        )
    }

    #[test]
    fn test_fallback_message_joins_reply() {
        let content = Content::new(Channel::Twitter, "Launch A", "More at X");
        assert_eq!(fallback_message(&content), "Launch A\n\nMore at X");

        let bare = Content::new(Channel::Twitter, "Launch A", "");
        assert_eq!(fallback_message(&bare), "Launch A");
    }

    #[tokio::test]
    async fn test_persists_and_delivers() {
        let temp_dir = TempDir::new().unwrap();
        let telegram = MockPlatform::new(Channel::Telegram);
        telegram.push_message(MockResponse::success("991"));

        let content = Content::new(Channel::Twitter, "Launch A", "More at X");
        let outcome = router(&temp_dir, Some(&telegram))
            .handle_failure(&content, "401 Unauthorized")
            .await;

        assert!(matches!(outcome.pending, PendingResult::Saved { .. }));
        assert_eq!(
            outcome.secondary,
            SecondaryResult::Delivered {
                channel: Channel::Telegram,
                remote_id: Some("991".to_string())
            }
        );
        assert_eq!(
            telegram.sent_texts("send_message"),
            vec!["Launch A\n\nMore at X".to_string()]
        );
    }

    #[tokio::test]
    async fn test_not_configured_still_persists() {
        let temp_dir = TempDir::new().unwrap();
        let content = Content::new(Channel::Twitter, "Launch A", "More at X");

        let outcome = router(&temp_dir, None)
            .handle_failure(&content, "401 Unauthorized")
            .await;

        assert_eq!(outcome.secondary, SecondaryResult::NotConfigured);
        let items = FilePendingStore::new(temp_dir.path().join("pending"))
            .list()
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].failure_reason, "401 Unauthorized");
        assert_eq!(items[0].reply_text, "More at X");
    }

    #[tokio::test]
    async fn test_secondary_failure_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let telegram = MockPlatform::new(Channel::Telegram);
        telegram.push_message(MockResponse::Unauthorized);

        let outcome = router(&temp_dir, Some(&telegram))
            .handle_failure(&Content::new(Channel::Twitter, "Launch A", ""), "403")
            .await;

        assert!(matches!(outcome.pending, PendingResult::Saved { .. }));
        assert!(matches!(
            outcome.secondary,
            SecondaryResult::Failed {
                error: DispatchError::TerminalRejection(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_pending_failure_does_not_block_delivery() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("pending");
        std::fs::write(&blocker, "not a directory").unwrap();
        let telegram = MockPlatform::new(Channel::Telegram);

        let outcome = router(&temp_dir, Some(&telegram))
            .handle_failure(&Content::new(Channel::Twitter, "Launch A", ""), "403")
            .await;

        assert!(matches!(outcome.pending, PendingResult::Failed { .. }));
        assert!(matches!(outcome.secondary, SecondaryResult::Delivered { .. }));
    }

    #[tokio::test]
    async fn test_message_truncated_to_secondary_limit() {
        let temp_dir = TempDir::new().unwrap();
        let telegram = MockPlatform::new(Channel::Telegram).with_limit(10);

        router(&temp_dir, Some(&telegram))
            .handle_failure(&Content::new(Channel::Twitter, "Launch Alpha Beta", ""), "403")
            .await;

        assert_eq!(telegram.sent_texts("send_message"), vec!["Launch Alp".to_string()]);
    }
}
