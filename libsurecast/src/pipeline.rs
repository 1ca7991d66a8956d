//! The publish entry point
//!
//! [`PublishPipeline::publish`] runs the create-then-reply sequence and,
//! when the create step fails for good, hands the content to the fallback
//! router. It never returns an error: every result is described by the
//! [`Outcome`].
//!
//! # Examples
//!
//! ```no_run
//! use libsurecast::config::Config;
//! use libsurecast::pipeline::PublishPipeline;
//! use libsurecast::types::{Channel, Content};
//!
//! # async fn example() -> libsurecast::error::Result<()> {
//! let config = Config::load()?;
//! let pipeline = PublishPipeline::from_config(&config).await?;
//! let outcome = pipeline
//!     .publish(&Content::new(Channel::Twitter, "Launch A", "More at X"))
//!     .await;
//! println!("{}", serde_json::to_string_pretty(&outcome).unwrap_or_default());
//! # Ok(())
//! # }
//! ```

use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::dispatcher::RetryingDispatcher;
use crate::error::{DispatchError, Result};
use crate::fallback::{FallbackOutcome, FallbackRouter};
use crate::platforms::{create_clients, media};
use crate::sequencer::{PublishSequencer, SequenceOutcome, StepResult};
use crate::store;
use crate::types::{Channel, Content};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// The primary post is live; the reply may have failed or been skipped
    Published {
        channel: Channel,
        create: StepResult,
        reply: StepResult,
    },
    /// The primary post failed and the content went to the fallback path
    FellBack {
        channel: Channel,
        reason: DispatchError,
        fallback: FallbackOutcome,
    },
}

impl Outcome {
    pub fn is_published(&self) -> bool {
        matches!(self, Outcome::Published { .. })
    }

    /// Process exit status for this outcome
    ///
    /// 0 when published (even with a failed reply), 2 when the platform
    /// rejected the post for good, 1 for any other failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Published { .. } => 0,
            Outcome::FellBack {
                reason: DispatchError::TerminalRejection(_),
                ..
            } => 2,
            Outcome::FellBack { .. } => 1,
        }
    }
}

pub struct PublishPipeline {
    sequencer: PublishSequencer,
    fallback: FallbackRouter,
}

impl PublishPipeline {
    pub fn new(sequencer: PublishSequencer, fallback: FallbackRouter) -> Self {
        Self {
            sequencer,
            fallback,
        }
    }

    /// Wire stores, clients and retry policy from configuration
    pub async fn from_config(config: &Config) -> Result<Self> {
        let stores = store::open(&config.storage).await?;
        let clients = create_clients(config)?;
        let dispatcher = RetryingDispatcher::new(config.retry.policy());

        let sequencer = PublishSequencer::new(dispatcher.clone(), stores.idempotency)
            .with_clients(clients.primary);
        let fallback = FallbackRouter::new(dispatcher, stores.pending, clients.secondary);

        Ok(Self::new(sequencer, fallback))
    }

    /// Upload the image at `image_url` to `channel` and return the media id
    ///
    /// The id goes into [`Content::with_attachment`] before publishing.
    pub async fn resolve_media(
        &self,
        channel: Channel,
        image_url: &str,
    ) -> std::result::Result<String, DispatchError> {
        let client = self.sequencer.client(channel).ok_or_else(|| {
            DispatchError::TerminalRejection(format!("no client configured for {}", channel))
        })?;
        media::upload_media(self.sequencer.dispatcher(), client.as_ref(), image_url).await
    }

    pub async fn publish(&self, content: &Content) -> Outcome {
        let channel = content.destination_channel;

        match self.sequencer.publish_and_reply(content).await {
            SequenceOutcome::Completed { create, reply } => {
                info!("Publish to {} completed", channel);
                Outcome::Published {
                    channel,
                    create,
                    reply,
                }
            }
            SequenceOutcome::CreateFailed { reason } => {
                warn!("Publish to {} failed, falling back: {}", channel, reason);
                let fallback = self
                    .fallback
                    .handle_failure(content, &reason.to_string())
                    .await;
                Outcome::FellBack {
                    channel,
                    reason,
                    fallback,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::RetryPolicy;
    use crate::fallback::{PendingResult, SecondaryResult};
    use crate::platforms::mock::{MockPlatform, MockResponse};
    use crate::store::{FilePendingStore, JsonFileStore};
    use std::sync::Arc;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_resolved_media_is_attached_to_create() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/banner.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png-bytes".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let twitter = MockPlatform::new(Channel::Twitter).with_media();
        twitter
            .push_upload(MockResponse::success("m-77"))
            .push_create(MockResponse::success("42"));

        let dispatcher = RetryingDispatcher::new(RetryPolicy::immediate(1));
        let sequencer =
            PublishSequencer::new(dispatcher.clone(), Arc::new(JsonFileStore::new(temp_dir.path())))
                .with_client(Arc::new(twitter.clone()));
        let fallback = FallbackRouter::new(
            dispatcher,
            Arc::new(FilePendingStore::new(temp_dir.path().join("pending"))),
            None,
        );
        let pipeline = PublishPipeline::new(sequencer, fallback);

        let media_id = pipeline
            .resolve_media(Channel::Twitter, &format!("{}/banner.png", server.uri()))
            .await
            .unwrap();
        assert_eq!(media_id, "m-77");

        let content = Content::new(Channel::Twitter, "Launch A", "").with_attachment(media_id);
        assert!(pipeline.publish(&content).await.is_published());

        let sent = twitter.sent();
        assert_eq!(sent[0].label(), "upload_media");
        assert_eq!(sent[1].label(), "create");
        assert_eq!(sent[1].attachment_ref.as_deref(), Some("m-77"));
    }

    #[tokio::test]
    async fn test_resolve_media_without_client_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let dispatcher = RetryingDispatcher::default();
        let pipeline = PublishPipeline::new(
            PublishSequencer::new(dispatcher.clone(), Arc::new(JsonFileStore::new(temp_dir.path()))),
            FallbackRouter::new(
                dispatcher,
                Arc::new(FilePendingStore::new(temp_dir.path().join("pending"))),
                None,
            ),
        );

        let err = pipeline
            .resolve_media(Channel::LinkedIn, "http://127.0.0.1:9/banner.png")
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::TerminalRejection(msg) if msg.contains("linkedin")));
    }

    #[test]
    fn test_exit_codes() {
        let published = Outcome::Published {
            channel: Channel::Twitter,
            create: StepResult::Reused {
                remote_id: "42".to_string(),
            },
            reply: StepResult::Failed {
                error: DispatchError::RetryableTransport("503".to_string()),
            },
        };
        assert_eq!(published.exit_code(), 0);
        assert!(published.is_published());

        let fallback = FallbackOutcome {
            pending: PendingResult::Saved {
                location: "/tmp/p.json".to_string(),
            },
            secondary: SecondaryResult::NotConfigured,
        };
        let rejected = Outcome::FellBack {
            channel: Channel::Twitter,
            reason: DispatchError::TerminalRejection("401".to_string()),
            fallback: fallback.clone(),
        };
        assert_eq!(rejected.exit_code(), 2);

        let exhausted = Outcome::FellBack {
            channel: Channel::Twitter,
            reason: DispatchError::RateLimited("429".to_string()),
            fallback,
        };
        assert_eq!(exhausted.exit_code(), 1);
    }

    #[test]
    fn test_outcome_serializes_with_tags() {
        let outcome = Outcome::Published {
            channel: Channel::Twitter,
            create: StepResult::Success {
                remote_id: Some("42".to_string()),
                attempts: 1,
                mutated: false,
            },
            reply: StepResult::Skipped {
                reason: "no reply text".to_string(),
            },
        };

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "published");
        assert_eq!(json["channel"], "twitter");
        assert_eq!(json["create"]["status"], "success");
        assert_eq!(json["create"]["remote_id"], "42");
        assert_eq!(json["reply"]["status"], "skipped");
    }
}
