//! Create-then-reply sequencing
//!
//! A publish on a channel is two steps: create the primary post, then
//! attach a reply to it. The sequencer consults the [`IdempotencyStore`]
//! first, so content that is already live is never created twice, and
//! records a successful create before the reply is attempted. A failed
//! reply never undoes the create.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::dispatcher::{DispatchReport, RetryingDispatcher};
use crate::error::DispatchError;
use crate::platforms::PlatformClient;
use crate::store::IdempotencyStore;
use crate::types::{Action, Channel, Content, PublishRecord};

/// Result of one step of the sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepResult {
    /// The platform accepted the action
    Success {
        remote_id: Option<String>,
        attempts: u32,
        /// Set when the accepted text carries a uniqueness suffix
        mutated: bool,
    },
    /// The create was skipped because identical content is already live
    Reused { remote_id: String },
    /// The step was not attempted
    Skipped { reason: String },
    /// The step failed after retries
    Failed { error: DispatchError },
}

impl StepResult {
    pub fn is_success(&self) -> bool {
        matches!(self, StepResult::Success { .. } | StepResult::Reused { .. })
    }

    pub fn remote_id(&self) -> Option<&str> {
        match self {
            StepResult::Success { remote_id, .. } => remote_id.as_deref(),
            StepResult::Reused { remote_id } => Some(remote_id),
            _ => None,
        }
    }
}

impl From<DispatchReport> for StepResult {
    fn from(report: DispatchReport) -> Self {
        StepResult::Success {
            remote_id: report.remote_id,
            attempts: report.attempts,
            mutated: report.mutated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SequenceOutcome {
    /// The create step succeeded or was reused; the reply may still have failed
    Completed { create: StepResult, reply: StepResult },
    /// The create step failed for good
    CreateFailed { reason: DispatchError },
}

pub struct PublishSequencer {
    dispatcher: RetryingDispatcher,
    store: Arc<dyn IdempotencyStore>,
    clients: HashMap<Channel, Arc<dyn PlatformClient>>,
}

impl PublishSequencer {
    pub fn new(dispatcher: RetryingDispatcher, store: Arc<dyn IdempotencyStore>) -> Self {
        Self {
            dispatcher,
            store,
            clients: HashMap::new(),
        }
    }

    /// Register the client for its channel, replacing any previous one
    pub fn with_client(mut self, client: Arc<dyn PlatformClient>) -> Self {
        self.clients.insert(client.channel(), client);
        self
    }

    pub fn with_clients(
        mut self,
        clients: impl IntoIterator<Item = (Channel, Arc<dyn PlatformClient>)>,
    ) -> Self {
        self.clients.extend(clients);
        self
    }

    pub fn client(&self, channel: Channel) -> Option<&Arc<dyn PlatformClient>> {
        self.clients.get(&channel)
    }

    pub fn dispatcher(&self) -> &RetryingDispatcher {
        &self.dispatcher
    }

    /// Create the primary post (unless already live) and attach the reply
    pub async fn publish_and_reply(&self, content: &Content) -> SequenceOutcome {
        let channel = content.destination_channel;

        let Some(client) = self.clients.get(&channel) else {
            warn!("No client configured for {}", channel);
            return SequenceOutcome::CreateFailed {
                reason: DispatchError::TerminalRejection(format!(
                    "no client configured for {}",
                    channel
                )),
            };
        };

        let live = self
            .store
            .get_last(channel)
            .await
            .filter(|record| record.matches(&content.primary_text));

        let create = match live {
            Some(record) => {
                info!(
                    "Content already live on {} as {}, skipping create",
                    channel, record.remote_id
                );
                StepResult::Reused {
                    remote_id: record.remote_id,
                }
            }
            None => {
                let action =
                    Action::create(content.primary_text.clone(), content.attachment_ref.clone());
                match self.dispatcher.dispatch(client.as_ref(), &action).await {
                    Ok(report) => {
                        self.record_create(content, &report).await;
                        StepResult::from(report)
                    }
                    Err(reason) => {
                        warn!("Create on {} failed: {}", channel, reason);
                        return SequenceOutcome::CreateFailed { reason };
                    }
                }
            }
        };

        let reply = self.reply(client.as_ref(), content, &create).await;
        SequenceOutcome::Completed { create, reply }
    }

    async fn record_create(&self, content: &Content, report: &DispatchReport) {
        let channel = content.destination_channel;
        let Some(remote_id) = &report.remote_id else {
            warn!("{} accepted the post without returning an id, not recording it", channel);
            return;
        };

        // Record the caller's text, never the suffixed one
        let record = PublishRecord::new(channel, content.primary_text.clone(), remote_id.clone());
        match self.store.set_last(channel, &record).await {
            Ok(()) => info!("Published to {} as {}", channel, remote_id),
            Err(e) => warn!("Published to {} as {} but could not record it: {}", channel, remote_id, e),
        }
    }

    async fn reply(
        &self,
        client: &dyn PlatformClient,
        content: &Content,
        create: &StepResult,
    ) -> StepResult {
        if !content.has_reply() {
            return StepResult::Skipped {
                reason: "no reply text".to_string(),
            };
        }
        if !client.supports_replies() {
            return StepResult::Skipped {
                reason: format!("{} does not support replies", client.channel()),
            };
        }
        let Some(parent_id) = create.remote_id() else {
            return StepResult::Skipped {
                reason: "create returned no remote id".to_string(),
            };
        };

        let action = Action::reply(parent_id, content.reply_text.clone());
        match self.dispatcher.dispatch(client, &action).await {
            Ok(report) => StepResult::from(report),
            Err(error) => {
                warn!(
                    "Reply to {} on {} failed: {}",
                    parent_id,
                    client.channel(),
                    error
                );
                StepResult::Failed { error }
            }
        }
    }
}
