//! Retrying dispatch of single outbound actions
//!
//! The dispatcher sends one [`Action`] through a [`PlatformClient`], asks the
//! client to classify the answer, and decides what happens next:
//!
//! - **Success** ends the call.
//! - **Retryable** failures (transport errors, 5xx, rate limits) are retried
//!   unchanged with linear backoff until the attempt budget is spent.
//! - **Duplicate** rejections get exactly one retry with a uniqueness suffix
//!   appended to the text. A second duplicate is terminal.
//! - **Terminal** failures end the call immediately.
//!
//! The duplicate retry does not consume the transient budget.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::DispatchError;
use crate::platforms::{truncate_chars, PlatformClient};
use crate::types::{Action, Classification};

/// Bounds and pacing for retrying transient failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total sends allowed for retryable failures, first attempt included
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub increment: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_secs(1),
            increment: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, increment: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            increment,
        }
    }

    /// A policy that retries without waiting
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Wait before the next attempt, after `failures` retryable failures
    pub fn delay_for(&self, failures: u32) -> Duration {
        self.base_delay + self.increment * failures
    }
}

/// What a successful dispatch produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    /// Remote id, when the platform returned one
    pub remote_id: Option<String>,
    /// Number of sends performed, mutation retry included
    pub attempts: u32,
    /// Text actually accepted by the platform
    pub sent_text: String,
    /// Whether the text carries a uniqueness suffix
    pub mutated: bool,
}

/// Unix seconds, used as the default uniqueness token
fn unix_seconds() -> u64 {
    chrono::Utc::now().timestamp().unsigned_abs()
}

/// Append a ` [NNNN]` suffix derived from `token`, keeping within `limit` characters
///
/// The original text is cut by characters when text and suffix together
/// would not fit. Below 7 characters only the bracketed token is kept, itself
/// cut to `limit`, so the result never exceeds `limit`.
pub fn mutate_for_uniqueness(text: &str, token: u64, limit: usize) -> String {
    let suffix = format!(" [{:04}]", token % 10_000);
    let suffix_len = suffix.chars().count();

    if limit < suffix_len {
        return truncate_chars(suffix.trim_start(), limit);
    }
    if text.chars().count() + suffix_len <= limit {
        format!("{}{}", text, suffix)
    } else {
        let keep = limit.saturating_sub(suffix_len);
        format!("{}{}", truncate_chars(text, keep), suffix)
    }
}

#[derive(Debug, Clone)]
pub struct RetryingDispatcher {
    policy: RetryPolicy,
    suffix_source: fn() -> u64,
}

impl Default for RetryingDispatcher {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl RetryingDispatcher {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            suffix_source: unix_seconds,
        }
    }

    /// Replace the clock used to derive uniqueness suffixes
    pub fn with_suffix_source(mut self, suffix_source: fn() -> u64) -> Self {
        self.suffix_source = suffix_source;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Dispatch one action with retries
    ///
    /// # Errors
    ///
    /// Returns the last observed failure when the action is rejected for
    /// good, when a mutated retry is rejected as a duplicate again, or when
    /// the retry budget is exhausted.
    pub async fn dispatch(
        &self,
        client: &dyn PlatformClient,
        action: &Action,
    ) -> Result<DispatchReport, DispatchError> {
        let channel = client.channel();
        let mut action = action.clone();
        let mut attempts = 0u32;
        let mut failures = 0u32;
        let mut mutated = false;

        loop {
            attempts += 1;
            debug!(
                "Dispatching {} to {} (attempt {})",
                action.label(),
                channel,
                attempts
            );

            let classification = match client.send(&action).await {
                Ok(response) => client.classify(&action, &response),
                Err(e) => classify_transport_error(e),
            };

            let error = match classification {
                Classification::Success { remote_id } => {
                    if attempts > 1 {
                        info!(
                            "{} to {} succeeded on attempt {}",
                            action.label(),
                            channel,
                            attempts
                        );
                    }
                    return Ok(DispatchReport {
                        remote_id,
                        attempts,
                        sent_text: action.text,
                        mutated,
                    });
                }
                Classification::Duplicate(reason) => {
                    if mutated {
                        warn!(
                            "{} to {} rejected as duplicate after mutation: {}",
                            action.label(),
                            channel,
                            reason
                        );
                        return Err(DispatchError::DuplicateContent(reason));
                    }
                    let token = (self.suffix_source)();
                    action.text =
                        mutate_for_uniqueness(&action.text, token, client.character_limit());
                    mutated = true;
                    info!(
                        "{} to {} rejected as duplicate, retrying with suffix",
                        action.label(),
                        channel
                    );
                    continue;
                }
                Classification::Terminal(reason) => {
                    warn!("{} to {} rejected: {}", action.label(), channel, reason);
                    return Err(DispatchError::TerminalRejection(reason));
                }
                Classification::RateLimited(reason) => DispatchError::RateLimited(reason),
                Classification::Retryable(reason) => DispatchError::RetryableTransport(reason),
            };

            failures += 1;
            if failures >= self.policy.max_attempts {
                warn!(
                    "{} to {} failed after {} attempt(s): {}",
                    action.label(),
                    channel,
                    attempts,
                    error
                );
                return Err(error);
            }

            let delay = self.policy.delay_for(failures);
            warn!(
                "Transient error on {} to {} (attempt {}/{}): {}. Retrying in {:?}...",
                action.label(),
                channel,
                failures,
                self.policy.max_attempts,
                error,
                delay
            );
            sleep(delay).await;
        }
    }
}

fn classify_transport_error(error: DispatchError) -> Classification {
    match error {
        DispatchError::RetryableTransport(reason) => Classification::Retryable(reason),
        DispatchError::RateLimited(reason) => Classification::RateLimited(reason),
        DispatchError::DuplicateContent(reason) => Classification::Duplicate(reason),
        DispatchError::TerminalRejection(reason) => Classification::Terminal(reason),
    }
}
