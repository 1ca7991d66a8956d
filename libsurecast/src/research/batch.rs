//! Bounded batch fetch of research sources
//!
//! Sources are fetched one at a time, in order. Each failure is recorded
//! against its source and the batch moves on, except for a rate-limit
//! signal, which stops the batch on the spot. Whatever was gathered up to
//! that point is kept.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::dispatcher::RetryPolicy;
use crate::error::DispatchError;
use crate::platforms::truncate_chars;
use crate::types::SourceResult;

/// Snippets kept per source
pub const SNIPPET_CHARS: usize = 4000;

/// A scraped page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub title: String,
    pub content: String,
}

/// Fetches one research source
#[async_trait]
pub trait ResearchFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, DispatchError>;
}

/// Fetch `sources` in order
///
/// Transient failures are retried per `policy`. `pacing` is slept between
/// sources after each successful fetch.
pub async fn fetch_batch(
    fetcher: &dyn ResearchFetcher,
    sources: &[String],
    policy: &RetryPolicy,
    pacing: Duration,
) -> Vec<SourceResult> {
    let mut results = Vec::with_capacity(sources.len());

    for (index, url) in sources.iter().enumerate() {
        info!("Fetching research source {}/{}: {}", index + 1, sources.len(), url);

        match fetch_with_retry(fetcher, url, policy).await {
            Ok(page) => {
                results.push(SourceResult::ok(
                    url.clone(),
                    page.title,
                    truncate_chars(&page.content, SNIPPET_CHARS),
                ));
                if index + 1 < sources.len() && !pacing.is_zero() {
                    sleep(pacing).await;
                }
            }
            Err(DispatchError::RateLimited(reason)) => {
                warn!("Rate limited on {}, stopping batch: {}", url, reason);
                results.push(SourceResult::failed(
                    url.clone(),
                    format!("Rate limit exceeded: {}", reason),
                ));
                break;
            }
            Err(e) => {
                warn!("Research source {} failed: {}", url, e);
                results.push(SourceResult::failed(url.clone(), e.to_string()));
            }
        }
    }

    results
}

async fn fetch_with_retry(
    fetcher: &dyn ResearchFetcher,
    url: &str,
    policy: &RetryPolicy,
) -> Result<FetchedPage, DispatchError> {
    let mut failures = 0u32;
    loop {
        match fetcher.fetch(url).await {
            Ok(page) => return Ok(page),
            Err(DispatchError::RetryableTransport(reason)) => {
                failures += 1;
                if failures >= policy.max_attempts {
                    return Err(DispatchError::RetryableTransport(format!(
                        "failed after {} attempts: {}",
                        failures, reason
                    )));
                }
                let delay = policy.delay_for(failures);
                debug!("Retrying {} in {:?} after: {}", url, delay, reason);
                sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
