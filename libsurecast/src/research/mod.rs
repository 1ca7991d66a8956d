//! Day-keyed research cache
//!
//! Research is expensive, so one batch of scraped sources is shared by every
//! run on the same day. Entries are stored as
//! `<dir>/daily_research_<YYYYMMDD>.json` and served while younger than the
//! freshness window, measured from the entry's own `fetched_at`.
//!
//! # Examples
//!
//! ```no_run
//! use chrono::{Duration, Utc};
//! use libsurecast::research::ResearchCache;
//! use libsurecast::types::SourceResult;
//!
//! # async fn example() {
//! let cache = ResearchCache::new("/tmp/surecast/research", Duration::hours(24));
//! let key = ResearchCache::today_key(Utc::now());
//! let entry = cache
//!     .get_or_fetch(&key, || async {
//!         vec![SourceResult::ok("https://example.com", "Example", "...")]
//!     })
//!     .await;
//! println!("{} sources", entry.results.len());
//! # }
//! ```

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{Config, ResearchConfig};
use crate::dispatcher::RetryPolicy;
use crate::error::{ConfigError, Result, StorageError};
use crate::types::{CacheEntry, SourceResult};

pub mod batch;
pub mod firecrawl;

pub use batch::{fetch_batch, FetchedPage, ResearchFetcher};
pub use firecrawl::FirecrawlFetcher;

pub struct ResearchCache {
    dir: PathBuf,
    freshness: ChronoDuration,
}

impl ResearchCache {
    pub fn new(dir: impl AsRef<Path>, freshness: ChronoDuration) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            freshness,
        }
    }

    /// `YYYYMMDD` key for the day containing `now`
    pub fn today_key(now: DateTime<Utc>) -> String {
        now.format("%Y%m%d").to_string()
    }

    pub fn entry_path(&self, date_key: &str) -> PathBuf {
        self.dir.join(format!("daily_research_{}.json", date_key))
    }

    /// The stored entry for `date_key`, fresh or not
    pub async fn get_cached(&self, date_key: &str) -> Option<CacheEntry> {
        let path = self.entry_path(date_key);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Could not read research cache {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_str::<CacheEntry>(&content) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Ignoring corrupt research cache {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.fetched_at) < self.freshness
    }

    /// Serve a fresh entry for `date_key`, or fetch and store a new one
    pub async fn get_or_fetch<F, Fut>(&self, date_key: &str, fetch_fn: F) -> CacheEntry
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Vec<SourceResult>>,
    {
        self.get_or_fetch_at(date_key, Utc::now(), false, fetch_fn)
            .await
    }

    /// Fetch and store a new entry regardless of what is cached
    pub async fn refresh<F, Fut>(&self, date_key: &str, fetch_fn: F) -> CacheEntry
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Vec<SourceResult>>,
    {
        self.get_or_fetch_at(date_key, Utc::now(), true, fetch_fn)
            .await
    }

    /// [`ResearchCache::get_or_fetch`] against an explicit clock
    pub async fn get_or_fetch_at<F, Fut>(
        &self,
        date_key: &str,
        now: DateTime<Utc>,
        force_refresh: bool,
        fetch_fn: F,
    ) -> CacheEntry
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Vec<SourceResult>>,
    {
        if !force_refresh {
            if let Some(entry) = self.get_cached(date_key).await {
                if self.is_fresh(&entry, now) {
                    info!(
                        "Using cached research for {} (fetched {})",
                        date_key, entry.fetched_at
                    );
                    return entry;
                }
                debug!("Research cache for {} is stale", date_key);
            }
        }

        let results = fetch_fn().await;
        let entry = CacheEntry {
            date_key: date_key.to_string(),
            fetched_at: now,
            results,
        };

        match self.persist(&entry).await {
            Ok(()) => info!(
                "Cached {} research result(s) for {}",
                entry.results.len(),
                date_key
            ),
            Err(e) => warn!("Could not write research cache for {}: {}", date_key, e),
        }
        entry
    }

    async fn persist(&self, entry: &CacheEntry) -> std::result::Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.entry_path(&entry.date_key);
        let tmp_path = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(entry)?;
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &path).await?;
        Ok(())
    }
}

/// Daily research: the configured sources, fetched through the cache
pub struct ResearchService {
    cache: ResearchCache,
    fetcher: Arc<dyn ResearchFetcher>,
    sources: Vec<String>,
    policy: RetryPolicy,
    pacing: Duration,
}

impl ResearchService {
    pub fn new(
        cache: ResearchCache,
        fetcher: Arc<dyn ResearchFetcher>,
        sources: Vec<String>,
        policy: RetryPolicy,
        pacing: Duration,
    ) -> Self {
        Self {
            cache,
            fetcher,
            sources,
            policy,
            pacing,
        }
    }

    /// Build from the `[research]`, `[retry]` and `[storage]` sections
    pub fn from_config(config: &Config) -> Result<Self> {
        let research: &ResearchConfig = config
            .research
            .as_ref()
            .ok_or_else(|| ConfigError::MissingField("research".to_string()))?;

        let cache = ResearchCache::new(
            config.storage.expand_data_dir().join("research"),
            research.freshness()?,
        );

        Ok(Self::new(
            cache,
            Arc::new(FirecrawlFetcher::from_config(research)?),
            research.sources.clone(),
            config.retry.policy(),
            Duration::from_secs(research.pacing_secs),
        ))
    }

    pub fn cache(&self) -> &ResearchCache {
        &self.cache
    }

    /// Today's research, fetched only when the cache has nothing fresh
    pub async fn daily(&self, force_refresh: bool) -> CacheEntry {
        let now = Utc::now();
        let key = ResearchCache::today_key(now);
        self.cache
            .get_or_fetch_at(&key, now, force_refresh, || {
                fetch_batch(self.fetcher.as_ref(), &self.sources, &self.policy, self.pacing)
            })
            .await
    }

    /// Today's stored research without fetching
    pub async fn cached(&self) -> Option<CacheEntry> {
        self.cache
            .get_cached(&ResearchCache::today_key(Utc::now()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn results(label: &str) -> Vec<SourceResult> {
        vec![SourceResult::ok("https://a.example", label, "snippet")]
    }

    #[test]
    fn test_today_key() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 23, 59, 0).unwrap();
        assert_eq!(ResearchCache::today_key(now), "20250101");
    }

    #[tokio::test]
    async fn test_fresh_entry_is_served_without_fetch() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ResearchCache::new(temp_dir.path(), ChronoDuration::hours(24));
        let calls = AtomicUsize::new(0);
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap();

        let first = cache
            .get_or_fetch_at("20250101", start, false, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                results("first")
            })
            .await;
        let second = cache
            .get_or_fetch_at("20250101", start + ChronoDuration::hours(23), false, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                results("second")
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
        assert!(cache.entry_path("20250101").exists());
    }

    #[tokio::test]
    async fn test_stale_entry_is_refetched() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ResearchCache::new(temp_dir.path(), ChronoDuration::hours(24));
        let calls = AtomicUsize::new(0);
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap();

        for offset in [0, 24] {
            cache
                .get_or_fetch_at("20250101", start + ChronoDuration::hours(offset), false, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    results("batch")
                })
                .await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let stored = cache.get_cached("20250101").await.unwrap();
        assert_eq!(stored.fetched_at, start + ChronoDuration::hours(24));
    }

    #[tokio::test]
    async fn test_force_refresh_bypasses_fresh_entry() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ResearchCache::new(temp_dir.path(), ChronoDuration::hours(24));

        cache.get_or_fetch("20250101", || async { results("old") }).await;
        let refreshed = cache.refresh("20250101", || async { results("new") }).await;

        assert_eq!(refreshed.results[0].title, "new");
        assert_eq!(cache.get_cached("20250101").await.unwrap().results[0].title, "new");
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_refetched() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ResearchCache::new(temp_dir.path(), ChronoDuration::hours(24));
        std::fs::write(cache.entry_path("20250101"), "[broken").unwrap();

        let entry = cache.get_or_fetch("20250101", || async { results("fresh") }).await;
        assert_eq!(entry.results[0].title, "fresh");
    }

    #[tokio::test]
    async fn test_persist_failure_still_returns_entry() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("research");
        std::fs::write(&blocker, "not a directory").unwrap();
        let cache = ResearchCache::new(&blocker, ChronoDuration::hours(24));

        let entry = cache.get_or_fetch("20250101", || async { results("kept") }).await;
        assert_eq!(entry.results[0].title, "kept");
        assert!(cache.get_cached("20250101").await.is_none());
    }

    #[test]
    fn test_service_requires_research_section() {
        let config = Config::default_config();
        assert!(ResearchService::from_config(&config).is_err());
    }

    #[test]
    fn test_service_rejects_out_of_range_freshness() {
        let mut config = Config::default_config();
        config.research = Some(ResearchConfig {
            firecrawl_api_key: "fc_test".to_string(),
            base_url: None,
            sources: vec!["https://one.example".to_string()],
            freshness_hours: i64::MAX,
            pacing_secs: 0,
        });

        let err = ResearchService::from_config(&config).err().expect("rejected");
        assert!(err.to_string().contains("research.freshness_hours"));
    }
}
