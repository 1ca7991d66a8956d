//! Surecast - resilient publishing to social platforms
//!
//! This library pushes finished content to external platforms so that each
//! item lands once in effect, despite flaky APIs, rate limits and
//! duplicate-content rejections. It also caches a day's worth of scraped
//! research so repeated runs do not repeat the fetches.

pub mod config;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod fallback;
pub mod logging;
pub mod pipeline;
pub mod platforms;
pub mod research;
pub mod sequencer;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use dispatcher::{RetryPolicy, RetryingDispatcher};
pub use error::{DispatchError, Result, SurecastError};
pub use pipeline::{Outcome, PublishPipeline};
pub use types::{Channel, Content, PendingItem, PublishRecord};
