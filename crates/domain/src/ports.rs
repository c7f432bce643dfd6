//! Port definitions (traits) for external dependencies
//!
//! These traits define the boundaries between the domain and external systems.
//! Adapters implement these traits to connect to real infrastructure.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::model::{FeedEntry, GenerateInput, Item, ItemStatus, OutgoingPost};

/// Error type for source operations (tables and feeds)
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("API error: {0}")]
    Api(String),
    #[error("Rate limited, retry after: {0:?}")]
    RateLimited(Option<std::time::Duration>),
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Port for a tabular store of scheduled posts (one row per item)
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Read every row as an item; the status column is decoded on each call
    async fn read_items(&self) -> Result<Vec<Item>, SourceError>;

    /// Write the status cell of a single row
    async fn write_status(&self, item_id: &str, status: &ItemStatus) -> Result<(), SourceError>;
}

/// Port for reading feed entries
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the current entries of one feed
    async fn fetch_entries(&self, feed_url: &str) -> Result<Vec<FeedEntry>, SourceError>;
}

/// Error type for text generation
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("LLM API error: {0}")]
    Api(String),
    #[error("Invalid response format: {0}")]
    InvalidFormat(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Timeout")]
    Timeout,
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Port for LLM-backed post writing
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Write a post for the given hint
    async fn generate(&self, input: GenerateInput) -> Result<String, GenerateError>;
}

#[async_trait]
impl<G: TextGenerator + ?Sized> TextGenerator for &G {
    async fn generate(&self, input: GenerateInput) -> Result<String, GenerateError> {
        (**self).generate(input).await
    }
}

/// Error type for publisher operations
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("API error: {0}")]
    Api(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Rate limited, retry after: {0:?}")]
    RateLimited(Option<std::time::Duration>),
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Publisher is disabled")]
    Disabled,
}

/// Result of a successful publish operation
#[derive(Debug, Clone)]
pub struct PublishReceipt {
    /// Platform-specific message ID
    pub message_id: String,
}

/// Port for publishing posts to a channel
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Send a post, as a captioned photo when it carries an image
    async fn publish(&self, post: &OutgoingPost) -> Result<PublishReceipt, PublishError>;

    /// Check if this publisher is enabled
    fn is_enabled(&self) -> bool;

    /// Get the platform name (e.g., "telegram")
    fn platform(&self) -> &'static str;
}

/// Error type for seen-store operations
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Port for remembering which feed items have been handled
#[async_trait]
pub trait SeenStore: Send + Sync {
    /// Check whether an identifier has been recorded
    async fn is_seen(&self, id: &str) -> Result<bool, StateError>;

    /// Record an identifier. Returns `true` only for the first sighting.
    async fn mark_seen(&self, id: &str) -> Result<bool, StateError>;
}

/// Port for time/clock operations (enables deterministic testing)
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> OffsetDateTime;
}

/// Real clock implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}
