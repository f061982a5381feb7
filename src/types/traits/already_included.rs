use async_trait::async_trait;

use crate::types::{error::AppError, structs::crawl_uri::CrawlUri};

// Deduplication oracle over canonical URI keys. Implementations may buffer
// additions; request_flush asks for any buffered work to be drained.
#[async_trait]
pub trait AlreadyIncluded: Send + Sync {
    // Record the key; returns true when it was not previously present.
    async fn add(&self, key: &str, uri: &CrawlUri) -> Result<bool, AppError>;

    // Record the key unconditionally, duplicate or not.
    async fn add_force(&self, key: &str, uri: &CrawlUri) -> Result<(), AppError>;

    // Mark a key seen without scheduling anything for it.
    async fn note(&self, key: &str) -> Result<(), AppError>;

    // Drop a key so it may be scheduled again.
    async fn forget(&self, key: &str, uri: &CrawlUri) -> Result<(), AppError>;

    async fn request_flush(&self) -> Result<(), AppError>;

    async fn count(&self) -> u64;

    // Additions buffered but not yet visible to add().
    async fn pending(&self) -> u64;
}
