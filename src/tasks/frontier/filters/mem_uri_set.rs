use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::Mutex;
use xxhrs::XXH3_64;

use crate::types::{
    error::AppError, structs::crawl_uri::CrawlUri, traits::already_included::AlreadyIncluded,
};

// In-memory already-included filter keyed by XXH3 fingerprints of canonical
// URIs. Nothing is buffered, so request_flush is a no-op and pending() is
// always zero.
pub struct MemUriSet {
    seen: Mutex<HashSet<u64>>,
}

impl MemUriSet {
    pub fn new() -> Self {
        Self {
            seen: Mutex::new(HashSet::new()),
        }
    }

    fn fingerprint(key: &str) -> u64 {
        XXH3_64::hash(key.as_bytes())
    }
}

impl Default for MemUriSet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlreadyIncluded for MemUriSet {
    async fn add(&self, key: &str, _uri: &CrawlUri) -> Result<bool, AppError> {
        Ok(self.seen.lock().await.insert(Self::fingerprint(key)))
    }

    async fn add_force(&self, key: &str, _uri: &CrawlUri) -> Result<(), AppError> {
        self.seen.lock().await.insert(Self::fingerprint(key));

        Ok(())
    }

    async fn note(&self, key: &str) -> Result<(), AppError> {
        self.seen.lock().await.insert(Self::fingerprint(key));

        Ok(())
    }

    async fn forget(&self, key: &str, _uri: &CrawlUri) -> Result<(), AppError> {
        self.seen.lock().await.remove(&Self::fingerprint(key));

        Ok(())
    }

    async fn request_flush(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn count(&self) -> u64 {
        self.seen.lock().await.len() as u64
    }

    async fn pending(&self) -> u64 {
        0
    }
}
