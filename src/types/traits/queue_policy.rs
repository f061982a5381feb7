use crate::types::{error::AppError, structs::crawl_uri::CrawlUri};

// Pure mapping from a URI to the class key of the work queue that serializes
// its fetches, typically per-host.
pub trait QueueAssignmentPolicy: Send + Sync {
    fn class_key(&self, uri: &CrawlUri) -> Result<String, AppError>;
}
