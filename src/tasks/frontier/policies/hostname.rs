use crate::{
    types::{
        error::AppError, structs::crawl_uri::CrawlUri, traits::queue_policy::QueueAssignmentPolicy,
    },
    utils::web::host_key,
};

// Buckets URIs per host so each site is fetched serially.
pub struct HostnamePolicy;

impl QueueAssignmentPolicy for HostnamePolicy {
    fn class_key(&self, uri: &CrawlUri) -> Result<String, AppError> {
        host_key(&uri.uri)
    }
}
