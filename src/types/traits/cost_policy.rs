use crate::types::structs::crawl_uri::CrawlUri;

// Pure mapping from a URI to the expenditure charged against its queue's
// budget. Stateless; resolved once per URI and cached on it.
pub trait CostAssignmentPolicy: Send + Sync {
    fn cost_of(&self, uri: &CrawlUri) -> u32;
}
