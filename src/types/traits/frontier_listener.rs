use crate::types::structs::crawl_uri::CrawlUri;

// Fire-and-forget controller notifications. All methods default to no-ops
// so implementors subscribe only to what they need.
pub trait FrontierListener: Send + Sync {
    fn on_scheduled(&self, _uri: &CrawlUri) {}

    fn on_success(&self, _uri: &CrawlUri) {}

    fn on_need_retry(&self, _uri: &CrawlUri) {}

    fn on_disregard(&self, _uri: &CrawlUri) {}

    fn on_failure(&self, _uri: &CrawlUri) {}
}

pub struct NoopListener;

impl FrontierListener for NoopListener {}
