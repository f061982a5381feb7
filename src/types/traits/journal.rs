use async_trait::async_trait;

use crate::types::structs::crawl_uri::CrawlUri;

// Crash-recovery journal sink. The frontier invokes these at admission,
// rescheduling, and terminal-outcome boundaries; persistence is the
// implementor's concern.
#[async_trait]
pub trait FrontierJournal: Send + Sync {
    async fn note_accepted(&self, uri: &CrawlUri);

    async fn note_rescheduled(&self, uri: &CrawlUri);

    async fn note_terminal(&self, uri: &CrawlUri);
}
