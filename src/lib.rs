//! Crawl frontier: decides which URI is fetched next under concurrent
//! demand from many workers, enforces per-host politeness pauses, bounds
//! per-site effort through a cost/budget model, and re-admits retried or
//! newly-discovered URIs without duplication or loss.

pub mod tasks;
pub mod types;
pub mod utils;

pub use tasks::frontier::scheduler::Frontier;
pub use types::configs::frontier_config::FrontierConfig;
pub use types::structs::crawl_uri::{CrawlUri, Disposition, FetchStatus};
