pub mod crawl_uri;
pub mod frontier_report;
