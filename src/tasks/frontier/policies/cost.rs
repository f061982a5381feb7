use crate::types::{structs::crawl_uri::CrawlUri, traits::cost_policy::CostAssignmentPolicy};

// Flat one point per URI; total budget then bounds the URI count directly.
pub struct UnitCostPolicy;

impl CostAssignmentPolicy for UnitCostPolicy {
    fn cost_of(&self, _uri: &CrawlUri) -> u32 {
        1
    }
}

const MAX_DEPTH_COST: u32 = 64;

// Deeper paths cost more, biasing a queue's budget toward a site's upper
// levels before it is exhausted on leaf pages.
pub struct PathDepthCostPolicy;

impl CostAssignmentPolicy for PathDepthCostPolicy {
    fn cost_of(&self, uri: &CrawlUri) -> u32 {
        let depth = uri
            .uri
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).count() as u32)
            .unwrap_or(0);

        (1 + depth).min(MAX_DEPTH_COST)
    }
}
