pub mod already_included;
pub mod cost_policy;
pub mod frontier_listener;
pub mod journal;
pub mod queue_policy;
