use chrono::{DateTime, Utc};

// Which collection a work queue currently occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Unheld,
    Ready,
    Snoozed,
    Inactive,
    InFlight,
    Retired,
}

// Point-in-time view of one work queue, for the reporting surface.
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub class_key: String,
    pub pending: u64,
    pub state: QueueState,
    pub session_balance: i64,
    pub total_expenditure: i64,
    pub total_budget: i64,
}

// Aggregate frontier counters. Rendering is left to the caller.
#[derive(Debug, Clone)]
pub struct FrontierReport {
    pub generated_at: DateTime<Utc>,
    pub queued: u64,
    pub ready: u64,
    pub snoozed: u64,
    pub inactive: u64,
    pub retired: u64,
    pub in_flight: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub disregarded: u64,
}

impl FrontierReport {
    // No work queued anywhere and nothing outstanding.
    pub fn is_exhausted(&self) -> bool {
        self.queued == 0 && self.in_flight == 0
    }
}
