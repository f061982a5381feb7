use std::time::Duration;

use url::Url;

use crate::{types::error::AppError, utils::web::canonicalize};

// Outcome class of a finished fetch attempt, as seen by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Retry,
    Succeed,
    Fail,
    Disregard,
}

// Status of the most recent fetch attempt. Set by the fetch layer before
// the URI is handed back via finished().
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    // Not yet attempted
    Pending,
    // HTTP status of a completed fetch
    Success(u16),
    ConnectFailed,
    Timeout,
    // Blocked on a prerequisite; no attempt was actually made
    Deferred,
    RetriesExhausted,
    FatalProtocol,
    OutOfScope,
    PolicyExcluded,
    // Operator-forced removal
    Deleted,
}

impl FetchStatus {
    pub fn disposition(&self) -> Disposition {
        match self {
            FetchStatus::Success(_) => Disposition::Succeed,
            FetchStatus::Pending
            | FetchStatus::ConnectFailed
            | FetchStatus::Timeout
            | FetchStatus::Deferred => Disposition::Retry,
            FetchStatus::RetriesExhausted | FetchStatus::FatalProtocol => Disposition::Fail,
            FetchStatus::OutOfScope | FetchStatus::PolicyExcluded | FetchStatus::Deleted => {
                Disposition::Disregard
            }
        }
    }

    // Whether a real network attempt was made. Deferred URIs were never
    // tried, so any cost charged for them is refunded.
    pub fn was_attempted(&self) -> bool {
        !matches!(self, FetchStatus::Pending | FetchStatus::Deferred)
    }
}

#[derive(Debug, Clone)]
pub struct CrawlUri {
    pub uri: Url,
    // Canonical string form, computed once at admission
    pub canonical: String,
    // Class key resolved by the queue assignment policy, cached
    pub class_key: Option<String>,
    // Cost resolved by the cost assignment policy, cached
    pub cost: Option<u32>,
    // Completed fetch attempts
    pub fetch_attempts: u32,
    pub status: FetchStatus,
    // Server-directed wait (e.g. Retry-After) overriding configured delays
    pub fetch_delay: Option<Duration>,
    // Bypass the already-included filter
    pub force_fetch: bool,
    pub annotations: Vec<String>,
}

impl CrawlUri {
    pub fn new(uri: Url) -> Self {
        let canonical = canonicalize(&uri);

        Self {
            uri,
            canonical,
            class_key: None,
            cost: None,
            fetch_attempts: 0,
            status: FetchStatus::Pending,
            fetch_delay: None,
            force_fetch: false,
            annotations: vec![],
        }
    }

    pub fn parse(uri: &str) -> Result<Self, AppError> {
        Ok(Self::new(Url::parse(uri)?))
    }

    pub fn force(mut self) -> Self {
        self.force_fetch = true;
        self
    }

    pub fn annotate(&mut self, note: impl Into<String>) {
        self.annotations.push(note.into());
    }
}
