use std::collections::VecDeque;

use tokio::time::Instant;

use crate::types::structs::crawl_uri::CrawlUri;

// Ordered container of pending URIs for one class key, plus the budget and
// state bookkeeping the scheduler hangs off it. All mutation happens under
// the owning Arc<Mutex<_>>; independent hosts never share a lock.
pub struct WorkQueue {
    class_key: String,
    pending: VecDeque<CrawlUri>,
    // Head has an outstanding peek; dequeue must follow one
    peeked: bool,
    // Remaining expendable cost for the current activation
    session_balance: i64,
    // Lifetime expenditure
    total_expenditure: i64,
    // Lifetime ceiling; <= 0 means unlimited
    total_budget: i64,
    held: bool,
    retired: bool,
    wake_time: Option<Instant>,
}

impl WorkQueue {
    pub fn new(class_key: impl Into<String>, total_budget: i64) -> Self {
        Self {
            class_key: class_key.into(),
            pending: VecDeque::new(),
            peeked: false,
            session_balance: 0,
            total_expenditure: 0,
            total_budget,
            held: false,
            retired: false,
            wake_time: None,
        }
    }

    pub fn enqueue(&mut self, uri: CrawlUri) {
        self.pending.push_back(uri);
    }

    // Idempotent look at the current head. Marks the head so a following
    // dequeue is legal.
    pub fn peek(&mut self) -> Option<&CrawlUri> {
        if !self.pending.is_empty() {
            self.peeked = true;
        }

        self.pending.front()
    }

    // Remove the current head. Only valid after a peek.
    pub fn dequeue(&mut self) -> Option<CrawlUri> {
        debug_assert!(self.peeked, "dequeue without a preceding peek");
        self.peeked = false;

        self.pending.pop_front()
    }

    // Cancel an outstanding peek without removing the head, used when the
    // fetch is retried in place.
    pub fn unpeek(&mut self) {
        self.peeked = false;
    }

    // Current head without marking a peek.
    pub fn head(&self) -> Option<&CrawlUri> {
        self.pending.front()
    }

    // Replace the head with an updated copy (attempt count, status). The
    // retried URI keeps its position ahead of later arrivals.
    pub fn rewrite_head(&mut self, uri: CrawlUri) {
        match self.pending.front_mut() {
            Some(head) => *head = uri,
            None => self.pending.push_front(uri),
        }
    }

    // Remove pending entries matching a canonical URI. While a peek is
    // outstanding a worker owns the head, so it is spared; the peek marker
    // only changes under the queue lock, keeping deletion and dispatch
    // consistent.
    pub fn delete_matching(&mut self, canonical: &str) -> u64 {
        let before = self.pending.len();
        let spare_head = self.peeked;
        let mut index = 0usize;

        self.pending.retain(|uri| {
            let keep = (spare_head && index == 0) || uri.canonical != canonical;
            index += 1;
            keep
        });

        (before - self.pending.len()) as u64
    }

    pub fn expend(&mut self, amount: i64) {
        self.session_balance -= amount;
        self.total_expenditure += amount;
    }

    pub fn refund(&mut self, amount: i64) {
        self.session_balance += amount;
        self.total_expenditure -= amount;
    }

    // Extra charge applied on terminal failure, discouraging prompt
    // re-service of a failing host.
    pub fn note_error(&mut self, penalty: i64) {
        self.expend(penalty);
    }

    pub fn session_balance(&self) -> i64 {
        self.session_balance
    }

    pub fn set_session_balance(&mut self, balance: i64) {
        self.session_balance = balance;
    }

    pub fn total_expenditure(&self) -> i64 {
        self.total_expenditure
    }

    pub fn total_budget(&self) -> i64 {
        self.total_budget
    }

    pub fn set_total_budget(&mut self, budget: i64) {
        self.total_budget = budget;
    }

    pub fn is_over_budget(&self) -> bool {
        self.total_budget > 0 && self.total_expenditure >= self.total_budget
    }

    pub fn wake_time(&self) -> Option<Instant> {
        self.wake_time
    }

    pub fn set_wake_time(&mut self, wake: Instant) {
        self.wake_time = Some(wake);
    }

    pub fn clear_wake_time(&mut self) {
        self.wake_time = None;
    }

    pub fn set_held(&mut self) {
        self.held = true;
    }

    pub fn clear_held(&mut self) {
        self.held = false;
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    pub fn set_retired(&mut self) {
        self.retired = true;
    }

    pub fn clear_retired(&mut self) {
        self.retired = false;
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }

    pub fn count(&self) -> u64 {
        self.pending.len() as u64
    }

    pub fn class_key(&self) -> &str {
        &self.class_key
    }
}
