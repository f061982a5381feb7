use std::{cmp::Ordering, collections::BinaryHeap};

use tokio::time::Instant;

// One snoozed queue awaiting its wake time.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SnoozeEntry {
    wake: Instant,
    class_key: String,
}

// BinaryHeap is a max-heap; invert so the earliest wake surfaces first.
impl Ord for SnoozeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .wake
            .cmp(&self.wake)
            .then_with(|| other.class_key.cmp(&self.class_key))
    }
}

impl PartialOrd for SnoozeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Time-ordered set of snoozed class keys. The wake scan is the only
// globally-serialized step in the scheduler.
#[derive(Default)]
pub struct SnoozeQueue {
    heap: BinaryHeap<SnoozeEntry>,
}

impl SnoozeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, class_key: impl Into<String>, wake: Instant) {
        self.heap.push(SnoozeEntry {
            wake,
            class_key: class_key.into(),
        });
    }

    // Earliest pending wake time, the scheduler's wait watermark.
    pub fn next_wake(&self) -> Option<Instant> {
        self.heap.peek().map(|entry| entry.wake)
    }

    // Drain every entry due at `now`, earliest first.
    pub fn pop_due(&mut self, now: Instant) -> Vec<String> {
        let mut due = vec![];

        while let Some(entry) = self.heap.peek() {
            if entry.wake > now {
                break;
            }

            if let Some(entry) = self.heap.pop() {
                due.push(entry.class_key);
            }
        }

        due
    }

    pub fn contains(&self, class_key: &str) -> bool {
        self.heap.iter().any(|entry| entry.class_key == class_key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.heap.iter().map(|entry| entry.class_key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
