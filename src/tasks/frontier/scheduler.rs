use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::Utc;
use tokio::{
    sync::{Mutex, Notify},
    time::Instant,
};
use tracing::{debug, info};

use crate::{
    tasks::frontier::{policies, snooze::SnoozeQueue, work_queue::WorkQueue},
    types::{
        configs::frontier_config::FrontierConfig,
        error::AppError,
        structs::{
            crawl_uri::{CrawlUri, Disposition, FetchStatus},
            frontier_report::{FrontierReport, QueueSnapshot, QueueState},
        },
        traits::{
            already_included::AlreadyIncluded, cost_policy::CostAssignmentPolicy,
            frontier_listener::FrontierListener, journal::FrontierJournal,
            queue_policy::QueueAssignmentPolicy,
        },
    },
};

// The scheduler proper. Owns every work queue and the ready/snoozed/
// inactive/retired collections plus the in-flight multiset. Worker tasks
// call next() and finished() concurrently; each queue synchronizes on its
// own lock so independent hosts make progress independently. The wake scan
// over the snoozed heap is the only globally-serialized step.
//
// Lock order, where multiple locks are held: queues map, then one work
// queue, then a state collection. Never two work queues at once.
pub struct Frontier {
    config: FrontierConfig,
    queue_policy: Arc<dyn QueueAssignmentPolicy>,
    cost_policy: Arc<dyn CostAssignmentPolicy>,
    already_included: Arc<dyn AlreadyIncluded>,
    listener: Arc<dyn FrontierListener>,
    journal: Option<Arc<dyn FrontierJournal>>,

    queues: Mutex<HashMap<String, Arc<Mutex<WorkQueue>>>>,
    // Class keys eligible for immediate dispatch, FIFO
    ready: Mutex<VecDeque<String>>,
    ready_notify: Notify,
    snoozed: Mutex<SnoozeQueue>,
    inactive: Mutex<VecDeque<String>>,
    retired: Mutex<HashSet<String>>,
    // Class key -> URIs currently out with a worker; at most one per key
    in_flight: Mutex<HashMap<String, u32>>,

    queued: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    disregarded: AtomicU64,

    paused: AtomicBool,
    terminated: AtomicBool,
}

impl Frontier {
    // Policy names resolve through the registry; unknown names are fatal
    // here, before any worker starts.
    pub fn new(
        config: FrontierConfig,
        already_included: Arc<dyn AlreadyIncluded>,
        listener: Arc<dyn FrontierListener>,
        journal: Option<Arc<dyn FrontierJournal>>,
    ) -> Result<Self, AppError> {
        let queue_policy = policies::queue_policy_by_name(&config.queue_policy)?;
        let cost_policy = policies::cost_policy_by_name(&config.cost_policy)?;

        Self::with_policies(
            config,
            queue_policy,
            cost_policy,
            already_included,
            listener,
            journal,
        )
    }

    pub fn with_policies(
        config: FrontierConfig,
        queue_policy: Arc<dyn QueueAssignmentPolicy>,
        cost_policy: Arc<dyn CostAssignmentPolicy>,
        already_included: Arc<dyn AlreadyIncluded>,
        listener: Arc<dyn FrontierListener>,
        journal: Option<Arc<dyn FrontierJournal>>,
    ) -> Result<Self, AppError> {
        config.validate()?;

        Ok(Self {
            config,
            queue_policy,
            cost_policy,
            already_included,
            listener,
            journal,
            queues: Mutex::new(HashMap::new()),
            ready: Mutex::new(VecDeque::new()),
            ready_notify: Notify::new(),
            snoozed: Mutex::new(SnoozeQueue::new()),
            inactive: Mutex::new(VecDeque::new()),
            retired: Mutex::new(HashSet::new()),
            in_flight: Mutex::new(HashMap::new()),
            queued: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            disregarded: AtomicU64::new(0),
            paused: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
        })
    }

    // Admit a candidate URI. Returns false when the already-included filter
    // rejects it as a duplicate (force-fetch bypasses the check).
    pub async fn schedule(&self, uri: CrawlUri) -> Result<bool, AppError> {
        let novel = if uri.force_fetch {
            self.already_included.add_force(&uri.canonical, &uri).await?;
            true
        } else {
            self.already_included.add(&uri.canonical, &uri).await?
        };

        if !novel {
            debug!(uri = %uri.canonical, "dropped already-included uri");
            return Ok(false);
        }

        self.listener.on_scheduled(&uri);

        if let Some(journal) = &self.journal {
            journal.note_accepted(&uri).await;
        }

        self.receive(uri).await?;

        Ok(true)
    }

    // Accepted URIs: resolve and cache class key and cost, then route to
    // the owning work queue.
    async fn receive(&self, mut uri: CrawlUri) -> Result<(), AppError> {
        if uri.class_key.is_none() {
            uri.class_key = Some(self.queue_policy.class_key(&uri)?);
        }

        if uri.cost.is_none() {
            uri.cost = Some(self.cost_policy.cost_of(&uri));
        }

        self.queued.fetch_add(1, Ordering::Relaxed);
        self.send_to_queue(uri).await
    }

    async fn send_to_queue(&self, uri: CrawlUri) -> Result<(), AppError> {
        let key = uri
            .class_key
            .clone()
            .ok_or_else(|| AppError::Generic("uri reached send_to_queue unclassified".into()))?;

        let queue_ref = self.queue_for(&key).await;
        let mut queue = queue_ref.lock().await;
        queue.enqueue(uri);

        if !queue.is_held() && !queue.is_retired() {
            queue.set_held();

            if self.config.hold_queues {
                // Deferred activation bounds simultaneously-active hosts.
                queue.set_session_balance(0);
                self.inactive.lock().await.push_back(key.clone());
                self.ready_notify.notify_waiters();
                debug!(class_key = %key, "new queue held inactive");
            } else {
                queue.set_session_balance(self.config.balance_replenish);
                self.reenroll(&key, &mut queue).await;
            }
        }

        Ok(())
    }

    // Blocking draw, called concurrently by worker tasks. Returns the next
    // URI to fetch, or FrontierTerminated once terminate() is invoked.
    pub async fn next(&self) -> Result<CrawlUri, AppError> {
        loop {
            if self.terminated.load(Ordering::Acquire) {
                return Err(AppError::FrontierTerminated);
            }

            if self.paused.load(Ordering::Acquire) {
                tokio::time::sleep(self.config.default_wait).await;
                continue;
            }

            self.wake_due_queues().await;

            let popped = self.ready.lock().await.pop_front();
            if let Some(key) = popped {
                if let Some(uri) = self.try_dispatch(&key).await? {
                    return Ok(uri);
                }

                continue;
            }

            // Nothing ready. A quiescent frontier asks the filter to drain
            // buffered additions before anyone blocks.
            if self.should_flush_filter().await {
                self.already_included.request_flush().await?;
            }

            let activated = self.inactive.lock().await.pop_front();
            if let Some(key) = activated {
                self.activate(&key).await;
                continue;
            }

            let wait = self.ready_wait().await;
            let notified = self.ready_notify.notified();
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    // Reconcile a completed (or abandoned) fetch attempt and re-admit its
    // queue. The worker must hand back the same URI it drew from next().
    pub async fn finished(&self, uri: CrawlUri) -> Result<(), AppError> {
        let mut uri = uri;
        let key = uri
            .class_key
            .clone()
            .ok_or_else(|| AppError::Generic("finished uri missing class key".into()))?;

        {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(count) = in_flight.get_mut(&key) {
                *count -= 1;

                if *count == 0 {
                    in_flight.remove(&key);
                }
            }
        }

        let queue_ref = self
            .queue(&key)
            .await
            .ok_or_else(|| AppError::UnknownQueue(key.clone()))?;
        let mut queue = queue_ref.lock().await;

        // Deletion spares a peeked head, so a mismatch means this URI was
        // removed by the operator while out with the worker; its counters
        // were settled at deletion time.
        let head_is_ours = queue
            .head()
            .map(|head| head.canonical == uri.canonical)
            .unwrap_or(false);
        if !head_is_ours {
            queue.unpeek();
            self.reenroll(&key, &mut queue).await;

            return Ok(());
        }

        let cost = i64::from(uri.cost.unwrap_or(1));

        let mut disposition = uri.status.disposition();

        if disposition == Disposition::Retry {
            if uri.status.was_attempted() {
                uri.fetch_attempts += 1;
            } else {
                // Never truly attempted, so the charge comes back.
                queue.refund(cost);
            }

            if uri.fetch_attempts >= self.config.max_retries {
                uri.annotate(format!("retries exhausted at {}", uri.fetch_attempts));
                uri.status = FetchStatus::RetriesExhausted;
                disposition = Disposition::Fail;
            }
        }

        if disposition == Disposition::Retry {
            let delay = uri.fetch_delay.unwrap_or(self.config.retry_delay);

            self.listener.on_need_retry(&uri);

            if let Some(journal) = &self.journal {
                journal.note_rescheduled(&uri).await;
            }

            // Restore to the queue head so the retry precedes later
            // arrivals in the same queue.
            queue.unpeek();
            uri.status = FetchStatus::Pending;
            uri.fetch_delay = None;
            queue.rewrite_head(uri);

            if delay > Duration::ZERO {
                queue.set_wake_time(Instant::now() + delay);
            }

            self.reenroll(&key, &mut queue).await;

            return Ok(());
        }

        // Terminal outcome: the URI leaves its queue for good.
        queue.dequeue();
        self.queued.fetch_sub(1, Ordering::Relaxed);

        match disposition {
            Disposition::Succeed => {
                self.succeeded.fetch_add(1, Ordering::Relaxed);
                self.listener.on_success(&uri);
            }
            Disposition::Disregard => {
                self.disregarded.fetch_add(1, Ordering::Relaxed);
                // Disregarded work should never have been charged.
                queue.refund(cost);
                self.listener.on_disregard(&uri);
            }
            Disposition::Fail => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                queue.note_error(self.config.error_penalty);
                self.listener.on_failure(&uri);
            }
            Disposition::Retry => unreachable!("retry handled above"),
        }

        if let Some(journal) = &self.journal {
            journal.note_terminal(&uri).await;
        }

        if queue.count() == 0 {
            // Keep any politeness wake time; it applies when the next URI
            // for this host arrives.
            let delay = uri.fetch_delay.unwrap_or(self.config.politeness_delay);
            if delay > Duration::ZERO {
                queue.set_wake_time(Instant::now() + delay);
            }

            queue.clear_held();

            return Ok(());
        }

        let delay = uri.fetch_delay.unwrap_or(self.config.politeness_delay);
        if delay > Duration::ZERO {
            queue.set_wake_time(Instant::now() + delay);
        }

        if !queue.is_over_budget()
            && delay > self.config.snooze_long
            && self.has_ready_work().await
        {
            // A wait this long would idle the slot while other hosts have
            // work; deactivate instead of sleeping.
            debug!(class_key = %key, ?delay, "long snooze converted to deactivation");
            self.deactivate(&key).await;
        } else {
            self.reenroll(&key, &mut queue).await;
        }

        Ok(())
    }

    // Operator-forced removal of pending copies of a URI, counted as
    // disregarded. A copy currently out with a worker is left to its
    // finished() call.
    pub async fn deleted(&self, uri: &CrawlUri) -> Result<u64, AppError> {
        let key = match &uri.class_key {
            Some(key) => key.clone(),
            None => self.queue_policy.class_key(uri)?,
        };

        let Some(queue_ref) = self.queue(&key).await else {
            return Ok(0);
        };

        let removed = queue_ref.lock().await.delete_matching(&uri.canonical);

        if removed > 0 {
            self.queued.fetch_sub(removed, Ordering::Relaxed);
            self.disregarded.fetch_add(removed, Ordering::Relaxed);
            self.already_included.forget(&uri.canonical, uri).await?;
            self.listener.on_disregard(uri);
            debug!(uri = %uri.canonical, removed, "deleted pending uri");
        }

        Ok(removed)
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    pub fn unpause(&self) {
        self.paused.store(false, Ordering::Release);
        self.ready_notify.notify_waiters();
    }

    // Cooperative shutdown: every blocked and future next() call returns
    // FrontierTerminated.
    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::Release);
        self.ready_notify.notify_waiters();
        info!("frontier terminated");
    }

    // Explicit policy refresh: re-applies the budget ceiling everywhere and
    // demotes no-longer-over-budget retired queues to inactive. This is the
    // only path out of retirement.
    pub async fn refresh_budgets(&self, total_budget: i64) {
        info!(total_budget, "re-applying queue budgets");

        let queues: Vec<(String, Arc<Mutex<WorkQueue>>)> = self
            .queues
            .lock()
            .await
            .iter()
            .map(|(key, queue)| (key.clone(), queue.clone()))
            .collect();

        for (key, queue_ref) in queues {
            let mut queue = queue_ref.lock().await;
            queue.set_total_budget(total_budget);

            if queue.is_retired() && !queue.is_over_budget() {
                queue.clear_retired();
                self.retired.lock().await.remove(&key);
                self.inactive.lock().await.push_back(key.clone());
                self.ready_notify.notify_waiters();
                debug!(class_key = %key, "queue unretired");
            }
        }
    }

    pub async fn report(&self) -> FrontierReport {
        FrontierReport {
            generated_at: Utc::now(),
            queued: self.queued.load(Ordering::Relaxed),
            ready: self.ready.lock().await.len() as u64,
            snoozed: self.snoozed.lock().await.len() as u64,
            inactive: self.inactive.lock().await.len() as u64,
            retired: self.retired.lock().await.len() as u64,
            in_flight: self
                .in_flight
                .lock()
                .await
                .values()
                .map(|count| u64::from(*count))
                .sum(),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            disregarded: self.disregarded.load(Ordering::Relaxed),
        }
    }

    pub async fn queue_snapshots(&self) -> Vec<QueueSnapshot> {
        let ready: HashSet<String> = self.ready.lock().await.iter().cloned().collect();
        let inactive: HashSet<String> = self.inactive.lock().await.iter().cloned().collect();
        let snoozed: HashSet<String> = self.snoozed.lock().await.keys().into_iter().collect();
        let in_flight: HashSet<String> = self.in_flight.lock().await.keys().cloned().collect();

        let queues: Vec<(String, Arc<Mutex<WorkQueue>>)> = self
            .queues
            .lock()
            .await
            .iter()
            .map(|(key, queue)| (key.clone(), queue.clone()))
            .collect();

        let mut snapshots = Vec::with_capacity(queues.len());

        for (key, queue_ref) in queues {
            let queue = queue_ref.lock().await;

            let state = if queue.is_retired() {
                QueueState::Retired
            } else if in_flight.contains(&key) {
                QueueState::InFlight
            } else if snoozed.contains(&key) {
                QueueState::Snoozed
            } else if inactive.contains(&key) {
                QueueState::Inactive
            } else if ready.contains(&key) {
                QueueState::Ready
            } else if !queue.is_held() {
                QueueState::Unheld
            } else {
                QueueState::Ready
            };

            snapshots.push(QueueSnapshot {
                class_key: key,
                pending: queue.count(),
                state,
                session_balance: queue.session_balance(),
                total_expenditure: queue.total_expenditure(),
                total_budget: queue.total_budget(),
            });
        }

        snapshots
    }

    async fn queue(&self, key: &str) -> Option<Arc<Mutex<WorkQueue>>> {
        self.queues.lock().await.get(key).cloned()
    }

    // Work queues are created lazily on first admission and never
    // destroyed.
    async fn queue_for(&self, key: &str) -> Arc<Mutex<WorkQueue>> {
        self.queues
            .lock()
            .await
            .entry(key.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(WorkQueue::new(key, self.config.total_budget)))
            })
            .clone()
    }

    // Move every due snoozed queue back into rotation.
    async fn wake_due_queues(&self) {
        let due = self.snoozed.lock().await.pop_due(Instant::now());

        for key in due {
            let Some(queue_ref) = self.queue(&key).await else {
                continue;
            };

            let mut queue = queue_ref.lock().await;
            queue.clear_wake_time();
            self.reenroll(&key, &mut queue).await;
        }
    }

    // Dispatch the head of a ready queue, or tidy up and signal the caller
    // to keep looping (stale key, empty queue, late reclassification).
    async fn try_dispatch(&self, key: &str) -> Result<Option<CrawlUri>, AppError> {
        let Some(queue_ref) = self.queue(key).await else {
            return Ok(None);
        };

        let mut queue = queue_ref.lock().await;

        if queue.is_retired() {
            return Ok(None);
        }

        let head = match queue.peek() {
            Some(head) => head.clone(),
            None => {
                queue.clear_held();
                return Ok(None);
            }
        };

        // The class key may have changed since enqueue (late host
        // resolution); if so the head belongs elsewhere.
        let current_key = self.queue_policy.class_key(&head)?;
        if current_key != key {
            let Some(mut moved) = queue.dequeue() else {
                return Ok(None);
            };
            moved.class_key = Some(current_key.clone());

            if queue.count() > 0 {
                self.ready.lock().await.push_back(key.to_string());
                self.ready_notify.notify_one();
            } else {
                queue.clear_held();
            }

            drop(queue);
            debug!(uri = %moved.canonical, from = %key, to = %current_key, "requeued on class key change");
            self.send_to_queue(moved).await?;

            return Ok(None);
        }

        // The head stays peeked in its queue while the worker holds this
        // clone; finished() reconciles the two.
        queue.expend(i64::from(head.cost.unwrap_or(1)));
        drop(queue);

        let mut in_flight = self.in_flight.lock().await;
        *in_flight.entry(key.to_string()).or_insert(0) += 1;

        Ok(Some(head))
    }

    // Activate one deferred queue: replenish its duty-cycle balance, then
    // retire, snooze, or ready it as its budget and wake time dictate.
    async fn activate(&self, key: &str) {
        let Some(queue_ref) = self.queue(key).await else {
            return;
        };

        let mut queue = queue_ref.lock().await;

        if queue.is_retired() {
            return;
        }

        queue.set_session_balance(self.config.balance_replenish);
        debug!(class_key = %key, "queue activated");
        self.reenroll(key, &mut queue).await;
    }

    // Place a held queue into the collection its state calls for. Caller
    // holds the queue lock.
    async fn reenroll(&self, key: &str, queue: &mut WorkQueue) {
        if queue.is_retired() {
            return;
        }

        if queue.count() == 0 {
            queue.clear_held();
            return;
        }

        if queue.is_over_budget() {
            self.retire(key, queue).await;
            return;
        }

        if let Some(wake) = queue.wake_time() {
            if wake > Instant::now() {
                self.snoozed.lock().await.push(key, wake);
                // Waiters recompute their wake watermark.
                self.ready_notify.notify_waiters();
                return;
            }

            queue.clear_wake_time();
        }

        if queue.session_balance() <= 0 {
            self.deactivate(key).await;
            return;
        }

        self.ready.lock().await.push_back(key.to_string());
        self.ready_notify.notify_one();
    }

    // Caller keeps the queue held; activation replenishes its balance.
    async fn deactivate(&self, key: &str) {
        self.inactive.lock().await.push_back(key.to_string());
        self.ready_notify.notify_waiters();
        debug!(class_key = %key, "queue deactivated");
    }

    async fn retire(&self, key: &str, queue: &mut WorkQueue) {
        queue.set_retired();
        queue.clear_wake_time();
        self.retired.lock().await.insert(key.to_string());
        debug!(
            class_key = %key,
            spent = queue.total_expenditure(),
            budget = queue.total_budget(),
            "queue retired over budget"
        );
    }

    async fn has_ready_work(&self) -> bool {
        !self.ready.lock().await.is_empty() || !self.inactive.lock().await.is_empty()
    }

    // Flush only when truly idle: nothing in flight, nothing waking soon,
    // and the filter actually has buffered work.
    async fn should_flush_filter(&self) -> bool {
        if self.already_included.pending().await == 0 {
            return false;
        }

        if !self.in_flight.lock().await.is_empty() {
            return false;
        }

        match self.snoozed.lock().await.next_wake() {
            Some(wake) => wake > Instant::now() + self.config.default_wait,
            None => true,
        }
    }

    // Bounded wait for ready work: the default interval, shortened by an
    // approaching snooze expiry.
    async fn ready_wait(&self) -> Duration {
        let default = self.config.default_wait;

        match self.snoozed.lock().await.next_wake() {
            Some(wake) => default
                .min(wake.saturating_duration_since(Instant::now()))
                .max(Duration::from_millis(1)),
            None => default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::frontier::filters::mem_uri_set::MemUriSet;
    use crate::types::traits::frontier_listener::NoopListener;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;
    use tokio::time::timeout;

    fn uri(s: &str) -> CrawlUri {
        CrawlUri::parse(s).unwrap()
    }

    fn quick_config() -> FrontierConfig {
        FrontierConfig {
            politeness_delay: Duration::ZERO,
            retry_delay: Duration::ZERO,
            default_wait: Duration::from_millis(100),
            ..Default::default()
        }
    }

    fn frontier(config: FrontierConfig) -> Frontier {
        Frontier::new(
            config,
            Arc::new(MemUriSet::new()),
            Arc::new(NoopListener),
            None,
        )
        .unwrap()
    }

    async fn finish_with(f: &Frontier, mut u: CrawlUri, status: FetchStatus) {
        u.status = status;
        f.finished(u).await.unwrap();
    }

    async fn next_within(f: &Frontier, secs: u64) -> Option<CrawlUri> {
        match timeout(Duration::from_secs(secs), f.next()).await {
            Ok(result) => Some(result.unwrap()),
            Err(_) => None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_next_finished_roundtrip() {
        let f = frontier(quick_config());

        assert!(f.schedule(uri("http://a.example/1")).await.unwrap());

        let u = next_within(&f, 5).await.unwrap();
        assert_eq!(u.canonical, "http://a.example/1");
        assert_eq!(u.class_key.as_deref(), Some("a.example"));
        assert_eq!(u.cost, Some(1));

        let report = f.report().await;
        assert_eq!(report.in_flight, 1);
        assert_eq!(report.queued, 1);

        finish_with(&f, u, FetchStatus::Success(200)).await;

        let report = f.report().await;
        assert_eq!(report.in_flight, 0);
        assert_eq!(report.queued, 0);
        assert_eq!(report.succeeded, 1);
        assert!(report.is_exhausted());
    }

    // Scenario: the filter rejects a previously-seen canonical URI and the
    // queued count is unaffected.
    #[tokio::test(start_paused = true)]
    async fn test_duplicate_rejected_by_filter() {
        let f = frontier(quick_config());

        assert!(f.schedule(uri("http://a.example/1")).await.unwrap());
        assert!(!f.schedule(uri("http://a.example/1#other")).await.unwrap());

        assert_eq!(f.report().await.queued, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_fetch_bypasses_filter() {
        let f = frontier(quick_config());

        assert!(f.schedule(uri("http://a.example/1")).await.unwrap());
        assert!(f.schedule(uri("http://a.example/1").force()).await.unwrap());

        assert_eq!(f.report().await.queued, 2);
    }

    // Scenario: budget 10, unit cost, 12 URIs. Exactly 10 come out, then
    // the queue retires.
    #[tokio::test(start_paused = true)]
    async fn test_budget_exhaustion_retires_queue() {
        let config = FrontierConfig {
            total_budget: 10,
            ..quick_config()
        };
        let f = frontier(config);

        for i in 0..12 {
            assert!(f.schedule(uri(&format!("http://a.example/{i}"))).await.unwrap());
        }

        for _ in 0..10 {
            let u = next_within(&f, 5).await.unwrap();
            finish_with(&f, u, FetchStatus::Success(200)).await;
        }

        assert!(next_within(&f, 5).await.is_none());

        let report = f.report().await;
        assert_eq!(report.succeeded, 10);
        assert_eq!(report.retired, 1);
        assert_eq!(report.queued, 2);

        let snapshots = f.queue_snapshots().await;
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].state, QueueState::Retired);
    }

    // Scenario: a transient error with a 30 second server-directed delay
    // keeps the URI invisible until the delay elapses.
    #[tokio::test(start_paused = true)]
    async fn test_retry_honors_delay() {
        let f = frontier(quick_config());

        f.schedule(uri("http://a.example/1")).await.unwrap();

        let mut u = next_within(&f, 5).await.unwrap();
        u.fetch_delay = Some(Duration::from_secs(30));
        finish_with(&f, u, FetchStatus::Timeout).await;

        assert!(timeout(Duration::from_secs(29), f.next()).await.is_err());

        let u = next_within(&f, 5).await.unwrap();
        assert_eq!(u.canonical, "http://a.example/1");
        assert_eq!(u.fetch_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_refunds_cost() {
        let f = frontier(quick_config());

        f.schedule(uri("http://a.example/1")).await.unwrap();

        let u = next_within(&f, 5).await.unwrap();
        finish_with(&f, u, FetchStatus::Deferred).await;

        let snapshots = f.queue_snapshots().await;
        assert_eq!(snapshots[0].total_expenditure, 0);

        // The deferred URI comes around again, attempt count untouched.
        let u = next_within(&f, 5).await.unwrap();
        assert_eq!(u.fetch_attempts, 0);
    }

    // Scenario: with hold-queues enabled a brand-new host starts inactive
    // and is only activated when nothing is ready.
    #[tokio::test(start_paused = true)]
    async fn test_hold_queues_defers_activation() {
        let config = FrontierConfig {
            hold_queues: true,
            ..quick_config()
        };
        let f = frontier(config);

        f.schedule(uri("http://a.example/1")).await.unwrap();

        let snapshots = f.queue_snapshots().await;
        assert_eq!(snapshots[0].state, QueueState::Inactive);
        assert_eq!(snapshots[0].session_balance, 0);

        let u = next_within(&f, 5).await.unwrap();
        assert_eq!(u.canonical, "http://a.example/1");
    }

    // Scenario: an inactive queue activates only when no ready queue
    // remains; a.example's ready work drains before b.example starts.
    #[tokio::test(start_paused = true)]
    async fn test_ready_work_precedes_inactive_activation() {
        let config = FrontierConfig {
            hold_queues: true,
            ..quick_config()
        };
        let f = frontier(config);

        f.schedule(uri("http://a.example/1")).await.unwrap();
        f.schedule(uri("http://a.example/2")).await.unwrap();
        f.schedule(uri("http://b.example/1")).await.unwrap();

        let u = next_within(&f, 5).await.unwrap();
        assert_eq!(u.class_key.as_deref(), Some("a.example"));
        finish_with(&f, u, FetchStatus::Success(200)).await;

        // a.example re-entered ready, so it outranks the still-held
        // b.example.
        let u = next_within(&f, 5).await.unwrap();
        assert_eq!(u.canonical, "http://a.example/2");

        let snapshots = f.queue_snapshots().await;
        let b = snapshots
            .iter()
            .find(|s| s.class_key == "b.example")
            .unwrap();
        assert_eq!(b.state, QueueState::Inactive);

        finish_with(&f, u, FetchStatus::Success(200)).await;

        let u = next_within(&f, 5).await.unwrap();
        assert_eq!(u.canonical, "http://b.example/1");
    }

    // Scenario: a 400s politeness wait exceeds the 300s threshold while
    // another host has ready work, so the queue deactivates instead of
    // sleeping.
    #[tokio::test(start_paused = true)]
    async fn test_long_snooze_deactivates_when_work_exists() {
        let config = FrontierConfig {
            politeness_delay: Duration::from_secs(400),
            snooze_long: Duration::from_secs(300),
            ..quick_config()
        };
        let f = frontier(config);

        f.schedule(uri("http://a.example/1")).await.unwrap();
        f.schedule(uri("http://a.example/2")).await.unwrap();
        f.schedule(uri("http://b.example/1")).await.unwrap();

        let u = next_within(&f, 5).await.unwrap();
        assert_eq!(u.class_key.as_deref(), Some("a.example"));
        finish_with(&f, u, FetchStatus::Success(200)).await;

        let snapshots = f.queue_snapshots().await;
        let a = snapshots
            .iter()
            .find(|s| s.class_key == "a.example")
            .unwrap();
        assert_eq!(a.state, QueueState::Inactive);

        let u = next_within(&f, 5).await.unwrap();
        assert_eq!(u.class_key.as_deref(), Some("b.example"));
    }

    // Scenario: the same 400s wait with no other ready work sleeps and
    // wakes exactly at 400s.
    #[tokio::test(start_paused = true)]
    async fn test_long_snooze_sleeps_when_alone() {
        let config = FrontierConfig {
            politeness_delay: Duration::from_secs(400),
            snooze_long: Duration::from_secs(300),
            ..quick_config()
        };
        let f = frontier(config);

        f.schedule(uri("http://a.example/1")).await.unwrap();
        f.schedule(uri("http://a.example/2")).await.unwrap();

        let u = next_within(&f, 5).await.unwrap();
        finish_with(&f, u, FetchStatus::Success(200)).await;

        assert!(timeout(Duration::from_secs(399), f.next()).await.is_err());

        let u = next_within(&f, 5).await.unwrap();
        assert_eq!(u.canonical, "http://a.example/2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_in_flight_per_class_key() {
        let f = frontier(quick_config());

        f.schedule(uri("http://a.example/1")).await.unwrap();
        f.schedule(uri("http://a.example/2")).await.unwrap();

        let first = next_within(&f, 5).await.unwrap();

        // Same host: the second draw blocks until the first completes.
        assert!(timeout(Duration::from_secs(2), f.next()).await.is_err());

        finish_with(&f, first, FetchStatus::Success(200)).await;

        let second = next_within(&f, 5).await.unwrap();
        assert_eq!(second.canonical, "http://a.example/2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_hosts_proceed_in_parallel() {
        let f = frontier(quick_config());

        f.schedule(uri("http://a.example/1")).await.unwrap();
        f.schedule(uri("http://b.example/1")).await.unwrap();

        let first = next_within(&f, 5).await.unwrap();
        let second = next_within(&f, 5).await.unwrap();

        assert_ne!(first.class_key, second.class_key);
        assert_eq!(f.report().await.in_flight, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_precedes_later_arrivals() {
        let f = frontier(quick_config());

        f.schedule(uri("http://a.example/1")).await.unwrap();
        f.schedule(uri("http://a.example/2")).await.unwrap();

        let u = next_within(&f, 5).await.unwrap();
        assert_eq!(u.canonical, "http://a.example/1");
        finish_with(&f, u, FetchStatus::ConnectFailed).await;

        // The retried URI outranks the one enqueued behind it.
        let u = next_within(&f, 5).await.unwrap();
        assert_eq!(u.canonical, "http://a.example/1");
        assert_eq!(u.fetch_attempts, 1);
        finish_with(&f, u, FetchStatus::Success(200)).await;

        let u = next_within(&f, 5).await.unwrap();
        assert_eq!(u.canonical, "http://a.example/2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_becomes_failure() {
        let config = FrontierConfig {
            max_retries: 2,
            ..quick_config()
        };
        let f = frontier(config);

        f.schedule(uri("http://a.example/1")).await.unwrap();

        let u = next_within(&f, 5).await.unwrap();
        finish_with(&f, u, FetchStatus::Timeout).await;

        let u = next_within(&f, 5).await.unwrap();
        assert_eq!(u.fetch_attempts, 1);
        finish_with(&f, u, FetchStatus::Timeout).await;

        let report = f.report().await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.queued, 0);
        assert!(next_within(&f, 2).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_charges_error_penalty() {
        let config = FrontierConfig {
            error_penalty: 100,
            ..quick_config()
        };
        let f = frontier(config);

        f.schedule(uri("http://a.example/1")).await.unwrap();

        let u = next_within(&f, 5).await.unwrap();
        finish_with(&f, u, FetchStatus::FatalProtocol).await;

        let report = f.report().await;
        assert_eq!(report.failed, 1);

        let snapshots = f.queue_snapshots().await;
        assert_eq!(snapshots[0].total_expenditure, 101);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disregard_refunds_cost() {
        let f = frontier(quick_config());

        f.schedule(uri("http://a.example/1")).await.unwrap();

        let u = next_within(&f, 5).await.unwrap();
        finish_with(&f, u, FetchStatus::OutOfScope).await;

        let report = f.report().await;
        assert_eq!(report.disregarded, 1);

        let snapshots = f.queue_snapshots().await;
        assert_eq!(snapshots[0].total_expenditure, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deleted_removes_and_forgets() {
        let f = frontier(quick_config());

        f.schedule(uri("http://a.example/1")).await.unwrap();
        f.schedule(uri("http://a.example/2")).await.unwrap();

        let removed = f.deleted(&uri("http://a.example/2")).await.unwrap();
        assert_eq!(removed, 1);

        let report = f.report().await;
        assert_eq!(report.queued, 1);
        assert_eq!(report.disregarded, 1);

        // Forgotten by the filter, so it may be scheduled again.
        assert!(f.schedule(uri("http://a.example/2")).await.unwrap());
        assert_eq!(f.report().await.queued, 2);
    }

    // Head protection lives on the queue's peek marker, so a deletion
    // interleaved anywhere between dispatch and finish leaves the worker's
    // URI and its neighbors untouched.
    #[tokio::test(start_paused = true)]
    async fn test_deleted_spares_dispatched_head() {
        let f = frontier(quick_config());

        f.schedule(uri("http://a.example/1")).await.unwrap();
        f.schedule(uri("http://a.example/2")).await.unwrap();

        let u = next_within(&f, 5).await.unwrap();
        assert_eq!(u.canonical, "http://a.example/1");

        let removed = f.deleted(&uri("http://a.example/1")).await.unwrap();
        assert_eq!(removed, 0);
        assert_eq!(f.report().await.queued, 2);

        // The worker's copy settles normally and the next URI is the one
        // enqueued behind it, not a shifted survivor.
        finish_with(&f, u, FetchStatus::Success(200)).await;

        let u = next_within(&f, 5).await.unwrap();
        assert_eq!(u.canonical, "http://a.example/2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_deleted_during_retry_spares_head() {
        let f = frontier(quick_config());

        f.schedule(uri("http://a.example/1")).await.unwrap();
        f.schedule(uri("http://a.example/2")).await.unwrap();

        let u = next_within(&f, 5).await.unwrap();

        assert_eq!(f.deleted(&uri("http://a.example/1")).await.unwrap(), 0);

        // The retry rewrites its own head in place; /2 survives behind it.
        finish_with(&f, u, FetchStatus::Timeout).await;

        let u = next_within(&f, 5).await.unwrap();
        assert_eq!(u.canonical, "http://a.example/1");
        assert_eq!(u.fetch_attempts, 1);
        finish_with(&f, u, FetchStatus::Success(200)).await;

        let u = next_within(&f, 5).await.unwrap();
        assert_eq!(u.canonical, "http://a.example/2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminate_unblocks_next() {
        let f = Arc::new(frontier(quick_config()));

        let waiter = {
            let f = f.clone();
            tokio::spawn(async move { f.next().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        f.terminate();

        let result = timeout(Duration::from_secs(5), waiter).await.unwrap().unwrap();
        assert!(matches!(result, Err(AppError::FrontierTerminated)));

        // Later calls fail immediately.
        assert!(matches!(f.next().await, Err(AppError::FrontierTerminated)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_idles_next() {
        let f = frontier(quick_config());

        f.schedule(uri("http://a.example/1")).await.unwrap();
        f.pause();

        assert!(timeout(Duration::from_secs(2), f.next()).await.is_err());

        f.unpause();
        assert!(next_within(&f, 5).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_budgets_unretires() {
        let config = FrontierConfig {
            total_budget: 1,
            ..quick_config()
        };
        let f = frontier(config);

        f.schedule(uri("http://a.example/1")).await.unwrap();
        f.schedule(uri("http://a.example/2")).await.unwrap();

        let u = next_within(&f, 5).await.unwrap();
        finish_with(&f, u, FetchStatus::Success(200)).await;

        assert!(next_within(&f, 2).await.is_none());
        assert_eq!(f.report().await.retired, 1);

        f.refresh_budgets(0).await;
        assert_eq!(f.report().await.retired, 0);

        let u = next_within(&f, 5).await.unwrap();
        assert_eq!(u.canonical, "http://a.example/2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_balance_cycles_through_inactive() {
        let config = FrontierConfig {
            balance_replenish: 2,
            ..quick_config()
        };
        let f = frontier(config);

        for i in 0..5 {
            f.schedule(uri(&format!("http://a.example/{i}"))).await.unwrap();
        }

        // Balance runs dry every two fetches; activation replenishes it and
        // all five still come through.
        for _ in 0..5 {
            let u = next_within(&f, 5).await.unwrap();
            finish_with(&f, u, FetchStatus::Success(200)).await;
        }

        let report = f.report().await;
        assert_eq!(report.succeeded, 5);
        assert!(report.is_exhausted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_accepted_uri_emitted_exactly_once() {
        let f = frontier(quick_config());
        let mut scheduled = HashSet::new();

        for host in ["a", "b", "c"] {
            for page in 0..3 {
                let u = uri(&format!("http://{host}.example/{page}"));
                scheduled.insert(u.canonical.clone());
                assert!(f.schedule(u).await.unwrap());
            }
        }

        let mut emitted = Vec::new();

        while let Some(u) = next_within(&f, 2).await {
            emitted.push(u.canonical.clone());
            finish_with(&f, u, FetchStatus::Success(200)).await;
        }

        assert_eq!(emitted.len(), scheduled.len());
        assert_eq!(
            emitted.iter().cloned().collect::<HashSet<_>>(),
            scheduled
        );
        assert!(f.report().await.is_exhausted());
    }

    struct CutoverPolicy {
        moved: AtomicBool,
    }

    impl QueueAssignmentPolicy for CutoverPolicy {
        fn class_key(&self, _uri: &CrawlUri) -> Result<String, AppError> {
            if self.moved.load(Ordering::Acquire) {
                Ok("after".to_string())
            } else {
                Ok("before".to_string())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_class_key_change_requeues_head() {
        let policy = Arc::new(CutoverPolicy {
            moved: AtomicBool::new(false),
        });
        let f = Frontier::with_policies(
            quick_config(),
            policy.clone(),
            policies::cost_policy_by_name("unit").unwrap(),
            Arc::new(MemUriSet::new()),
            Arc::new(NoopListener),
            None,
        )
        .unwrap();

        f.schedule(uri("http://a.example/1")).await.unwrap();

        // The key the head resolves to changes after enqueue.
        policy.moved.store(true, Ordering::Release);

        let u = next_within(&f, 5).await.unwrap();
        assert_eq!(u.class_key.as_deref(), Some("after"));
        assert_eq!(f.report().await.queued, 1);

        finish_with(&f, u, FetchStatus::Success(200)).await;
        assert!(f.report().await.is_exhausted());
    }

    struct FlushProbe {
        inner: MemUriSet,
        flushed: AtomicBool,
    }

    #[async_trait]
    impl AlreadyIncluded for FlushProbe {
        async fn add(&self, key: &str, uri: &CrawlUri) -> Result<bool, AppError> {
            self.inner.add(key, uri).await
        }

        async fn add_force(&self, key: &str, uri: &CrawlUri) -> Result<(), AppError> {
            self.inner.add_force(key, uri).await
        }

        async fn note(&self, key: &str) -> Result<(), AppError> {
            self.inner.note(key).await
        }

        async fn forget(&self, key: &str, uri: &CrawlUri) -> Result<(), AppError> {
            self.inner.forget(key, uri).await
        }

        async fn request_flush(&self) -> Result<(), AppError> {
            self.flushed.store(true, Ordering::Release);
            Ok(())
        }

        async fn count(&self) -> u64 {
            self.inner.count().await
        }

        async fn pending(&self) -> u64 {
            1
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_frontier_requests_filter_flush() {
        let probe = Arc::new(FlushProbe {
            inner: MemUriSet::new(),
            flushed: AtomicBool::new(false),
        });
        let f = Frontier::new(
            quick_config(),
            probe.clone(),
            Arc::new(NoopListener),
            None,
        )
        .unwrap();

        // No ready, snoozed, or in-flight work: one idle cycle asks the
        // filter to drain its buffer.
        assert!(timeout(Duration::from_secs(1), f.next()).await.is_err());
        assert!(probe.flushed.load(Ordering::Acquire));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_policy_fails_construction() {
        let config = FrontierConfig {
            cost_policy: "clairvoyant".to_string(),
            ..quick_config()
        };

        let result = Frontier::new(
            config,
            Arc::new(MemUriSet::new()),
            Arc::new(NoopListener),
            None,
        );

        assert!(matches!(result, Err(AppError::UnknownPolicy(_))));
    }
}
