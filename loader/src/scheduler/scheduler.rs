//! Progressive loading scheduler.
//!
//! Responsibilities:
//! - Walk the stages in fixed order, and the priority tiers in fixed order
//!   within each stage.
//! - Dispatch eligible requests in batches bounded by the active strategy.
//! - Track session progress and deliver outcomes through handles and events.
//!
//! Non-responsibilities:
//! - Issuing network calls (the `Fetcher` does this).
//! - Classifying user activity (`ActivityMonitor` does this).
//!
//! Ordering properties:
//! - Batch N+1 of a tier never starts before batch N has settled.
//! - A request is dispatched only once all its dependencies have completed.
//! - Pause is honored at stage and tier boundaries; cancellation at batch
//!   boundaries. In-flight fetches are never interrupted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use common::logger::{TraceId, annotate_span, child_span, root_span};
use common::time::now_ms;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, instrument};
use uuid::Uuid;

use super::batch::partition;
use super::events::{LoadEvent, PushUpdate, RequestHandle, RequestOutcome};
use super::state::SchedulerState;
use crate::activity::{ActivityMonitor, UserActivity};
use crate::config::LoaderConfig;
use crate::error::{LoadError, SchedulerError};
use crate::execution::Fetcher;
use crate::metrics::{CounterSnapshot, Counters};
use crate::request::{DataRequest, PartialRequest, Priority, Stage};
use crate::session::{ProgressSnapshot, ResultCache};
use crate::strategy::{NetworkConditionSource, Strategy, select_strategy};

pub(super) type Request<F> = DataRequest<<F as Fetcher>::Params, <F as Fetcher>::Output>;

/// A run stopped early (pause or cancellation).
pub(super) struct Halted;

/// Owned scheduler instance. Cloning shares the same state.
pub struct Scheduler<F: Fetcher> {
    inner: Arc<Inner<F>>,
}

impl<F: Fetcher> Clone for Scheduler<F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

pub(super) struct Inner<F: Fetcher> {
    pub fetcher: F,
    pub network: Arc<dyn NetworkConditionSource>,
    pub config: LoaderConfig,
    pub counters: Counters,
    pub cache: ResultCache<F::Output>,
    pub state: Mutex<SchedulerState<F::Params, F::Output>>,
    pub activity: Mutex<Option<watch::Receiver<UserActivity>>>,
    pub events: broadcast::Sender<LoadEvent>,
    running: AtomicBool,
}

/// Clears the running flag when a run ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, SchedulerError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SchedulerError::AlreadyRunning)?;
        Ok(Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

enum StageEntry {
    Run,
    Skip,
    Halt,
}

impl<F: Fetcher> Scheduler<F> {
    pub fn new(fetcher: F, network: Arc<dyn NetworkConditionSource>, config: LoaderConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            inner: Arc::new(Inner {
                fetcher,
                network,
                config,
                counters: Counters::default(),
                cache: ResultCache::new(),
                state: Mutex::new(SchedulerState::default()),
                activity: Mutex::new(None),
                events,
                running: AtomicBool::new(false),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LoadEvent> {
        self.inner.events.subscribe()
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.inner.counters.snapshot()
    }

    /// Strategy for the configured device class and the live network reading.
    pub fn current_strategy(&self) -> Strategy {
        self.inner.current_strategy()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    pub fn is_paused(&self) -> bool {
        self.inner.state.lock().paused
    }

    /// Replaces the live session. Queued work and outcomes of the previous
    /// session are dropped (its handles resolve `Cancelled`); cached results
    /// are kept.
    #[instrument(skip(self))]
    pub fn start_session(&self, id: Option<String>) -> String {
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());

        let orphans = {
            let mut st = self.inner.state.lock();
            st.begin_session(id.clone(), Instant::now())
        };
        cancel_waiters(orphans);

        info!(session_id = %id, "loading session started");
        self.inner.emit(LoadEvent::SessionStarted {
            session_id: id.clone(),
            started_at_ms: now_ms(),
        });
        id
    }

    /// Queues a request. Starts a session first if none is live.
    pub fn add_request(
        &self,
        req: DataRequest<F::Params, F::Output>,
    ) -> RequestHandle<F::Output> {
        let (tx, rx) = oneshot::channel();
        let id = req.id.clone();

        let started = {
            let mut st = self.inner.state.lock();
            let now = Instant::now();

            let started = if st.session.is_none() {
                let sid = Uuid::new_v4().to_string();
                cancel_waiters(st.begin_session(sid.clone(), now));
                Some(sid)
            } else {
                None
            };

            debug!(
                request_id = %req.id,
                priority = %req.priority,
                stage = %req.stage,
                dependencies = req.dependencies.len(),
                "request registered"
            );
            st.register(req, tx, now);
            started
        };

        if let Some(session_id) = started {
            info!(%session_id, "loading session started implicitly");
            self.inner.emit(LoadEvent::SessionStarted {
                session_id,
                started_at_ms: now_ms(),
            });
        }

        RequestHandle::new(id, rx)
    }

    /// Queues requests whose priority and stage may be inferred from the endpoint.
    pub fn add_requests<I>(&self, reqs: I) -> Vec<RequestHandle<F::Output>>
    where
        I: IntoIterator<Item = PartialRequest<F::Params, F::Output>>,
    {
        reqs.into_iter()
            .map(|p| self.add_request(p.resolve()))
            .collect()
    }

    /// Runs the live session until every stage has been processed, or until
    /// a pause or cancellation stops it.
    ///
    /// A paused run is continued by calling this again after `resume`;
    /// stages already completed are not revisited.
    pub async fn process_queue(&self) -> Result<(), SchedulerError> {
        let inner = &*self.inner;
        let _guard = RunGuard::acquire(&inner.running)?;

        let (session_id, generation) = {
            let st = inner.state.lock();
            let session = st.session.as_ref().ok_or(SchedulerError::NoActiveSession)?;
            (session.id.clone(), st.generation)
        };

        let span = root_span("process_queue", &TraceId::new(session_id.clone()));
        async {
            annotate_span(&session_id, None);
            inner.run(&session_id, generation).await;
        }
        .instrument(span)
        .await;

        Ok(())
    }

    pub fn progress(&self) -> Option<ProgressSnapshot> {
        let st = self.inner.state.lock();
        st.session
            .as_ref()
            .map(|s| s.progress(&st.completed, &st.failed, st.paused))
    }

    pub fn cached_result(&self, id: &str) -> Option<F::Output> {
        self.inner.cache.get(id)
    }

    /// Latest error for `id`; cleared when a later attempt succeeds.
    pub fn request_error(&self, id: &str) -> Option<LoadError> {
        self.inner.cache.error(id)
    }

    pub fn pause(&self) {
        let was_paused = std::mem::replace(&mut self.inner.state.lock().paused, true);
        if !was_paused {
            info!("loading paused");
            self.inner.emit(LoadEvent::Paused);
        }
    }

    /// Clears the pause flag only; the caller re-invokes `process_queue`.
    pub fn resume(&self) {
        let was_paused = std::mem::replace(&mut self.inner.state.lock().paused, false);
        if was_paused {
            info!("loading resumed");
            self.inner.emit(LoadEvent::Resumed);
        }
    }

    /// Drops the session with all queued work and cached results.
    ///
    /// In-flight fetches run to completion but their results are discarded;
    /// a running `process_queue` returns at the next batch boundary.
    #[instrument(skip(self))]
    pub fn cancel(&self) {
        let orphans = {
            let mut st = self.inner.state.lock();
            st.paused = true;
            let orphans = st.reset();
            self.inner.cache.clear();
            orphans
        };
        let outstanding = orphans.len();
        cancel_waiters(orphans);

        info!(outstanding, "loading cancelled");
        self.inner.emit(LoadEvent::Cancelled);
    }

    /// Forgets every completed result whose id or endpoint is `resource`, so
    /// registering it again re-fetches. Returns how many were dropped.
    #[instrument(skip(self))]
    pub fn invalidate(&self, resource: &str) -> usize {
        let count = {
            let mut st = self.inner.state.lock();
            let dropped = self.inner.cache.remove_matching(resource);
            let now = Instant::now();

            for id in &dropped {
                if !st.completed.remove(id) {
                    continue;
                }
                st.graph.remove(id);
                if let Some(meta) = st.registry.remove(id) {
                    if let Some(session) = st.session.as_mut() {
                        session.forget_completed(id, meta.stage, now);
                    }
                }
            }
            dropped.len()
        };

        if count > 0 {
            self.inner
                .counters
                .invalidated
                .fetch_add(count as u64, Ordering::Relaxed);
        }
        info!(count, "cached results invalidated");
        self.inner.emit(LoadEvent::Invalidated {
            resource: resource.to_string(),
            count,
        });
        count
    }

    pub fn apply_push_update(&self, update: &PushUpdate) -> usize {
        debug!(card = %update.card, "push update received");
        self.invalidate(&update.card)
    }

    /// Feeds `monitor` into precondition checks and bridges its transitions
    /// into pause/resume.
    ///
    /// Going inactive pauses the run unless it is still in (or before) the
    /// initial stage; becoming active again clears a pause. The bridge task
    /// ends when the monitor or the scheduler is dropped.
    pub fn attach_activity(&self, monitor: &ActivityMonitor) -> JoinHandle<()> {
        let mut rx = monitor.subscribe();
        *self.inner.activity.lock() = Some(rx.clone());

        let weak: Weak<Inner<F>> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let state = *rx.borrow_and_update();
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                Scheduler { inner }.on_activity(state);
            }
            debug!("activity bridge stopped");
        })
    }

    fn on_activity(&self, state: UserActivity) {
        let (paused, past_initial) = {
            let st = self.inner.state.lock();
            let past_initial = st
                .session
                .as_ref()
                .and_then(|s| s.current_stage)
                .is_some_and(|s| s != Stage::Initial);
            (st.paused, past_initial)
        };

        match state {
            UserActivity::Inactive if !paused && past_initial => {
                info!("user inactive; pausing background loading");
                self.pause();
            }
            UserActivity::Active if paused => {
                info!("user active; resuming");
                self.resume();
            }
            _ => {}
        }
    }
}

fn cancel_waiters<T>(waiters: Vec<oneshot::Sender<RequestOutcome<T>>>) {
    for tx in waiters {
        let _ = tx.send(RequestOutcome::Cancelled);
    }
}

impl<F: Fetcher> Inner<F> {
    pub(super) fn emit(&self, ev: LoadEvent) {
        // No subscribers is fine.
        let _ = self.events.send(ev);
    }

    pub(super) fn current_strategy(&self) -> Strategy {
        select_strategy(self.config.device_class, self.network.current().as_ref())
    }

    pub(super) fn is_current(&self, generation: u64) -> bool {
        self.state.lock().generation == generation
    }

    async fn run(&self, session_id: &str, generation: u64) {
        info!("run started");

        for stage in Stage::ALL {
            match self.enter_stage(stage, generation) {
                StageEntry::Halt => return,
                StageEntry::Skip => continue,
                StageEntry::Run => {}
            }

            let strategy = self.current_strategy();
            debug!(%stage, ?strategy, "strategy selected");
            self.emit(LoadEvent::StageStarted { stage });

            let outcome = async {
                annotate_span(session_id, Some(stage.as_str()));
                self.run_stage(stage, &strategy, generation).await
            }
            .instrument(child_span("stage"))
            .await;

            if outcome.is_err() {
                return;
            }
            self.finish_stage(stage, generation);
        }

        let still_queued = self.state.lock().queue.len();
        info!(still_queued, "run finished");
    }

    fn enter_stage(&self, stage: Stage, generation: u64) -> StageEntry {
        let mut st = self.state.lock();
        if st.generation != generation {
            return StageEntry::Halt;
        }
        if st.paused {
            info!(%stage, "paused at stage boundary");
            return StageEntry::Halt;
        }

        let now = Instant::now();
        let Some(session) = st.session.as_mut() else {
            return StageEntry::Halt;
        };

        let record = session.stage_mut(stage);
        if record.completed {
            return StageEntry::Skip;
        }
        if record.request_ids.is_empty() {
            record.finish(now);
            session.touch(now);
            return StageEntry::Skip;
        }

        record.start(now);
        session.current_stage = Some(stage);
        session.touch(now);
        StageEntry::Run
    }

    async fn run_stage(
        &self,
        stage: Stage,
        strategy: &Strategy,
        generation: u64,
    ) -> Result<(), Halted> {
        let delay = strategy.stage_delay(stage);
        if stage != Stage::Initial && !delay.is_zero() {
            debug!(delay_ms = delay.as_millis() as u64, "stage pre-delay");
            tokio::time::sleep(delay).await;
        }

        // Completions can make same-stage dependents eligible; sweep the
        // tiers again until a pass dispatches nothing.
        loop {
            let dispatched = self.sweep(stage, strategy, generation).await?;
            if dispatched == 0 {
                return Ok(());
            }
            debug!(dispatched, "tier sweep done");
        }
    }

    async fn sweep(
        &self,
        stage: Stage,
        strategy: &Strategy,
        generation: u64,
    ) -> Result<usize, Halted> {
        let mut dispatched = 0;

        for priority in Priority::ALL {
            let eligible = {
                let st = self.state.lock();
                if st.generation != generation {
                    return Err(Halted);
                }
                st.eligible(stage, priority)
            };
            if eligible.is_empty() {
                continue;
            }

            let size = strategy.batch_size(priority);
            if size == 0 {
                Counters::incr(&self.counters.tiers_skipped_by_limit);
                debug!(%priority, waiting = eligible.len(), "tier forgone by strategy");
                continue;
            }

            let paused = self.state.lock().paused;
            if paused {
                info!(%stage, %priority, "paused at tier boundary");
                return Err(Halted);
            }

            for ids in partition(&eligible, size) {
                let batch = {
                    let mut st = self.state.lock();
                    if st.generation != generation {
                        return Err(Halted);
                    }
                    st.activate(ids)
                };
                if batch.is_empty() {
                    continue;
                }

                Counters::incr(&self.counters.batches);
                dispatched += batch.len();
                debug!(%priority, size = batch.len(), "dispatching batch");

                join_all(
                    batch
                        .into_iter()
                        .map(|req| self.process_request(req, strategy, generation)),
                )
                .await;
            }
        }

        Ok(dispatched)
    }

    fn finish_stage(&self, stage: Stage, generation: u64) {
        let duration_ms = {
            let mut st = self.state.lock();
            if st.generation != generation {
                return;
            }
            let now = Instant::now();
            let Some(session) = st.session.as_mut() else {
                return;
            };

            let record = session.stage_mut(stage);
            record.finish(now);
            let duration_ms = record
                .start_time
                .map(|t| now.duration_since(t).as_millis() as u64)
                .unwrap_or_default();
            session.touch(now);
            duration_ms
        };

        Counters::incr(&self.counters.stages_completed);
        info!(%stage, duration_ms, "stage completed");
        self.emit(LoadEvent::StageCompleted { stage, duration_ms });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::PriorityHint;
    use crate::strategy::{NetworkConditions, NetworkQuality, SharedNetworkConditions};
    use async_trait::async_trait;
    use tracing_test::traced_test;

    struct Instant200;

    #[async_trait]
    impl Fetcher for Instant200 {
        type Params = ();
        type Output = String;

        async fn fetch(&self, endpoint: &str, _: &(), _: PriorityHint) -> anyhow::Result<String> {
            Ok(format!("ok:{endpoint}"))
        }
    }

    fn scheduler() -> Scheduler<Instant200> {
        let net = SharedNetworkConditions::new(Some(NetworkConditions {
            quality: NetworkQuality::Fast,
            rtt_ms: 20,
        }));
        Scheduler::new(Instant200, Arc::new(net), LoaderConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn process_without_session_is_rejected() {
        let s = scheduler();
        assert_eq!(s.process_queue().await, Err(SchedulerError::NoActiveSession));
        assert!(!s.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn add_request_starts_a_session_implicitly() {
        let s = scheduler();
        assert!(s.progress().is_none());

        let _h = s.add_request(DataRequest::new("a", "/api/summary", ()));

        let p = s.progress().expect("session");
        assert_eq!(p.total_requests, 1);
        assert_eq!(p.pending_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn start_session_keeps_cached_results() {
        let s = scheduler();
        let h = s.add_request(
            DataRequest::new("a", "/api/summary", ()).with_priority(Priority::Critical),
        );
        s.process_queue().await.unwrap();
        assert!(h.outcome().await.is_completed());

        s.start_session(Some("next".into()));

        assert_eq!(s.cached_result("a").as_deref(), Some("ok:/api/summary"));
        let p = s.progress().unwrap();
        assert_eq!(p.session_id, "next");
        assert_eq!(p.total_requests, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn start_session_cancels_outstanding_handles() {
        let s = scheduler();
        let h = s.add_request(DataRequest::new("a", "/api/x", ()));

        s.start_session(None);

        assert_eq!(h.outcome().await, RequestOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_and_resume_emit_once_per_transition() {
        let s = scheduler();
        let mut events = s.subscribe();

        s.pause();
        s.pause();
        s.resume();
        s.resume();

        assert_eq!(events.recv().await.unwrap(), LoadEvent::Paused);
        assert_eq!(events.recv().await.unwrap(), LoadEvent::Resumed);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn logs_stage_completion() {
        let s = scheduler();
        s.add_request(DataRequest::new("a", "/api/x", ()).with_stage(Stage::Initial));

        s.process_queue().await.unwrap();

        assert!(logs_contain("stage completed"));
        assert!(logs_contain("run finished"));
        assert!(logs_contain("still_queued=0"));
    }
}
