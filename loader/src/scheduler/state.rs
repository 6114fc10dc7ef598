use std::collections::{HashMap, HashSet};

use tokio::sync::oneshot;
use tokio::time::Instant;

use super::events::RequestOutcome;
use crate::request::{DataRequest, DependencyGraph, Priority, RequestQueue, Stage};
use crate::session::LoadingSession;

/// What the scheduler remembers about a registered id after it leaves the queue.
#[derive(Debug, Clone)]
pub(crate) struct RequestMeta {
    pub endpoint: String,
    /// Current stage assignment; moves on precondition carry-over.
    pub stage: Stage,
}

/// Everything guarded by the scheduler's state lock.
///
/// Every registered id is in exactly one of: the queue, `active`,
/// `completed`, `failed`.
pub(crate) struct SchedulerState<P, T> {
    pub queue: RequestQueue<P, T>,
    pub graph: DependencyGraph,
    pub active: HashSet<String>,
    pub completed: HashSet<String>,
    pub failed: HashSet<String>,
    pub registry: HashMap<String, RequestMeta>,
    pub session: Option<LoadingSession>,
    pub paused: bool,
    /// Bumped on cancel and session replacement; work tagged with an older
    /// generation is discarded.
    pub generation: u64,
    pub waiters: HashMap<String, oneshot::Sender<RequestOutcome<T>>>,
}

impl<P, T> Default for SchedulerState<P, T> {
    fn default() -> Self {
        Self {
            queue: RequestQueue::new(),
            graph: DependencyGraph::new(),
            active: HashSet::new(),
            completed: HashSet::new(),
            failed: HashSet::new(),
            registry: HashMap::new(),
            session: None,
            paused: false,
            generation: 0,
            waiters: HashMap::new(),
        }
    }
}

impl<P, T> SchedulerState<P, T> {
    /// Drops all per-session bookkeeping and returns the orphaned waiters.
    pub fn reset(&mut self) -> Vec<oneshot::Sender<RequestOutcome<T>>> {
        self.queue.clear();
        self.graph.clear();
        self.active.clear();
        self.completed.clear();
        self.failed.clear();
        self.registry.clear();
        self.session = None;
        self.generation += 1;

        self.waiters.drain().map(|(_, tx)| tx).collect()
    }

    pub fn begin_session(
        &mut self,
        id: String,
        now: Instant,
    ) -> Vec<oneshot::Sender<RequestOutcome<T>>> {
        let orphans = self.reset();
        self.paused = false;
        self.session = Some(LoadingSession::new(id, now));
        orphans
    }

    /// Queues `req` and records it everywhere it needs to be known.
    ///
    /// Dependencies are recorded as-is; unknown ids are fine.
    pub fn register(
        &mut self,
        req: DataRequest<P, T>,
        waiter: oneshot::Sender<RequestOutcome<T>>,
        now: Instant,
    ) {
        self.graph.add(&req.id, &req.dependencies);
        self.registry.insert(
            req.id.clone(),
            RequestMeta {
                endpoint: req.endpoint.clone(),
                stage: req.stage,
            },
        );
        if let Some(session) = self.session.as_mut() {
            session.register(&req.id, req.stage, now);
        }
        self.waiters.insert(req.id.clone(), waiter);
        self.queue.push(req);
    }

    /// Queued ids for this stage and tier whose dependencies have all completed.
    pub fn eligible(&self, stage: Stage, priority: Priority) -> Vec<String> {
        let completed = &self.completed;
        self.queue.eligible_ids(stage, priority, |r| {
            r.dependencies.iter().all(|d| completed.contains(d))
        })
    }

    /// Moves `ids` from the queue into the active set.
    pub fn activate(&mut self, ids: &[String]) -> Vec<DataRequest<P, T>> {
        let batch = self.queue.take(ids);
        for r in &batch {
            self.active.insert(r.id.clone());
        }
        batch
    }

    /// Moves queued requests that transitively wait on `id` into `to` when
    /// they sit in an earlier stage, so they follow a carried dependency.
    /// Returns the moved ids.
    pub fn carry_dependents(&mut self, id: &str, to: Stage, now: Instant) -> Vec<String> {
        let mut moved = Vec::new();
        let mut frontier = vec![id.to_string()];

        while let Some(dep) = frontier.pop() {
            let dependents: Vec<String> = self.graph.dependents_of(&dep).cloned().collect();
            for d in dependents {
                let Some(from) = self.queue.defer(&d, to) else {
                    continue;
                };
                if let Some(session) = self.session.as_mut() {
                    session.reassign(&d, from, to, now);
                }
                if let Some(meta) = self.registry.get_mut(&d) {
                    meta.stage = to;
                }
                frontier.push(d.clone());
                moved.push(d);
            }
        }

        moved
    }

    pub fn progress_counts(&self) -> (usize, usize, usize) {
        self.session
            .as_ref()
            .map(|s| (s.completed_requests, s.failed_requests, s.total_requests))
            .unwrap_or_default()
    }
}
