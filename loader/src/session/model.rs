use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use super::progress::{ProgressSnapshot, StageProgress, StageStatus, estimate_remaining_ms};
use crate::error::LoadError;
use crate::request::Stage;

/// Timing and membership for one stage of a session.
#[derive(Clone, Debug)]
pub struct StageRecord {
    pub stage: Stage,
    pub started: bool,
    pub completed: bool,
    pub start_time: Option<Instant>,
    pub end_time: Option<Instant>,
    /// Requests currently assigned to this stage.
    pub request_ids: BTreeSet<String>,
    /// Terminal failures of requests assigned to this stage.
    pub errors: Vec<(String, LoadError)>,
}

impl StageRecord {
    fn new(stage: Stage) -> Self {
        Self {
            stage,
            started: false,
            completed: false,
            start_time: None,
            end_time: None,
            request_ids: BTreeSet::new(),
            errors: Vec::new(),
        }
    }

    /// Keeps the first start time when a paused stage is re-entered.
    pub fn start(&mut self, now: Instant) {
        self.started = true;
        self.start_time.get_or_insert(now);
    }

    pub fn finish(&mut self, now: Instant) {
        self.completed = true;
        self.end_time = Some(now);
    }

    /// New work arrived for a stage that already finished.
    fn reopen(&mut self) {
        self.completed = false;
        self.end_time = None;
    }

    fn status(&self) -> StageStatus {
        if self.completed {
            StageStatus::Complete
        } else if self.started {
            StageStatus::Loading
        } else {
            StageStatus::Pending
        }
    }
}

/// One "load everything for this view" run.
///
/// Counters are kept in step with the scheduler's completed/failed sets;
/// `last_update` moves only on mutation so progress reads are repeatable.
#[derive(Clone, Debug)]
pub struct LoadingSession {
    pub id: String,
    pub started_at: DateTime<Utc>,
    start: Instant,
    last_update: Instant,
    pub current_stage: Option<Stage>,
    stages: [StageRecord; 4],
    pub total_requests: usize,
    pub completed_requests: usize,
    pub failed_requests: usize,
}

impl LoadingSession {
    pub fn new(id: impl Into<String>, now: Instant) -> Self {
        Self {
            id: id.into(),
            started_at: Utc::now(),
            start: now,
            last_update: now,
            current_stage: None,
            stages: Stage::ALL.map(StageRecord::new),
            total_requests: 0,
            completed_requests: 0,
            failed_requests: 0,
        }
    }

    pub fn stage(&self, stage: Stage) -> &StageRecord {
        &self.stages[stage.index()]
    }

    pub fn stage_mut(&mut self, stage: Stage) -> &mut StageRecord {
        &mut self.stages[stage.index()]
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_update = now;
    }

    pub fn register(&mut self, id: &str, stage: Stage, now: Instant) {
        let record = self.stage_mut(stage);
        if record.completed {
            record.reopen();
        }
        record.request_ids.insert(id.to_string());
        self.total_requests += 1;
        self.touch(now);
    }

    /// Moves a request to another stage (precondition carry-over).
    pub fn reassign(&mut self, id: &str, from: Stage, to: Stage, now: Instant) {
        self.stage_mut(from).request_ids.remove(id);

        let record = self.stage_mut(to);
        if record.completed {
            record.reopen();
        }
        record.request_ids.insert(id.to_string());
        self.touch(now);
    }

    pub fn record_completed(&mut self, now: Instant) {
        self.completed_requests += 1;
        self.touch(now);
    }

    pub fn record_failed(&mut self, id: &str, stage: Stage, err: LoadError, now: Instant) {
        self.failed_requests += 1;
        self.stage_mut(stage).errors.push((id.to_string(), err));
        self.touch(now);
    }

    /// Drops a completed request from the books (cache invalidation).
    pub fn forget_completed(&mut self, id: &str, stage: Stage, now: Instant) {
        if self.stage_mut(stage).request_ids.remove(id) {
            self.total_requests = self.total_requests.saturating_sub(1);
            self.completed_requests = self.completed_requests.saturating_sub(1);
            self.touch(now);
        }
    }

    pub fn progress(
        &self,
        completed: &HashSet<String>,
        failed: &HashSet<String>,
        paused: bool,
    ) -> ProgressSnapshot {
        let elapsed_ms = self.last_update.duration_since(self.start).as_millis() as u64;

        let stages = self
            .stages
            .iter()
            .map(|r| StageProgress {
                stage: r.stage,
                total: r.request_ids.len(),
                completed: r.request_ids.iter().filter(|id| completed.contains(*id)).count(),
                failed: r.request_ids.iter().filter(|id| failed.contains(*id)).count(),
                status: r.status(),
            })
            .collect();

        let settled = self.completed_requests + self.failed_requests;
        let percent_complete = if self.total_requests == 0 {
            0.0
        } else {
            self.completed_requests as f64 * 100.0 / self.total_requests as f64
        };

        ProgressSnapshot {
            session_id: self.id.clone(),
            started_at: self.started_at,
            current_stage: self.current_stage,
            total_requests: self.total_requests,
            completed_requests: self.completed_requests,
            failed_requests: self.failed_requests,
            pending_requests: self.total_requests.saturating_sub(settled),
            percent_complete,
            elapsed_ms,
            estimated_remaining_ms: estimate_remaining_ms(
                elapsed_ms,
                self.completed_requests,
                self.total_requests,
            ),
            paused,
            stages,
        }
    }
}
