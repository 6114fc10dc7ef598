//! Per-request dispatch: preconditions, attempts with in-place retry, and
//! settling the outcome into scheduler state.

use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::events::{LoadEvent, RequestOutcome};
use super::scheduler::{Inner, Request};
use crate::activity::UserActivity;
use crate::error::LoadError;
use crate::execution::{Fetcher, attempt};
use crate::metrics::Counters;
use crate::strategy::Strategy;

impl<F: Fetcher> Inner<F> {
    /// Activity defaults to active when no monitor is attached.
    fn activity_state(&self) -> UserActivity {
        self.activity
            .lock()
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(UserActivity::Active)
    }

    /// Drives one request to a terminal state (or carries it forward).
    ///
    /// Failed attempts with budget left keep the request's active slot and
    /// retry after backoff, so the batch settles only once every request in
    /// it has completed or exhausted its retries.
    #[instrument(skip_all, fields(request_id = %req.id, priority = %req.priority))]
    pub(super) async fn process_request(
        &self,
        req: Request<F>,
        strategy: &Strategy,
        generation: u64,
    ) {
        let network = self.network.current();
        if let Some(reason) = req.unmet_precondition(self.activity_state(), network.as_ref()) {
            self.carry_forward(req, reason, generation);
            return;
        }

        let timeout = req
            .timeout
            .unwrap_or_else(|| strategy.timeout(req.priority));
        let mut retries_left = req
            .retry_attempts
            .unwrap_or_else(|| self.config.default_retries_for(req.priority));
        let mut attempt_no = 1u32;

        loop {
            if !self.is_current(generation) {
                debug!("session replaced; request dropped");
                return;
            }

            Counters::incr(&self.counters.dispatched);
            self.emit(LoadEvent::RequestDispatched {
                id: req.id.clone(),
                priority: req.priority,
                attempt: attempt_no,
            });

            let result = attempt(&self.fetcher, &req, timeout, self.config.slow_request()).await;

            let err = match result {
                Ok(data) => {
                    self.record_success(&req, data, generation);
                    return;
                }
                Err(err) => err,
            };

            if matches!(err, LoadError::Timeout { .. }) {
                Counters::incr(&self.counters.timed_out);
            }

            if retries_left == 0 {
                self.record_failure(&req, err, generation);
                return;
            }
            if !self.is_current(generation) {
                return;
            }

            let delay = self.config.backoff_delay(retries_left);
            warn!(
                attempt = attempt_no,
                retries_left,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "attempt failed; retrying"
            );

            self.cache.set_error(&req.id, err.clone());
            Counters::incr(&self.counters.retried);
            self.emit(LoadEvent::RequestFailed {
                id: req.id.clone(),
                error: err,
                will_retry: true,
            });

            tokio::time::sleep(delay).await;
            retries_left -= 1;
            attempt_no += 1;
        }
    }

    /// Re-queues a request into the next stage; fails it when there is none.
    fn carry_forward(&self, mut req: Request<F>, reason: String, generation: u64) {
        Counters::incr(&self.counters.skipped_precondition);

        let Some(next) = req.stage.next() else {
            warn!(%reason, "precondition unmet in the final stage");
            self.emit(LoadEvent::RequestSkipped {
                id: req.id.clone(),
                reason: reason.clone(),
                carried_to: None,
            });
            self.record_failure(&req, LoadError::PreconditionUnmet(reason), generation);
            return;
        };

        let id = req.id.clone();
        let followers = {
            let mut st = self.state.lock();
            if st.generation != generation {
                return;
            }
            let now = Instant::now();

            st.active.remove(&id);
            if let Some(session) = st.session.as_mut() {
                session.reassign(&id, req.stage, next, now);
            }
            if let Some(meta) = st.registry.get_mut(&id) {
                meta.stage = next;
            }

            req.stage = next;
            st.queue.push(req);

            // Dependents queued behind it would be stranded in a finished stage.
            st.carry_dependents(&id, next, now)
        };

        info!(%reason, carried_to = %next, ?followers, "precondition unmet; carried forward");
        self.emit(LoadEvent::RequestSkipped {
            id: id.clone(),
            reason,
            carried_to: Some(next),
        });
        for follower in followers {
            self.emit(LoadEvent::RequestSkipped {
                id: follower,
                reason: format!("dependency {id} carried forward"),
                carried_to: Some(next),
            });
        }
    }

    fn record_success(&self, req: &Request<F>, data: F::Output, generation: u64) {
        let (waiter, (completed, failed, total), ready) = {
            let mut st = self.state.lock();
            if st.generation != generation {
                debug!("late result discarded");
                return;
            }
            let now = Instant::now();

            st.active.remove(&req.id);
            st.completed.insert(req.id.clone());
            self.cache.insert(&req.id, &req.endpoint, data.clone());
            if let Some(session) = st.session.as_mut() {
                session.record_completed(now);
            }

            let ready = st.graph.ready_dependents(&req.id, &st.completed);
            let waiter = st.waiters.remove(&req.id);
            (waiter, st.progress_counts(), ready)
        };

        Counters::incr(&self.counters.completed);
        if ready.is_empty() {
            info!("request completed");
        } else {
            info!(?ready, "request completed; dependents now eligible");
        }

        if let Some(tx) = waiter {
            let _ = tx.send(RequestOutcome::Completed(data));
        }
        self.emit(LoadEvent::RequestCompleted {
            id: req.id.clone(),
        });
        self.emit(LoadEvent::Progress {
            completed,
            failed,
            total,
        });
    }

    fn record_failure(&self, req: &Request<F>, err: LoadError, generation: u64) {
        let (waiter, (completed, failed, total), blocked) = {
            let mut st = self.state.lock();
            if st.generation != generation {
                return;
            }
            let now = Instant::now();

            st.active.remove(&req.id);
            st.failed.insert(req.id.clone());
            self.cache.set_error(&req.id, err.clone());
            if let Some(session) = st.session.as_mut() {
                session.record_failed(&req.id, req.stage, err.clone(), now);
            }

            let blocked: Vec<String> = st.graph.dependents_of(&req.id).cloned().collect();
            let waiter = st.waiters.remove(&req.id);
            (waiter, st.progress_counts(), blocked)
        };

        Counters::incr(&self.counters.failed);
        warn!(error = %err, "request failed");
        if !blocked.is_empty() {
            warn!(?blocked, "dependents of a failed request will not be dispatched");
        }

        if let Some(tx) = waiter {
            let _ = tx.send(RequestOutcome::Failed(err.clone()));
        }
        self.emit(LoadEvent::RequestFailed {
            id: req.id.clone(),
            error: err,
            will_retry: false,
        });
        self.emit(LoadEvent::Progress {
            completed,
            failed,
            total,
        });
    }
}
