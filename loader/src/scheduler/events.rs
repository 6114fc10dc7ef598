use serde::Deserialize;
use tokio::sync::oneshot;

use crate::error::LoadError;
use crate::request::{Priority, Stage};

/// Everything observable about a run, in emission order.
///
/// Delivered over a bounded broadcast channel; a subscriber that falls
/// behind sees `RecvError::Lagged` instead of stalling the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadEvent {
    SessionStarted {
        session_id: String,
        /// Wall clock, epoch milliseconds.
        started_at_ms: u64,
    },
    StageStarted {
        stage: Stage,
    },
    StageCompleted {
        stage: Stage,
        duration_ms: u64,
    },
    RequestDispatched {
        id: String,
        priority: Priority,
        /// 1 for the first try.
        attempt: u32,
    },
    RequestCompleted {
        id: String,
    },
    RequestFailed {
        id: String,
        error: LoadError,
        will_retry: bool,
    },
    /// A network or activity precondition did not hold at dispatch time.
    RequestSkipped {
        id: String,
        reason: String,
        carried_to: Option<Stage>,
    },
    Progress {
        completed: usize,
        failed: usize,
        total: usize,
    },
    Paused,
    Resumed,
    Cancelled,
    Invalidated {
        resource: String,
        count: usize,
    },
}

/// Terminal state of one request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome<T> {
    Completed(T),
    Failed(LoadError),
    Cancelled,
}

impl<T> RequestOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, RequestOutcome::Completed(_))
    }
}

/// Awaitable result of `Scheduler::add_request`.
#[derive(Debug)]
pub struct RequestHandle<T> {
    id: String,
    rx: oneshot::Receiver<RequestOutcome<T>>,
}

impl<T> RequestHandle<T> {
    pub(crate) fn new(id: String, rx: oneshot::Receiver<RequestOutcome<T>>) -> Self {
        Self { id, rx }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Waits for the request to settle. A dropped sender (session reset,
    /// id re-registered) reads as `Cancelled`.
    pub async fn outcome(self) -> RequestOutcome<T> {
        self.rx.await.unwrap_or(RequestOutcome::Cancelled)
    }
}

/// Out-of-band notification from the push channel.
///
/// Only `card` matters to the scheduler: it names the resource whose cached
/// result is stale.
#[derive(Debug, Clone, Deserialize)]
pub struct PushUpdate {
    pub card: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dropped_sender_reads_as_cancelled() {
        let (tx, rx) = oneshot::channel::<RequestOutcome<u8>>();
        let handle = RequestHandle::new("a".into(), rx);
        drop(tx);

        assert_eq!(handle.outcome().await, RequestOutcome::Cancelled);
    }

    #[tokio::test]
    async fn handle_yields_sent_outcome() {
        let (tx, rx) = oneshot::channel();
        let handle = RequestHandle::new("a".into(), rx);
        assert_eq!(handle.id(), "a");

        let _ = tx.send(RequestOutcome::Completed(9u8));
        assert!(handle.outcome().await.is_completed());
    }

    #[test]
    fn push_update_parses_wire_shape() {
        let u: PushUpdate =
            serde_json::from_str(r#"{ "card": "holdings", "data": { "rows": 3 } }"#).unwrap();
        assert_eq!(u.card, "holdings");
        assert_eq!(u.data["rows"], 3);

        let bare: PushUpdate = serde_json::from_str(r#"{ "card": "summary" }"#).unwrap();
        assert!(bare.data.is_null());
    }
}
