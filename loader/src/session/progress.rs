use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::request::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Loading,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageProgress {
    pub stage: Stage,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub status: StageStatus,
}

/// Point-in-time view of a session, derived purely from scheduler state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub current_stage: Option<Stage>,
    pub total_requests: usize,
    pub completed_requests: usize,
    pub failed_requests: usize,
    pub pending_requests: usize,
    pub percent_complete: f64,
    /// Session start to the most recent state change.
    pub elapsed_ms: u64,
    pub estimated_remaining_ms: Option<u64>,
    pub paused: bool,
    pub stages: Vec<StageProgress>,
}

/// Linear extrapolation: `elapsed / (completed / total) - elapsed`, floored at 0.
///
/// `None` until something has completed.
pub fn estimate_remaining_ms(elapsed_ms: u64, completed: usize, total: usize) -> Option<u64> {
    if completed == 0 || total == 0 {
        return None;
    }

    let fraction = completed as f64 / total as f64;
    let remaining = elapsed_ms as f64 / fraction - elapsed_ms as f64;

    Some(remaining.max(0.0).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_estimate_before_first_completion() {
        assert_eq!(estimate_remaining_ms(5_000, 0, 10), None);
        assert_eq!(estimate_remaining_ms(5_000, 0, 0), None);
    }

    #[test]
    fn linear_estimate() {
        // a quarter done in 1s -> 3s to go
        assert_eq!(estimate_remaining_ms(1_000, 1, 4), Some(3_000));
        assert_eq!(estimate_remaining_ms(1_000, 4, 4), Some(0));
    }

    #[test]
    fn estimate_is_clamped_at_zero() {
        // invalidation can leave completed > total momentarily
        assert_eq!(estimate_remaining_ms(1_000, 5, 4), Some(0));
    }
}
