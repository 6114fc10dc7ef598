use thiserror::Error;

/// Why a single request did not produce data.
///
/// Request-level failures are recorded and surfaced through events,
/// handles and `Scheduler::request_error`; they never abort a run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("request timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("precondition never satisfied: {0}")]
    PreconditionUnmet(String),

    #[error("request cancelled")]
    Cancelled,
}

impl LoadError {
    /// Normalizes a batching-layer error into a stable, bounded transport error.
    pub fn transport(e: &anyhow::Error) -> Self {
        const MAX: usize = 160;

        let s = e.to_string();
        if s.len() > MAX {
            let mut cut = MAX;
            while !s.is_char_boundary(cut) {
                cut -= 1;
            }
            Self::Transport(format!("ERR:{}", &s[..cut]))
        } else {
            Self::Transport(s)
        }
    }
}

/// Misuse of the scheduler's orchestration entry points.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("process_queue is already running")]
    AlreadyRunning,

    #[error("no active loading session")]
    NoActiveSession,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}
