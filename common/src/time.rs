use chrono::Utc;

/// Wall-clock time in epoch milliseconds.
pub fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
