use std::time::Duration;

use tokio::time::Instant;

/// Awaits `fut` and warns on the `performance` target if it took longer than `max`.
///
/// Measured on the tokio clock, so paused-time tests see the same elapsed
/// time as the timers they advance.
pub async fn warn_if_slow<F, T>(label: &'static str, max: Duration, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let start = Instant::now();
    let out = fut.await;
    let elapsed = start.elapsed();
    if elapsed > max {
        tracing::warn!(
            target: "performance",
            label = label,
            elapsed_ms = elapsed.as_millis() as u64,
            "slow operation detected"
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[tokio::test]
    async fn passes_through_the_output() {
        let out = warn_if_slow("noop", Duration::from_secs(1), async { 7 }).await;
        assert_eq!(out, 7);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn warns_once_the_budget_is_exceeded() {
        warn_if_slow("fetch", Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
        })
        .await;

        assert!(logs_contain("slow operation detected"));
        assert!(logs_contain("elapsed_ms=200"));
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn stays_quiet_within_the_budget() {
        warn_if_slow("fetch", Duration::from_millis(500), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
        })
        .await;

        assert!(!logs_contain("slow operation detected"));
    }
}
