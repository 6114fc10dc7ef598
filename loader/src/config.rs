use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::activity::ActivityConfig;
use crate::error::ConfigError;
use crate::request::Priority;
use crate::strategy::DeviceClass;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Device class used for strategy selection.
    ///
    /// Injected by the host rather than sniffed, so the strategy table stays
    /// pure (see `DeviceClass::detect` for a classifier hosts can use).
    pub device_class: DeviceClass,

    // =========================
    // Retry configuration
    // =========================
    /// Default retry budget per priority tier, indexed by `Priority::index()`.
    ///
    /// Used when a request does not carry its own `retry_attempts`.
    /// Critical requests get the largest budget: they gate above-the-fold
    /// rendering.
    pub default_retries: [u32; 5],

    /// Base delay for exponential backoff between attempts.
    ///
    /// Delay = base * 2^(4 - retries_left), capped at `backoff_max_ms`.
    pub backoff_base_ms: u64,

    /// Upper bound on a single backoff delay.
    pub backoff_max_ms: u64,

    // =========================
    // Activity configuration
    // =========================
    /// Time without interaction after which the user counts as inactive.
    pub inactivity_threshold_ms: u64,

    /// Cadence of the inactivity check.
    pub activity_check_interval_ms: u64,

    // =========================
    // Observability
    // =========================
    /// Buffer size of the broadcast event stream.
    ///
    /// Slow subscribers that fall further behind than this lose events
    /// (they observe `RecvError::Lagged`); the scheduler never blocks on them.
    pub event_capacity: usize,

    /// Fetches taking longer than this are logged as slow.
    pub slow_request_ms: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            device_class: DeviceClass::Desktop,

            // critical, high, medium, low, deferred
            default_retries: [3, 2, 1, 1, 0],
            backoff_base_ms: 1_000,
            backoff_max_ms: 30_000,

            inactivity_threshold_ms: 30_000,
            activity_check_interval_ms: 10_000,

            event_capacity: 256,
            slow_request_ms: 3_000,
        }
    }
}

impl LoaderConfig {
    /// Defaults overridden by `LOADER_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(v) = env_parse::<DeviceClass>("LOADER_DEVICE_CLASS")? {
            cfg.device_class = v;
        }
        if let Some(v) = env_parse::<u64>("LOADER_BACKOFF_BASE_MS")? {
            cfg.backoff_base_ms = v;
        }
        if let Some(v) = env_parse::<u64>("LOADER_BACKOFF_MAX_MS")? {
            cfg.backoff_max_ms = v;
        }
        if let Some(v) = env_parse::<u64>("LOADER_INACTIVITY_MS")? {
            cfg.inactivity_threshold_ms = v;
        }
        if let Some(v) = env_parse::<u64>("LOADER_ACTIVITY_CHECK_MS")? {
            cfg.activity_check_interval_ms = v;
        }
        if let Some(v) = env_parse::<usize>("LOADER_EVENT_CAPACITY")? {
            cfg.event_capacity = v.max(1);
        }
        if let Some(v) = env_parse::<u64>("LOADER_SLOW_REQUEST_MS")? {
            cfg.slow_request_ms = v;
        }

        Ok(cfg)
    }

    pub fn default_retries_for(&self, priority: Priority) -> u32 {
        self.default_retries[priority.index()]
    }

    /// Backoff before the next attempt when `retries_left` attempts remain.
    pub fn backoff_delay(&self, retries_left: u32) -> Duration {
        let exp = 4u32.saturating_sub(retries_left).min(16);
        let ms = self
            .backoff_base_ms
            .saturating_mul(1u64 << exp)
            .min(self.backoff_max_ms);
        Duration::from_millis(ms)
    }

    pub fn activity(&self) -> ActivityConfig {
        ActivityConfig {
            inactivity_threshold: Duration::from_millis(self.inactivity_threshold_ms),
            check_interval: Duration::from_millis(self.activity_check_interval_ms.max(1)),
        }
    }

    pub fn slow_request(&self) -> Duration {
        Duration::from_millis(self.slow_request_ms)
    }
}

fn env_parse<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    let Ok(raw) = std::env::var(key) else {
        return Ok(None);
    };

    let parsed = raw.trim().parse::<T>();
    match parsed {
        Ok(v) => Ok(Some(v)),
        Err(_) => Err(ConfigError::InvalidValue { key, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_gets_the_largest_retry_budget() {
        let cfg = LoaderConfig::default();
        let critical = cfg.default_retries_for(Priority::Critical);
        for p in Priority::ALL {
            assert!(cfg.default_retries_for(p) <= critical);
        }
        assert_eq!(cfg.default_retries_for(Priority::Deferred), 0);
    }

    #[test]
    fn backoff_grows_as_budget_shrinks() {
        let cfg = LoaderConfig::default();
        assert_eq!(cfg.backoff_delay(3), Duration::from_millis(2_000));
        assert_eq!(cfg.backoff_delay(2), Duration::from_millis(4_000));
        assert_eq!(cfg.backoff_delay(1), Duration::from_millis(8_000));
    }

    #[test]
    fn backoff_is_capped() {
        let cfg = LoaderConfig {
            backoff_base_ms: 10_000,
            ..LoaderConfig::default()
        };
        assert_eq!(cfg.backoff_delay(0), Duration::from_millis(30_000));
    }

    #[test]
    fn env_overrides_and_rejects_garbage() {
        // Keys are unique to this test.
        unsafe {
            std::env::set_var("LOADER_TEST_PARSE_OK", "42");
            std::env::set_var("LOADER_TEST_PARSE_BAD", "forty-two");
        }

        assert_eq!(env_parse::<u64>("LOADER_TEST_PARSE_OK").unwrap(), Some(42));
        assert!(env_parse::<u64>("LOADER_TEST_PARSE_BAD").is_err());
        assert_eq!(env_parse::<u64>("LOADER_TEST_PARSE_MISSING").unwrap(), None);
    }

    #[test]
    fn deserializes_partial_config_over_defaults() {
        let cfg: LoaderConfig =
            serde_json::from_str(r#"{ "device_class": "mobile", "backoff_base_ms": 10 }"#)
                .unwrap();
        assert_eq!(cfg.device_class, DeviceClass::Mobile);
        assert_eq!(cfg.backoff_base_ms, 10);
        assert_eq!(cfg.event_capacity, 256);
    }

    #[test]
    fn activity_config_follows_millisecond_fields() {
        let cfg = LoaderConfig {
            inactivity_threshold_ms: 5_000,
            activity_check_interval_ms: 0,
            ..LoaderConfig::default()
        };
        let a = cfg.activity();
        assert_eq!(a.inactivity_threshold, Duration::from_secs(5));
        assert_eq!(a.check_interval, Duration::from_millis(1));
    }
}
