//! Static (device × network) → execution policy table.

use std::time::Duration;

use serde::Serialize;

use super::conditions::{DeviceClass, NetworkConditions, NetworkQuality};
use crate::request::{Priority, Stage};

/// Execution policy for one stage pass.
///
/// Arrays are indexed by `Stage::index()` / `Priority::index()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Strategy {
    pub max_concurrent: usize,
    pub stage_delays_ms: [u64; 4],
    /// Max requests in flight per tier; 0 forgoes the tier entirely.
    pub priority_limits: [usize; 5],
    pub timeouts_ms: [u64; 5],
}

impl Strategy {
    pub fn stage_delay(&self, stage: Stage) -> Duration {
        Duration::from_millis(self.stage_delays_ms[stage.index()])
    }

    pub fn priority_limit(&self, priority: Priority) -> usize {
        self.priority_limits[priority.index()]
    }

    pub fn timeout(&self, priority: Priority) -> Duration {
        Duration::from_millis(self.timeouts_ms[priority.index()])
    }

    /// Batch size for a tier: `min(priority limit, max_concurrent)`.
    pub fn batch_size(&self, priority: Priority) -> usize {
        self.priority_limit(priority).min(self.max_concurrent)
    }
}

const DESKTOP_FAST: Strategy = Strategy {
    max_concurrent: 8,
    stage_delays_ms: [0, 0, 100, 500],
    priority_limits: [6, 4, 3, 2, 1],
    timeouts_ms: [5_000, 8_000, 10_000, 15_000, 20_000],
};

const DESKTOP_MODERATE: Strategy = Strategy {
    max_concurrent: 6,
    stage_delays_ms: [0, 100, 300, 1_000],
    priority_limits: [4, 3, 2, 1, 1],
    timeouts_ms: [8_000, 10_000, 15_000, 20_000, 30_000],
};

const DESKTOP_SLOW: Strategy = Strategy {
    max_concurrent: 3,
    stage_delays_ms: [0, 500, 1_000, 3_000],
    priority_limits: [2, 2, 1, 1, 0],
    timeouts_ms: [10_000, 15_000, 20_000, 30_000, 30_000],
};

const TABLET_FAST: Strategy = Strategy {
    max_concurrent: 6,
    stage_delays_ms: [0, 50, 200, 1_000],
    priority_limits: [4, 3, 2, 2, 1],
    timeouts_ms: [6_000, 8_000, 12_000, 15_000, 20_000],
};

const TABLET_MODERATE: Strategy = Strategy {
    max_concurrent: 4,
    stage_delays_ms: [0, 200, 500, 2_000],
    priority_limits: [3, 2, 2, 1, 1],
    timeouts_ms: [8_000, 12_000, 15_000, 20_000, 30_000],
};

const TABLET_SLOW: Strategy = Strategy {
    max_concurrent: 2,
    stage_delays_ms: [0, 800, 1_500, 4_000],
    priority_limits: [2, 1, 1, 1, 0],
    timeouts_ms: [12_000, 15_000, 20_000, 30_000, 30_000],
};

const MOBILE_FAST: Strategy = Strategy {
    max_concurrent: 4,
    stage_delays_ms: [0, 200, 500, 2_000],
    priority_limits: [3, 2, 2, 1, 1],
    timeouts_ms: [8_000, 10_000, 15_000, 20_000, 30_000],
};

const MOBILE_MODERATE: Strategy = Strategy {
    max_concurrent: 3,
    stage_delays_ms: [0, 300, 800, 3_000],
    priority_limits: [2, 2, 1, 1, 0],
    timeouts_ms: [10_000, 15_000, 20_000, 30_000, 30_000],
};

const MOBILE_SLOW: Strategy = Strategy {
    max_concurrent: 2,
    stage_delays_ms: [0, 1_000, 2_000, 5_000],
    priority_limits: [2, 1, 1, 0, 0],
    timeouts_ms: [15_000, 20_000, 30_000, 30_000, 30_000],
};

/// Picks the policy for a device class and the current network reading.
///
/// Never fails: unknown network conditions select the desktop-slow policy.
pub fn select_strategy(device: DeviceClass, network: Option<&NetworkConditions>) -> Strategy {
    let Some(network) = network else {
        return DESKTOP_SLOW;
    };

    match (device, network.quality) {
        (DeviceClass::Desktop, NetworkQuality::Fast) => DESKTOP_FAST,
        (DeviceClass::Desktop, NetworkQuality::Moderate) => DESKTOP_MODERATE,
        (DeviceClass::Desktop, NetworkQuality::Slow) => DESKTOP_SLOW,
        (DeviceClass::Tablet, NetworkQuality::Fast) => TABLET_FAST,
        (DeviceClass::Tablet, NetworkQuality::Moderate) => TABLET_MODERATE,
        (DeviceClass::Tablet, NetworkQuality::Slow) => TABLET_SLOW,
        (DeviceClass::Mobile, NetworkQuality::Fast) => MOBILE_FAST,
        (DeviceClass::Mobile, NetworkQuality::Moderate) => MOBILE_MODERATE,
        (DeviceClass::Mobile, NetworkQuality::Slow) => MOBILE_SLOW,
    }
}
