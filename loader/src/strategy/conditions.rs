//! Network and device classification.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Coarse network quality. Ordered worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkQuality {
    Slow,
    Moderate,
    Fast,
}

impl fmt::Display for NetworkQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NetworkQuality::Slow => "slow",
            NetworkQuality::Moderate => "moderate",
            NetworkQuality::Fast => "fast",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConditions {
    pub quality: NetworkQuality,
    pub rtt_ms: u64,
}

impl NetworkConditions {
    /// Classifies raw connection measurements.
    ///
    /// `effective_type` is the browser-style label (`slow-2g`, `2g`, `3g`,
    /// `4g`); unknown labels fall through to the numeric checks.
    pub fn classify(effective_type: Option<&str>, rtt_ms: u64, downlink_mbps: f64) -> Self {
        let label = effective_type.map(str::to_ascii_lowercase);

        let quality = match label.as_deref() {
            Some("slow-2g") | Some("2g") => NetworkQuality::Slow,
            _ if rtt_ms >= 400 || downlink_mbps < 1.5 => NetworkQuality::Slow,
            Some("4g") if rtt_ms < 150 && downlink_mbps >= 5.0 => NetworkQuality::Fast,
            None if rtt_ms < 150 && downlink_mbps >= 5.0 => NetworkQuality::Fast,
            _ => NetworkQuality::Moderate,
        };

        Self { quality, rtt_ms }
    }
}

/// Live source of network conditions. `None` means "unknown".
pub trait NetworkConditionSource: Send + Sync {
    fn current(&self) -> Option<NetworkConditions>;
}

/// Host-updated network reading shared with the scheduler.
#[derive(Clone, Default)]
pub struct SharedNetworkConditions {
    inner: Arc<RwLock<Option<NetworkConditions>>>,
}

impl SharedNetworkConditions {
    pub fn new(initial: Option<NetworkConditions>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    pub fn set(&self, conditions: Option<NetworkConditions>) {
        *self.inner.write() = conditions;
    }
}

impl NetworkConditionSource for SharedNetworkConditions {
    fn current(&self) -> Option<NetworkConditions> {
        *self.inner.read()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Mobile,
    Tablet,
    #[default]
    Desktop,
}

impl DeviceClass {
    /// Classifies a device from its user agent and viewport width (CSS px).
    pub fn detect(user_agent: &str, viewport_width: Option<u32>) -> Self {
        let ua = user_agent.to_ascii_lowercase();

        if ua.contains("ipad") || ua.contains("tablet") {
            return DeviceClass::Tablet;
        }
        if ua.contains("android") && !ua.contains("mobile") {
            return DeviceClass::Tablet;
        }
        if ua.contains("mobi") || ua.contains("iphone") {
            return DeviceClass::Mobile;
        }

        match viewport_width {
            Some(w) if w < 768 => DeviceClass::Mobile,
            Some(w) if w <= 1024 => DeviceClass::Tablet,
            _ => DeviceClass::Desktop,
        }
    }
}

impl FromStr for DeviceClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mobile" => Ok(DeviceClass::Mobile),
            "tablet" => Ok(DeviceClass::Tablet),
            "desktop" => Ok(DeviceClass::Desktop),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceClass::Mobile => "mobile",
            DeviceClass::Tablet => "tablet",
            DeviceClass::Desktop => "desktop",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_type_2g_is_slow_regardless_of_numbers() {
        let c = NetworkConditions::classify(Some("2g"), 20, 50.0);
        assert_eq!(c.quality, NetworkQuality::Slow);
    }

    #[test]
    fn high_rtt_or_thin_downlink_is_slow() {
        assert_eq!(
            NetworkConditions::classify(Some("4g"), 450, 20.0).quality,
            NetworkQuality::Slow
        );
        assert_eq!(
            NetworkConditions::classify(Some("4g"), 50, 1.0).quality,
            NetworkQuality::Slow
        );
    }

    #[test]
    fn good_4g_is_fast_and_3g_is_moderate() {
        assert_eq!(
            NetworkConditions::classify(Some("4g"), 60, 10.0).quality,
            NetworkQuality::Fast
        );
        assert_eq!(
            NetworkConditions::classify(Some("3g"), 60, 10.0).quality,
            NetworkQuality::Moderate
        );
        assert_eq!(
            NetworkConditions::classify(None, 200, 3.0).quality,
            NetworkQuality::Moderate
        );
    }

    #[test]
    fn shared_conditions_reflect_updates() {
        let shared = SharedNetworkConditions::default();
        assert_eq!(shared.current(), None);

        let c = NetworkConditions {
            quality: NetworkQuality::Fast,
            rtt_ms: 30,
        };
        shared.set(Some(c));
        assert_eq!(shared.current(), Some(c));
    }

    #[test]
    fn device_detection_prefers_user_agent_markers() {
        let iphone = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) Mobile/15E148";
        let ipad = "Mozilla/5.0 (iPad; CPU OS 17_0 like Mac OS X)";
        let android_tab = "Mozilla/5.0 (Linux; Android 14; SM-X710)";
        let mac = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0)";

        assert_eq!(DeviceClass::detect(iphone, Some(1200)), DeviceClass::Mobile);
        assert_eq!(DeviceClass::detect(ipad, None), DeviceClass::Tablet);
        assert_eq!(DeviceClass::detect(android_tab, None), DeviceClass::Tablet);
        assert_eq!(DeviceClass::detect(mac, Some(1440)), DeviceClass::Desktop);
        assert_eq!(DeviceClass::detect(mac, Some(600)), DeviceClass::Mobile);
        assert_eq!(DeviceClass::detect(mac, Some(900)), DeviceClass::Tablet);
    }

    #[test]
    fn device_class_parses_case_insensitively() {
        assert_eq!("Mobile".parse::<DeviceClass>(), Ok(DeviceClass::Mobile));
        assert!("watch".parse::<DeviceClass>().is_err());
    }
}
