//! User-activity monitor.
//!
//! The host forwards input events through [`ActivityMonitor::record`]; a
//! periodic check flips the published state to inactive once no interaction
//! has been seen for the configured threshold. Consumers observe transitions
//! through a `watch` channel.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserActivity {
    Active,
    Inactive,
}

/// Interaction kinds that count as user activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionKind {
    MouseDown,
    MouseMove,
    KeyPress,
    Scroll,
    TouchStart,
    Click,
}

impl InteractionKind {
    pub const ALL: [InteractionKind; 6] = [
        InteractionKind::MouseDown,
        InteractionKind::MouseMove,
        InteractionKind::KeyPress,
        InteractionKind::Scroll,
        InteractionKind::TouchStart,
        InteractionKind::Click,
    ];

    /// Maps a DOM event name; anything outside the fixed set is ignored.
    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "mousedown" => Some(InteractionKind::MouseDown),
            "mousemove" => Some(InteractionKind::MouseMove),
            "keypress" => Some(InteractionKind::KeyPress),
            "scroll" => Some(InteractionKind::Scroll),
            "touchstart" => Some(InteractionKind::TouchStart),
            "click" => Some(InteractionKind::Click),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ActivityConfig {
    pub inactivity_threshold: Duration,
    pub check_interval: Duration,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            inactivity_threshold: Duration::from_secs(30),
            check_interval: Duration::from_secs(10),
        }
    }
}

struct MonitorInner {
    cfg: ActivityConfig,
    last_interaction: Mutex<Instant>,
    state_tx: watch::Sender<UserActivity>,
}

/// Classifies the user as active or inactive. Cheap to clone.
#[derive(Clone)]
pub struct ActivityMonitor {
    inner: Arc<MonitorInner>,
}

impl ActivityMonitor {
    /// Starts in the active state, as if an interaction just happened.
    pub fn new(cfg: ActivityConfig) -> Self {
        let (state_tx, _) = watch::channel(UserActivity::Active);

        Self {
            inner: Arc::new(MonitorInner {
                cfg,
                last_interaction: Mutex::new(Instant::now()),
                state_tx,
            }),
        }
    }

    pub fn state(&self) -> UserActivity {
        *self.inner.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<UserActivity> {
        self.inner.state_tx.subscribe()
    }

    /// Marks the user active and restarts the inactivity timer.
    pub fn record(&self, kind: InteractionKind) {
        *self.inner.last_interaction.lock() = Instant::now();

        let changed = self.inner.state_tx.send_if_modified(|s| {
            if *s == UserActivity::Active {
                return false;
            }
            *s = UserActivity::Active;
            true
        });

        if changed {
            info!(?kind, "user became active");
        }
    }

    /// Flips to inactive if the threshold has elapsed. Returns the current state.
    pub fn check(&self) -> UserActivity {
        let idle = self.inner.last_interaction.lock().elapsed();

        if idle >= self.inner.cfg.inactivity_threshold {
            let changed = self.inner.state_tx.send_if_modified(|s| {
                if *s == UserActivity::Inactive {
                    return false;
                }
                *s = UserActivity::Inactive;
                true
            });

            if changed {
                info!(idle_ms = idle.as_millis() as u64, "user became inactive");
            }
        }

        self.state()
    }

    /// Runs `check` every `check_interval` until the task is aborted.
    pub fn spawn(&self) -> JoinHandle<()> {
        let monitor = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(monitor.inner.cfg.check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let state = monitor.check();
                debug!(?state, "activity check");
            }
        })
    }
}
