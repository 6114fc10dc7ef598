//! Request descriptors and the two fixed orders the scheduler walks.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::activity::UserActivity;
use crate::strategy::{NetworkConditions, NetworkQuality};

/// Request priority. Declaration order is dispatch order: `Critical` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
    Deferred,
}

impl Priority {
    pub const ALL: [Priority; 5] = [
        Priority::Critical,
        Priority::High,
        Priority::Medium,
        Priority::Low,
        Priority::Deferred,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
            Priority::Deferred => "deferred",
        }
    }

    /// Collapses the five tiers into the batching layer's three-level hint.
    pub fn hint(self) -> PriorityHint {
        match self {
            Priority::Critical | Priority::High => PriorityHint::High,
            Priority::Medium => PriorityHint::Medium,
            Priority::Low | Priority::Deferred => PriorityHint::Low,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Macro-phase of a loading session. Declaration order is execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Initial,
    Secondary,
    Tertiary,
    Background,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Initial,
        Stage::Secondary,
        Stage::Tertiary,
        Stage::Background,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Initial => "initial",
            Stage::Secondary => "secondary",
            Stage::Tertiary => "tertiary",
            Stage::Background => "background",
        }
    }

    /// The stage after this one, `None` for `Background`.
    pub fn next(self) -> Option<Stage> {
        Stage::ALL.get(self.index() + 1).copied()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority hint understood by the batching layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityHint {
    High,
    Medium,
    Low,
}

/// Network conditions that must hold at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRequirements {
    pub min_quality: Option<NetworkQuality>,
    pub max_rtt_ms: Option<u64>,
}

impl NetworkRequirements {
    /// Unknown conditions fail closed.
    pub fn satisfied_by(&self, conditions: Option<&NetworkConditions>) -> bool {
        let Some(c) = conditions else {
            return false;
        };

        if let Some(min) = self.min_quality {
            if c.quality < min {
                return false;
            }
        }

        if let Some(max_rtt) = self.max_rtt_ms {
            if c.rtt_ms > max_rtt {
                return false;
            }
        }

        true
    }
}

/// Pure post-processing applied to fetched data before it is cached.
pub type Transform<T> = Arc<dyn Fn(T) -> T + Send + Sync>;

/// One unit of data the caller wants loaded.
///
/// `P` is whatever the batching layer needs to issue the call; `T` is what it
/// returns. Both are opaque to the scheduler.
#[derive(Clone)]
pub struct DataRequest<P, T> {
    pub id: String,
    pub endpoint: String,
    pub params: P,
    pub priority: Priority,
    pub stage: Stage,
    pub dependencies: BTreeSet<String>,
    /// Overrides the strategy timeout for this request's priority.
    pub timeout: Option<Duration>,
    /// Remaining retry budget; defaults by priority when `None`.
    pub retry_attempts: Option<u32>,
    pub network_requirements: Option<NetworkRequirements>,
    /// Skip while the user is inactive.
    pub requires_active_user: bool,
    pub transform: Option<Transform<T>>,
}

impl<P, T> DataRequest<P, T> {
    /// A medium-priority, tertiary-stage request with no constraints.
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>, params: P) -> Self {
        Self {
            id: id.into(),
            endpoint: endpoint.into(),
            params,
            priority: Priority::Medium,
            stage: Stage::Tertiary,
            dependencies: BTreeSet::new(),
            timeout: None,
            retry_attempts: None,
            network_requirements: None,
            requires_active_user: false,
            transform: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }

    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.dependencies.insert(id.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = Some(attempts);
        self
    }

    pub fn with_network_requirements(mut self, req: NetworkRequirements) -> Self {
        self.network_requirements = Some(req);
        self
    }

    pub fn requiring_active_user(mut self) -> Self {
        self.requires_active_user = true;
        self
    }

    pub fn with_transform(mut self, f: impl Fn(T) -> T + Send + Sync + 'static) -> Self {
        self.transform = Some(Arc::new(f));
        self
    }

    /// Returns the reason this request may not be dispatched right now, if any.
    pub fn unmet_precondition(
        &self,
        activity: UserActivity,
        network: Option<&NetworkConditions>,
    ) -> Option<String> {
        if self.requires_active_user && activity == UserActivity::Inactive {
            return Some("user inactive".to_string());
        }

        if let Some(req) = &self.network_requirements {
            if !req.satisfied_by(network) {
                return Some(match network {
                    Some(c) => format!(
                        "network {} / {}ms does not meet requirements",
                        c.quality, c.rtt_ms
                    ),
                    None => "network conditions unknown".to_string(),
                });
            }
        }

        None
    }
}

impl<P: fmt::Debug, T> fmt::Debug for DataRequest<P, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataRequest")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("params", &self.params)
            .field("priority", &self.priority)
            .field("stage", &self.stage)
            .field("dependencies", &self.dependencies)
            .field("timeout", &self.timeout)
            .field("retry_attempts", &self.retry_attempts)
            .field("network_requirements", &self.network_requirements)
            .field("requires_active_user", &self.requires_active_user)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

/// Input to `Scheduler::add_requests`: priority and stage may be left for
/// the scheduler to infer from the endpoint.
#[derive(Clone)]
pub struct PartialRequest<P, T> {
    pub id: String,
    pub endpoint: String,
    pub params: P,
    pub priority: Option<Priority>,
    pub stage: Option<Stage>,
    pub dependencies: BTreeSet<String>,
    pub timeout: Option<Duration>,
    pub retry_attempts: Option<u32>,
    pub network_requirements: Option<NetworkRequirements>,
    pub requires_active_user: bool,
    pub transform: Option<Transform<T>>,
}

impl<P, T> PartialRequest<P, T> {
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>, params: P) -> Self {
        Self {
            id: id.into(),
            endpoint: endpoint.into(),
            params,
            priority: None,
            stage: None,
            dependencies: BTreeSet::new(),
            timeout: None,
            retry_attempts: None,
            network_requirements: None,
            requires_active_user: false,
            transform: None,
        }
    }

    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.dependencies.insert(id.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }

    /// Fills in priority and stage using the endpoint rules where absent.
    pub fn resolve(self) -> DataRequest<P, T> {
        let priority = self
            .priority
            .unwrap_or_else(|| super::rules::determine_priority(&self.endpoint));
        let stage = self
            .stage
            .unwrap_or_else(|| super::rules::determine_stage(priority));

        DataRequest {
            id: self.id,
            endpoint: self.endpoint,
            params: self.params,
            priority,
            stage,
            dependencies: self.dependencies,
            timeout: self.timeout,
            retry_attempts: self.retry_attempts,
            network_requirements: self.network_requirements,
            requires_active_user: self.requires_active_user,
            transform: self.transform,
        }
    }
}
