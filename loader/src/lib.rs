//! Progressive data loading: a staged, priority-tiered request scheduler
//! that adapts concurrency and timeouts to device and network conditions.

pub mod activity;
pub mod config;
pub mod error;
pub mod execution;
pub mod metrics;
pub mod request;
pub mod scheduler;
pub mod session;
pub mod strategy;

pub use activity::{ActivityMonitor, InteractionKind, UserActivity};
pub use config::LoaderConfig;
pub use error::{ConfigError, LoadError, SchedulerError};
pub use execution::Fetcher;
pub use request::{DataRequest, PartialRequest, Priority, PriorityHint, Stage};
pub use scheduler::{LoadEvent, PushUpdate, RequestHandle, RequestOutcome, Scheduler};
pub use session::{ProgressSnapshot, StageProgress, StageStatus};
pub use strategy::{DeviceClass, NetworkConditions, NetworkQuality, SharedNetworkConditions};
