pub mod monitor;

pub use monitor::{ActivityConfig, ActivityMonitor, InteractionKind, UserActivity};
