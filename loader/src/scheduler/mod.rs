pub mod batch;
mod dispatch;
pub mod events;
#[allow(clippy::module_inception)]
pub mod scheduler;
mod state;

pub use events::{LoadEvent, PushUpdate, RequestHandle, RequestOutcome};
pub use scheduler::Scheduler;
