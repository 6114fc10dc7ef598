pub mod cache;
pub mod model;
pub mod progress;

pub use cache::ResultCache;
pub use model::{LoadingSession, StageRecord};
pub use progress::{ProgressSnapshot, StageProgress, StageStatus};
