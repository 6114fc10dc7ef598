pub mod graph;
pub mod queue;
pub mod rules;
pub mod types;

pub use graph::DependencyGraph;
pub use queue::RequestQueue;
pub use rules::{determine_priority, determine_stage};
pub use types::{
    DataRequest, NetworkRequirements, PartialRequest, Priority, PriorityHint, Stage, Transform,
};
