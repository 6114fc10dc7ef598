pub mod conditions;
pub mod table;

pub use conditions::{
    DeviceClass, NetworkConditionSource, NetworkConditions, NetworkQuality,
    SharedNetworkConditions,
};
pub use table::{Strategy, select_strategy};
