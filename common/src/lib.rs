//! Shared observability helpers for the loader workspace.

pub mod logger;
pub mod time;
