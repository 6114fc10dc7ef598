//! Priority and stage inference for requests submitted without explicit tags.

use super::types::{Priority, Stage};

/// Ordered endpoint rules; the first fragment found in the endpoint wins.
///
/// Portfolio identity and headline figures render above the fold, so they
/// load first; analytics and notifications can wait for idle bandwidth.
const PRIORITY_RULES: &[(&str, Priority)] = &[
    ("portfolio", Priority::Critical),
    ("income-hub", Priority::Critical),
    ("summary", Priority::Critical),
    ("headline", Priority::Critical),
    ("holdings", Priority::High),
    ("performance", Priority::High),
    ("dividend", Priority::High),
    ("tax", Priority::Medium),
    ("projection", Priority::Medium),
    ("strategy", Priority::Medium),
    ("analytics", Priority::Low),
    ("history", Priority::Low),
    ("notification", Priority::Deferred),
    ("recommendation", Priority::Deferred),
    ("news", Priority::Deferred),
];

/// Infers a priority from the endpoint name. Unmatched endpoints are `Medium`.
pub fn determine_priority(endpoint: &str) -> Priority {
    let endpoint = endpoint.to_ascii_lowercase();

    PRIORITY_RULES
        .iter()
        .find(|(fragment, _)| endpoint.contains(fragment))
        .map(|(_, p)| *p)
        .unwrap_or(Priority::Medium)
}

/// Fixed priority → stage mapping.
pub fn determine_stage(priority: Priority) -> Stage {
    match priority {
        Priority::Critical => Stage::Initial,
        Priority::High => Stage::Secondary,
        Priority::Medium => Stage::Tertiary,
        Priority::Low | Priority::Deferred => Stage::Background,
    }
}
