use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use crate::error::LoadError;

struct Entry<T> {
    endpoint: String,
    value: T,
}

/// Fetched results and latest errors, keyed by request id.
///
/// Results outlive a session (only `cancel` clears them), so each entry
/// remembers its endpoint for push invalidation. Readers only take this
/// cache's locks, never the scheduler state lock.
pub struct ResultCache<T> {
    results: Mutex<HashMap<String, Entry<T>>>,
    errors: Mutex<HashMap<String, LoadError>>,
}

impl<T> Default for ResultCache<T> {
    fn default() -> Self {
        Self {
            results: Mutex::new(HashMap::new()),
            errors: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> ResultCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.results.lock().get(id).map(|e| e.value.clone())
    }

    pub fn error(&self, id: &str) -> Option<LoadError> {
        self.errors.lock().get(id).cloned()
    }

    /// Stores a result and clears any error left by an earlier attempt.
    pub fn insert(&self, id: &str, endpoint: &str, value: T) {
        self.errors.lock().remove(id);
        self.results.lock().insert(
            id.to_string(),
            Entry {
                endpoint: endpoint.to_string(),
                value,
            },
        );
        debug!(request_id = id, "result cached");
    }

    pub fn set_error(&self, id: &str, err: LoadError) {
        self.errors.lock().insert(id.to_string(), err);
    }

    /// Drops every result whose id or endpoint equals `resource`.
    /// Returns the dropped ids.
    pub fn remove_matching(&self, resource: &str) -> Vec<String> {
        let mut results = self.results.lock();

        let ids: Vec<String> = results
            .iter()
            .filter(|(id, e)| id.as_str() == resource || e.endpoint == resource)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &ids {
            results.remove(id);
        }

        ids
    }

    #[instrument(skip(self))]
    pub fn clear(&self) {
        let count = self.results.lock().len();

        self.results.lock().clear();
        self.errors.lock().clear();

        info!(count, "result cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_clears_previous_error() {
        let cache = ResultCache::new();
        cache.set_error("a", LoadError::Timeout { after_ms: 10 });
        assert!(cache.error("a").is_some());

        cache.insert("a", "/api/a", 1u32);
        assert_eq!(cache.get("a"), Some(1));
        assert!(cache.error("a").is_none());
    }

    #[test]
    fn remove_matching_by_id_or_endpoint() {
        let cache = ResultCache::new();
        cache.insert("holdings", "/api/holdings", 1u8);
        cache.insert("h-page-2", "/api/holdings", 2u8);
        cache.insert("summary", "/api/summary", 3u8);

        let mut by_endpoint = cache.remove_matching("/api/holdings");
        by_endpoint.sort();
        assert_eq!(by_endpoint, vec!["h-page-2".to_string(), "holdings".to_string()]);

        assert_eq!(cache.remove_matching("summary"), vec!["summary".to_string()]);
        assert!(cache.remove_matching("summary").is_empty());
        assert!(cache.get("holdings").is_none());
    }

    #[test]
    fn clear_empties_results_and_errors() {
        let cache = ResultCache::new();
        cache.insert("a", "/a", 1u8);
        cache.set_error("b", LoadError::Cancelled);

        cache.clear();

        assert!(cache.get("a").is_none());
        assert!(cache.error("b").is_none());
    }
}
