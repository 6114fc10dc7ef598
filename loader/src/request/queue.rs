use std::collections::VecDeque;

use super::types::{DataRequest, Priority, Stage};

/// Pending requests, one FIFO per priority tier.
///
/// Only holds requests that are neither active nor settled; dispatch moves a
/// request out with `take`, carry-over puts it back with `push`.
pub struct RequestQueue<P, T> {
    tiers: [VecDeque<DataRequest<P, T>>; 5],
}

impl<P, T> Default for RequestQueue<P, T> {
    fn default() -> Self {
        Self {
            tiers: Default::default(),
        }
    }
}

impl<P, T> RequestQueue<P, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, req: DataRequest<P, T>) {
        self.tiers[req.priority.index()].push_back(req);
    }

    pub fn len(&self) -> usize {
        self.tiers.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.iter().all(VecDeque::is_empty)
    }

    /// Moves a queued request assigned to a stage before `stage` into
    /// `stage`. Returns its previous stage, or `None` if nothing moved.
    pub fn defer(&mut self, id: &str, stage: Stage) -> Option<Stage> {
        let req = self
            .tiers
            .iter_mut()
            .flat_map(|tier| tier.iter_mut())
            .find(|r| r.id == id && r.stage < stage)?;
        Some(std::mem::replace(&mut req.stage, stage))
    }

    /// Ids queued for `stage` in tier `priority` whose dependencies pass
    /// `deps_ready`, in FIFO order.
    pub fn eligible_ids<F>(&self, stage: Stage, priority: Priority, deps_ready: F) -> Vec<String>
    where
        F: Fn(&DataRequest<P, T>) -> bool,
    {
        self.tiers[priority.index()]
            .iter()
            .filter(|r| r.stage == stage && deps_ready(r))
            .map(|r| r.id.clone())
            .collect()
    }

    /// Removes and returns the requests with the given ids (ids not queued are ignored).
    pub fn take(&mut self, ids: &[String]) -> Vec<DataRequest<P, T>> {
        let mut out = Vec::with_capacity(ids.len());

        for id in ids {
            for tier in self.tiers.iter_mut() {
                if let Some(pos) = tier.iter().position(|r| &r.id == id) {
                    if let Some(r) = tier.remove(pos) {
                        out.push(r);
                    }
                    break;
                }
            }
        }

        out
    }

    pub fn clear(&mut self) {
        for tier in self.tiers.iter_mut() {
            tier.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(id: &str, p: Priority, s: Stage) -> DataRequest<(), ()> {
        DataRequest::new(id, "/api/x", ()).with_priority(p).with_stage(s)
    }

    #[test]
    fn push_files_by_priority() {
        let mut q = RequestQueue::new();
        q.push(req("a", Priority::Critical, Stage::Initial));
        q.push(req("b", Priority::Low, Stage::Initial));
        q.push(req("c", Priority::Critical, Stage::Initial));

        assert_eq!(q.len(), 3);
        let critical = q.eligible_ids(Stage::Initial, Priority::Critical, |_| true);
        assert_eq!(critical, vec!["a".to_string(), "c".to_string()]);
        assert_eq!(q.eligible_ids(Stage::Initial, Priority::Low, |_| true), vec!["b".to_string()]);
        assert!(q.eligible_ids(Stage::Initial, Priority::High, |_| true).is_empty());
    }

    #[test]
    fn eligible_ids_filter_by_stage_and_readiness_in_fifo_order() {
        let mut q = RequestQueue::new();
        q.push(req("a", Priority::High, Stage::Secondary));
        q.push(req("b", Priority::High, Stage::Initial));
        q.push(req("c", Priority::High, Stage::Secondary));
        q.push(req("d", Priority::High, Stage::Secondary));

        let ids = q.eligible_ids(Stage::Secondary, Priority::High, |r| r.id != "c");
        assert_eq!(ids, vec!["a".to_string(), "d".to_string()]);
    }

    #[test]
    fn take_removes_only_requested_ids() {
        let mut q = RequestQueue::new();
        q.push(req("a", Priority::Medium, Stage::Tertiary));
        q.push(req("b", Priority::Medium, Stage::Tertiary));

        let taken = q.take(&["b".to_string(), "missing".to_string()]);
        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].id, "b");
        assert_eq!(q.len(), 1);
        assert!(q.take(&["b".to_string()]).is_empty());
    }

    #[test]
    fn defer_only_moves_requests_forward() {
        let mut q = RequestQueue::new();
        q.push(req("a", Priority::High, Stage::Initial));
        q.push(req("b", Priority::High, Stage::Tertiary));

        assert_eq!(q.defer("a", Stage::Secondary), Some(Stage::Initial));
        assert_eq!(q.defer("b", Stage::Secondary), None);
        assert_eq!(q.defer("missing", Stage::Secondary), None);

        let secondary = q.eligible_ids(Stage::Secondary, Priority::High, |_| true);
        assert_eq!(secondary, vec!["a".to_string()]);
        assert!(q.eligible_ids(Stage::Initial, Priority::High, |_| true).is_empty());
    }

    #[test]
    fn clear_empties_every_tier() {
        let mut q = RequestQueue::new();
        for p in Priority::ALL {
            q.push(req(p.as_str(), p, Stage::Initial));
        }
        q.clear();
        assert!(q.is_empty());
    }
}
