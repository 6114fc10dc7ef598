use std::collections::{BTreeSet, HashMap, HashSet};

/// Forward and reverse dependency edges between request ids.
///
/// Dependencies may name ids that are not registered yet; satisfaction is
/// only ever checked against the completed set at dispatch time.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// id -> ids it waits on
    deps: HashMap<String, BTreeSet<String>>,
    /// id -> ids waiting on it
    dependents: HashMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: &str, dependencies: &BTreeSet<String>) {
        for dep in dependencies {
            self.dependents
                .entry(dep.clone())
                .or_default()
                .insert(id.to_string());
        }
        self.deps
            .entry(id.to_string())
            .or_default()
            .extend(dependencies.iter().cloned());
    }

    pub fn dependencies_of(&self, id: &str) -> impl Iterator<Item = &String> {
        self.deps.get(id).into_iter().flatten()
    }

    pub fn dependents_of(&self, id: &str) -> impl Iterator<Item = &String> {
        self.dependents.get(id).into_iter().flatten()
    }

    pub fn is_satisfied(&self, id: &str, completed: &HashSet<String>) -> bool {
        self.dependencies_of(id).all(|d| completed.contains(d))
    }

    /// Dependents of `id` whose dependencies are now all completed.
    pub fn ready_dependents(&self, id: &str, completed: &HashSet<String>) -> Vec<String> {
        self.dependents_of(id)
            .filter(|d| self.is_satisfied(d, completed))
            .cloned()
            .collect()
    }

    /// Drops `id`'s own edges; edges other requests hold towards it remain.
    pub fn remove(&mut self, id: &str) {
        if let Some(deps) = self.deps.remove(id) {
            for dep in deps {
                if let Some(set) = self.dependents.get_mut(&dep) {
                    set.remove(id);
                    if set.is_empty() {
                        self.dependents.remove(&dep);
                    }
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.deps.clear();
        self.dependents.clear();
    }
}
