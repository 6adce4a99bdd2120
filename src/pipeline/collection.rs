//! Ordered pipeline collection.

use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use super::Pipeline;

static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

fn next_version() -> u64 {
    NEXT_VERSION.fetch_add(1, Ordering::Relaxed)
}

/// Pipelines keyed by name, in insertion order.
///
/// Every new collection and every mutation takes a process-wide unique
/// [`version`](Self::version); the engine rebuilds its phase graph only when
/// the version changed since the last build.
#[derive(Debug, Clone)]
pub struct Pipelines {
    pipelines: IndexMap<String, Pipeline>,
    version: u64,
}

impl Default for Pipelines {
    fn default() -> Self {
        Self {
            pipelines: IndexMap::new(),
            version: next_version(),
        }
    }
}

impl Pipelines {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a pipeline. Returns the replaced one.
    pub fn add(&mut self, pipeline: Pipeline) -> Option<Pipeline> {
        self.version = next_version();
        self.pipelines.insert(pipeline.name().to_owned(), pipeline)
    }

    /// Remove a pipeline by name.
    pub fn remove(&mut self, name: &str) -> Option<Pipeline> {
        let removed = self.pipelines.shift_remove(name);
        if removed.is_some() {
            self.version = next_version();
        }
        removed
    }

    /// Look up a pipeline.
    pub fn get(&self, name: &str) -> Option<&Pipeline> {
        self.pipelines.get(name)
    }

    /// Mutable lookup. Counts as a modification.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Pipeline> {
        self.version = next_version();
        self.pipelines.get_mut(name)
    }

    /// Returns `true` if a pipeline with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.pipelines.contains_key(name)
    }

    /// Remove every pipeline.
    pub fn clear(&mut self) {
        self.version = next_version();
        self.pipelines.clear();
    }

    /// Number of pipelines.
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// Returns `true` if empty.
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Pipeline> {
        self.pipelines.values()
    }

    /// Pipeline names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.pipelines.keys().map(String::as_str)
    }

    /// Version of the current contents, unique across collections.
    pub fn version(&self) -> u64 {
        self.version
    }
}

impl Extend<Pipeline> for Pipelines {
    fn extend<I: IntoIterator<Item = Pipeline>>(&mut self, iter: I) {
        for pipeline in iter {
            self.add(pipeline);
        }
    }
}

impl FromIterator<Pipeline> for Pipelines {
    fn from_iter<I: IntoIterator<Item = Pipeline>>(iter: I) -> Self {
        let mut pipelines = Self::new();
        pipelines.extend(iter);
        pipelines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_tracks_mutations() {
        let mut pipelines = Pipelines::new();
        let v0 = pipelines.version();
        pipelines.add(Pipeline::builder("a").build());
        assert!(pipelines.version() > v0);

        let v1 = pipelines.version();
        assert!(pipelines.get("a").is_some());
        assert_eq!(pipelines.version(), v1);

        pipelines.remove("missing");
        assert_eq!(pipelines.version(), v1);
        pipelines.get_mut("a").unwrap().set_isolated(true);
        assert!(pipelines.version() > v1);
    }

    #[test]
    fn test_versions_unique_across_collections() {
        let mut first = Pipelines::new();
        let mut second = Pipelines::new();
        assert_ne!(first.version(), second.version());

        first.add(Pipeline::builder("a").build());
        second.add(Pipeline::builder("b").build());
        assert_ne!(first.version(), second.version());

        let copy = first.clone();
        assert_eq!(copy.version(), first.version());
    }

    #[test]
    fn test_insertion_order() {
        let pipelines: Pipelines = ["c", "a", "b"]
            .into_iter()
            .map(|n| Pipeline::builder(n).build())
            .collect();
        assert_eq!(pipelines.names().collect::<Vec<_>>(), ["c", "a", "b"]);
    }
}
