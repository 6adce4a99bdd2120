//! Incremental write tracking.
//!
//! # Caching Strategy
//!
//! ```text
//! WriteTracker
//! └── shards: [RwLock<Generations>; 16]       (keyed by output path)
//!     └── Generations
//!         ├── previous: path → WriteEntry      last finished build
//!         └── current:  path → WriteEntry      this build
//! ```
//!
//! A write is skipped when the previous build wrote the same content hash to
//! the path and the file's fingerprint has not changed since. Both skipped
//! and performed writes are recorded in `current`; finishing a build rotates
//! `current` into `previous`, so paths not touched by a build expire.

use std::hash::{Hash, Hasher};
use std::mem;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHasher};

use crate::fs::FileSystem;

const SHARDS: usize = 16;

/// What the tracker remembers about one output path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteEntry {
    /// Fingerprint of the destination right after it was last written.
    pub last_write_hash: u64,
    /// Hash of the content that was last written.
    pub last_content_hash: u64,
}

#[derive(Default)]
struct Generations {
    previous: FxHashMap<PathBuf, WriteEntry>,
    current: FxHashMap<PathBuf, WriteEntry>,
}

/// Persistent map from output path to [`WriteEntry`], shared by every phase of
/// an engine across builds.
pub struct WriteTracker {
    shards: Box<[RwLock<Generations>]>,
}

impl Default for WriteTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self {
            shards: (0..SHARDS).map(|_| RwLock::new(Generations::default())).collect(),
        }
    }

    fn shard(&self, path: &Path) -> &RwLock<Generations> {
        let mut hasher = FxHasher::default();
        path.hash(&mut hasher);
        &self.shards[hasher.finish() as usize % SHARDS]
    }

    /// Decide whether writing `new_content_hash` to `path` can be skipped.
    ///
    /// Returns `true` iff the previous build recorded this path, the file's
    /// current fingerprint still equals the recorded write hash, and the
    /// recorded content hash equals `new_content_hash`. A skip re-records the
    /// entry for the current build.
    pub fn should_skip(&self, fs: &dyn FileSystem, path: &Path, new_content_hash: u64) -> bool {
        let Some(entry) = self.shard(path).read().previous.get(path).copied() else {
            return false;
        };
        if entry.last_content_hash != new_content_hash {
            return false;
        }
        if fs.cache_code(path) != Some(entry.last_write_hash) {
            return false;
        }
        self.shard(path).write().current.insert(path.to_path_buf(), entry);
        true
    }

    /// Record the content hash of a write that is about to happen.
    pub fn record_content(&self, path: &Path, content_hash: u64) {
        self.shard(path)
            .write()
            .current
            .entry(path.to_path_buf())
            .or_default()
            .last_content_hash = content_hash;
    }

    /// Record the destination fingerprint once a write has completed.
    ///
    /// Call after the OS write returned, including for zero-length writes.
    pub fn record_write(&self, fs: &dyn FileSystem, path: &Path) {
        let fingerprint = fs.cache_code(path).unwrap_or_default();
        self.shard(path)
            .write()
            .current
            .entry(path.to_path_buf())
            .or_default()
            .last_write_hash = fingerprint;
    }

    /// Entry recorded for `path`, preferring the current build.
    pub fn entry(&self, path: &Path) -> Option<WriteEntry> {
        let shard = self.shard(path).read();
        shard.current.get(path).or_else(|| shard.previous.get(path)).copied()
    }

    /// Returns `true` if `path` was written or skipped during the current build.
    pub fn touched(&self, path: &Path) -> bool {
        self.shard(path).read().current.contains_key(path)
    }

    /// Paths written or skipped during the current build.
    pub fn touched_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .shards
            .iter()
            .flat_map(|s| s.read().current.keys().cloned().collect::<Vec<_>>())
            .collect();
        paths.sort();
        paths
    }

    /// Close the current build.
    ///
    /// After a successful build the current generation replaces the previous
    /// one. After a failed build the current entries are merged into the
    /// previous generation instead, so files the failed build never reached
    /// can still be skipped next time.
    pub fn finish_run(&self, success: bool) {
        for shard in self.shards.iter() {
            let mut shard = shard.write();
            let current = mem::take(&mut shard.current);
            if success {
                shard.previous = current;
            } else {
                shard.previous.extend(current);
            }
        }
    }

    /// Forget everything.
    pub fn clear(&self) {
        for shard in self.shards.iter() {
            *shard.write() = Generations::default();
        }
    }

    /// Number of paths known from the previous build.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().previous.len()).sum()
    }

    /// Returns `true` if no previous build recorded anything.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Destinations that occur more than once, with their counts, in first-seen
/// order.
pub fn duplicate_destinations<'a>(
    destinations: impl IntoIterator<Item = &'a Path>,
) -> Vec<(PathBuf, usize)> {
    let mut counts: IndexMap<&Path, usize> = IndexMap::new();
    for path in destinations {
        *counts.entry(path).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(p, n)| (p.to_path_buf(), n))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{hash_bytes, MemoryFileSystem};

    fn write(tracker: &WriteTracker, fs: &MemoryFileSystem, path: &Path, content: &str) -> bool {
        let hash = hash_bytes(content.as_bytes());
        if tracker.should_skip(fs, path, hash) {
            return false;
        }
        tracker.record_content(path, hash);
        fs.write(path, &mut content.as_bytes()).unwrap();
        tracker.record_write(fs, path);
        true
    }

    #[test]
    fn test_skip_unchanged_content() {
        let fs = MemoryFileSystem::new();
        let tracker = WriteTracker::new();
        let path = fs.output_path(Path::new("p.html"));

        assert!(write(&tracker, &fs, &path, "A"));
        tracker.finish_run(true);
        assert!(!write(&tracker, &fs, &path, "A"));
        tracker.finish_run(true);
        assert_eq!(fs.physical_writes(), 1);

        // skip re-recorded the entry, so a third identical build still skips
        assert!(!write(&tracker, &fs, &path, "A"));
        tracker.finish_run(true);

        assert!(write(&tracker, &fs, &path, "B"));
        assert_eq!(fs.physical_writes(), 2);
    }

    #[test]
    fn test_external_modification_forces_write() {
        let fs = MemoryFileSystem::new();
        let tracker = WriteTracker::new();
        let path = fs.output_path(Path::new("p.html"));

        write(&tracker, &fs, &path, "A");
        tracker.finish_run(true);
        fs.touch(&path, "edited");
        assert!(write(&tracker, &fs, &path, "A"));
        assert_eq!(fs.output_string("p.html").as_deref(), Some("A"));
    }

    #[test]
    fn test_untouched_entries_expire() {
        let fs = MemoryFileSystem::new();
        let tracker = WriteTracker::new();
        let path = fs.output_path(Path::new("gone.html"));

        write(&tracker, &fs, &path, "A");
        tracker.finish_run(true);
        assert_eq!(tracker.len(), 1);
        tracker.finish_run(true);
        assert!(tracker.is_empty());
        assert!(write(&tracker, &fs, &path, "A"));
    }

    #[test]
    fn test_failed_run_keeps_previous_entries() {
        let fs = MemoryFileSystem::new();
        let tracker = WriteTracker::new();
        let a = fs.output_path(Path::new("a.html"));
        let b = fs.output_path(Path::new("b.html"));

        write(&tracker, &fs, &a, "A");
        write(&tracker, &fs, &b, "B");
        tracker.finish_run(true);

        assert!(!write(&tracker, &fs, &a, "A"));
        tracker.finish_run(false);
        assert!(tracker.entry(&b).is_some());
        assert!(!write(&tracker, &fs, &b, "B"));
    }

    #[test]
    fn test_duplicate_destinations() {
        let paths = [Path::new("a"), Path::new("b"), Path::new("a"), Path::new("a")];
        let dups = duplicate_destinations(paths);
        assert_eq!(dups, vec![(PathBuf::from("a"), 3)]);
    }

    #[test]
    fn test_touched_paths() {
        let fs = MemoryFileSystem::new();
        let tracker = WriteTracker::new();
        let path = fs.output_path(Path::new("x.html"));
        write(&tracker, &fs, &path, "x");
        assert!(tracker.touched(&path));
        assert_eq!(tracker.touched_paths(), vec![path.clone()]);
        tracker.finish_run(true);
        assert!(!tracker.touched(&path));
    }
}
