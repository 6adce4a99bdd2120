//! Per-context memoization of context-only config values.

use std::any::Any;
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};

type Cached = std::result::Result<Arc<dyn Any + Send + Sync>, Arc<Error>>;

#[derive(Default)]
struct Slot {
    value: OnceLock<Cached>,
    evaluating: Mutex<Option<ThreadId>>,
}

// =============================================================================
// ConfigCache
// =============================================================================

/// Single-flight cache keyed by config identity.
///
/// The map lock is held only to fetch a slot. Evaluation happens inside the
/// slot's `OnceLock`, so concurrent first callers for the same key block on
/// one evaluation while other keys proceed.
///
/// A rayon worker waiting inside an evaluation may pick up a job that
/// resolves the same key. That caller is on the evaluating thread and would
/// block forever on the `OnceLock`, so it fails with
/// [`Error::ConfigReentered`] instead.
#[derive(Default)]
pub(crate) struct ConfigCache {
    slots: Mutex<FxHashMap<u64, Arc<Slot>>>,
}

impl ConfigCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Return the memoized value for `key`, evaluating `compute` at most once.
    ///
    /// A failed evaluation is memoized too; every caller sees it as
    /// [`Error::Shared`].
    pub(crate) fn get_or_compute<T>(
        &self,
        key: u64,
        compute: impl FnOnce() -> Result<T>,
    ) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let slot = self.slots.lock().entry(key).or_default().clone();
        let current = thread::current().id();
        if slot.value.get().is_none() && *slot.evaluating.lock() == Some(current) {
            return Err(Error::ConfigReentered);
        }

        let cached = slot.value.get_or_init(|| {
            *slot.evaluating.lock() = Some(current);
            let result = compute()
                .map(|value| Arc::new(value) as Arc<dyn Any + Send + Sync>)
                .map_err(Arc::new);
            *slot.evaluating.lock() = None;
            result
        });

        match cached {
            Ok(value) => value
                .downcast_ref::<T>()
                .cloned()
                .ok_or_else(|| {
                    Error::module(format!("config {key} cached under a different type"))
                }),
            Err(err) => Err(Error::Shared(err.clone())),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_failure_is_memoized() {
        let cache = ConfigCache::new();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let result: Result<i64> = cache.get_or_compute(7, || {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::module("nope"))
            });
            assert!(matches!(result, Err(Error::Shared(_))));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_keys_are_independent() {
        let cache = ConfigCache::new();
        assert_eq!(cache.get_or_compute(1, || Ok(1_i64)).unwrap(), 1);
        assert_eq!(cache.get_or_compute(2, || Ok(2_i64)).unwrap(), 2);
        assert_eq!(cache.get_or_compute(1, || Ok(99_i64)).unwrap(), 1);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_reentrant_evaluation_fails_instead_of_blocking() {
        let cache = ConfigCache::new();
        let result: Result<i64> = cache.get_or_compute(3, || {
            let inner: Result<i64> = cache.get_or_compute(3, || Ok(1));
            assert!(matches!(inner, Err(Error::ConfigReentered)));
            inner
        });
        match result {
            Err(Error::Shared(err)) => assert!(matches!(*err, Error::ConfigReentered)),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_other_keys_resolve_during_evaluation() {
        let cache = ConfigCache::new();
        let value = cache
            .get_or_compute(1, || Ok(cache.get_or_compute(2, || Ok(20_i64))? + 1))
            .unwrap();
        assert_eq!(value, 21);
    }
}
