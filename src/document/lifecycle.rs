//! Per-phase document tracking and release.
//!
//! Every phase node owns a [`DocumentTracker`]. Documents created or cloned
//! through the execution context are recorded in it, and so is any content
//! provider the phase introduced (a created document, or a clone with new
//! content). Providers that arrived with input documents belong to whichever
//! phase created them and are never released here. When the phase has its
//! final output, [`DocumentTracker::sweep`] runs a small mark-and-sweep:
//!
//! ```text
//! outputs ──► flatten metadata references ──► reachable set
//! owned content − content of reachable ──► release (parallel)
//! tracked ← tracked ∩ reachable            (kept for the next build)
//! ```

use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

use super::{ContentProvider, Document};

/// Result of a sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Content providers owned by the phase that were released.
    pub released: usize,
    /// Tracked documents still reachable from the outputs.
    pub retained: usize,
}

#[derive(Default)]
struct Tracked {
    documents: FxHashMap<usize, Document>,
    content: FxHashMap<usize, Arc<dyn ContentProvider>>,
}

/// Concurrent set of document instances created during one phase.
#[derive(Default)]
pub struct DocumentTracker {
    state: Mutex<Tracked>,
}

impl DocumentTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a document instance whose content came from elsewhere.
    pub fn track(&self, document: &Document) {
        self.state
            .lock()
            .documents
            .insert(document.instance_key(), document.clone());
    }

    /// Record a document instance together with its content provider, which
    /// this phase now owns.
    pub fn track_created(&self, document: &Document) {
        let mut state = self.state.lock();
        state
            .documents
            .insert(document.instance_key(), document.clone());
        state
            .content
            .insert(content_key(document), Arc::clone(document.content()));
    }

    /// Number of tracked instances.
    pub fn len(&self) -> usize {
        self.state.lock().documents.len()
    }

    /// Returns `true` if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        let state = self.state.lock();
        state.documents.is_empty() && state.content.is_empty()
    }

    /// Returns `true` if this exact instance is tracked.
    pub fn contains(&self, document: &Document) -> bool {
        self.state
            .lock()
            .documents
            .contains_key(&document.instance_key())
    }

    /// Returns `true` if the document's content provider is owned here.
    pub fn owns_content(&self, document: &Document) -> bool {
        self.state
            .lock()
            .content
            .contains_key(&content_key(document))
    }

    /// Drop tracked documents not reachable from `outputs` and release the
    /// owned content none of the reachable documents uses.
    pub fn sweep(&self, outputs: &[Document]) -> SweepStats {
        let reachable = reachable_documents(outputs);
        let Tracked { documents, content } = mem::take(&mut *self.state.lock());

        let documents: FxHashMap<_, _> = documents
            .into_iter()
            .filter(|(key, _)| reachable.contains_key(key))
            .collect();

        let live_content: FxHashSet<usize> = reachable.values().map(content_key).collect();
        let (content, unused): (FxHashMap<_, _>, FxHashMap<_, _>) = content
            .into_iter()
            .partition(|(key, _)| live_content.contains(key));
        let released = release(unused);

        let stats = SweepStats {
            released,
            retained: documents.len(),
        };
        let mut state = self.state.lock();
        state.documents.extend(documents);
        state.content.extend(content);
        stats
    }

    /// Forget every tracked document and release the owned content. Used
    /// when a phase fails.
    pub fn release_all(&self) -> usize {
        let Tracked { content, .. } = mem::take(&mut *self.state.lock());
        release(content)
    }
}

/// Flatten the document graph rooted at `roots`.
///
/// The result contains every root plus every document transitively referenced
/// through metadata (directly, as a list, or nested in arrays/objects), keyed
/// by instance.
pub fn reachable_documents(roots: &[Document]) -> FxHashMap<usize, Document> {
    let mut reachable = FxHashMap::default();
    let mut stack: Vec<Document> = roots.to_vec();

    while let Some(doc) = stack.pop() {
        if reachable.contains_key(&doc.instance_key()) {
            continue;
        }
        doc.for_each_child(|child| {
            if !reachable.contains_key(&child.instance_key()) {
                stack.push(child.clone());
            }
        });
        reachable.insert(doc.instance_key(), doc);
    }

    reachable
}

fn content_key(doc: &Document) -> usize {
    Arc::as_ptr(doc.content()) as *const () as usize
}

fn release(content: FxHashMap<usize, Arc<dyn ContentProvider>>) -> usize {
    let providers: Vec<_> = content.into_values().collect();
    providers.par_iter().map(|provider| provider.release()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentChanges;
    use crate::value::Value;

    #[test]
    fn test_only_unreachable_released() {
        let tracker = DocumentTracker::new();
        let y = Document::from_text("y");
        let z = Document::from_text("z");
        let x = Document::from_text("x")
            .derive(DocumentChanges::new().set("refs", Value::Documents(vec![y.clone()])));
        for doc in [&x, &y, &z] {
            tracker.track_created(doc);
        }

        let stats = tracker.sweep(&[x.clone()]);
        assert_eq!(stats, SweepStats { released: 1, retained: 2 });
        assert!(!x.is_released());
        assert!(!y.is_released());
        assert!(z.is_released());
        assert_eq!(tracker.len(), 2);
        assert!(!tracker.contains(&z));
        assert!(!tracker.owns_content(&z));
    }

    #[test]
    fn test_reachability_follows_chains_and_cycles_terminate() {
        let c = Document::from_text("c");
        let b = Document::from_text("b").derive(DocumentChanges::new().set("next", c.clone()));
        let a = Document::from_text("a").derive(DocumentChanges::new().set(
            "nested",
            Value::Array(vec![Value::Document(b.clone())]),
        ));
        let reachable = reachable_documents(&[a.clone(), a.clone()]);
        assert_eq!(reachable.len(), 3);
        assert!(reachable.contains_key(&c.instance_key()));
    }

    #[test]
    fn test_older_clone_released_but_shared_content_kept() {
        let tracker = DocumentTracker::new();
        let original = Document::from_text("body");
        let renamed = original.derive(DocumentChanges::new().destination("out.html"));
        tracker.track_created(&original);
        tracker.track(&renamed);

        let stats = tracker.sweep(&[renamed.clone()]);
        assert_eq!(stats.retained, 1);
        assert_eq!(stats.released, 0);
        assert_eq!(renamed.read_string().unwrap(), "body");
        assert!(!tracker.contains(&original));
        assert!(tracker.owns_content(&renamed));
    }

    #[test]
    fn test_borrowed_content_never_released() {
        let tracker = DocumentTracker::new();
        let upstream = Document::from_text("upstream");
        let tagged = upstream.derive(DocumentChanges::new().set("tag", true));
        let replaced = tagged.derive(DocumentChanges::new().text("replaced"));
        tracker.track(&tagged);
        tracker.track_created(&replaced);

        let stats = tracker.sweep(&[replaced.clone()]);
        assert_eq!(stats, SweepStats { released: 0, retained: 1 });
        assert_eq!(upstream.read_string().unwrap(), "upstream");

        tracker.release_all();
        assert!(replaced.is_released());
        assert!(!upstream.is_released());
    }

    #[test]
    fn test_release_all() {
        let tracker = DocumentTracker::new();
        let a = Document::from_text("a");
        let b = Document::from_text("b").derive(DocumentChanges::new().set("k", 1));
        tracker.track_created(&a);
        tracker.track(&b);
        assert_eq!(tracker.release_all(), 1);
        assert!(a.is_released());
        assert!(!b.is_released());
        assert!(tracker.is_empty());
    }
}
