//! Documents: immutable content, replace-on-clone metadata, stable identity.
//!
//! ```text
//! Document (cheap handle, Arc)
//! ├── id           DocumentId   ── copied by every clone
//! ├── source       Option<PathBuf>
//! ├── destination  Option<PathBuf>
//! ├── metadata     Metadata     ── may reference other documents
//! └── content      Arc<dyn ContentProvider>
//! ```
//!
//! Two notions of sameness exist:
//!
//! - **Identity** ([`DocumentId`]): assigned once at creation, survives clones.
//! - **Instance** ([`Document::same_instance`]): one particular creation or
//!   clone. Lifecycle tracking works on instances, so an outdated clone can be
//!   released while its successor stays alive.

mod content;
mod factory;
mod lifecycle;

pub use content::{ContentProvider, FileContent, MemoryContent, NullContent};
pub use factory::{DefaultDocumentFactory, DocumentFactory};
pub use lifecycle::{reachable_documents, DocumentTracker, SweepStats};

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::fs::hash_reader;
use crate::value::{FromValue, Metadata, Value};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Stable document identity, shared by a document and all of its clones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(u64);

impl DocumentId {
    fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc#{}", self.0)
    }
}

struct DocumentData {
    id: DocumentId,
    source: Option<PathBuf>,
    destination: Option<PathBuf>,
    metadata: Metadata,
    content: Arc<dyn ContentProvider>,
}

/// An in-memory document flowing through pipeline phases.
///
/// Cloning the Rust value copies the handle, not the document. Use
/// [`Document::derive`] (or the context's document factory) to produce a new
/// instance with changes.
#[derive(Clone)]
pub struct Document(Arc<DocumentData>);

/// Changes applied when deriving a new document instance.
///
/// Unset fields are carried over from the original. Metadata is layered on top
/// of the original metadata.
#[derive(Clone, Default)]
pub struct DocumentChanges {
    source: Option<PathBuf>,
    destination: Option<PathBuf>,
    metadata: Option<Metadata>,
    content: Option<Arc<dyn ContentProvider>>,
}

impl DocumentChanges {
    /// No changes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the source path.
    pub fn source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    /// Replace the destination path.
    pub fn destination(mut self, path: impl Into<PathBuf>) -> Self {
        self.destination = Some(path.into());
        self
    }

    /// Layer metadata on top of the original.
    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(match self.metadata.take() {
            Some(existing) => existing.merged(&metadata),
            None => metadata,
        });
        self
    }

    /// Set a single metadata entry.
    pub fn set(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata(Metadata::new().with(key, value))
    }

    /// Replace the content.
    pub fn content(mut self, content: impl ContentProvider + 'static) -> Self {
        self.content = Some(Arc::new(content));
        self
    }

    /// Replace the content with a shared provider.
    pub fn content_arc(mut self, content: Arc<dyn ContentProvider>) -> Self {
        self.content = Some(content);
        self
    }

    /// Replace the content with in-memory text.
    pub fn text(self, text: impl Into<String>) -> Self {
        self.content(MemoryContent::from(text.into()))
    }
}

impl Document {
    /// Create a new document with a fresh identity.
    ///
    /// Documents created this way are not tracked by any phase; inside a
    /// module prefer [`ExecutionContext::create_document`].
    ///
    /// [`ExecutionContext::create_document`]: crate::ExecutionContext::create_document
    pub fn new(
        source: Option<PathBuf>,
        destination: Option<PathBuf>,
        metadata: Metadata,
        content: Arc<dyn ContentProvider>,
    ) -> Self {
        Self(Arc::new(DocumentData {
            id: DocumentId::next(),
            source,
            destination,
            metadata,
            content,
        }))
    }

    /// Create an untracked document holding `text`.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(
            None,
            None,
            Metadata::new(),
            Arc::new(MemoryContent::from(text.into())),
        )
    }

    /// Produce a new instance with the same identity and the given changes.
    pub fn derive(&self, changes: DocumentChanges) -> Self {
        let DocumentChanges {
            source,
            destination,
            metadata,
            content,
        } = changes;
        Self(Arc::new(DocumentData {
            id: self.0.id,
            source: source.or_else(|| self.0.source.clone()),
            destination: destination.or_else(|| self.0.destination.clone()),
            metadata: match metadata {
                Some(overlay) => self.0.metadata.merged(&overlay),
                None => self.0.metadata.clone(),
            },
            content: content.unwrap_or_else(|| self.0.content.clone()),
        }))
    }

    /// Stable identity.
    #[inline]
    pub fn id(&self) -> DocumentId {
        self.0.id
    }

    /// Source path, if the document came from a file.
    #[inline]
    pub fn source(&self) -> Option<&Path> {
        self.0.source.as_deref()
    }

    /// Destination path relative to the output root.
    #[inline]
    pub fn destination(&self) -> Option<&Path> {
        self.0.destination.as_deref()
    }

    /// All metadata.
    #[inline]
    pub fn metadata(&self) -> &Metadata {
        &self.0.metadata
    }

    /// Raw metadata lookup.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.metadata.get(key)
    }

    /// Typed metadata lookup.
    pub fn get_as<T: FromValue>(&self, key: &str) -> Option<T> {
        self.0.metadata.get_as(key)
    }

    /// The content provider.
    #[inline]
    pub fn content(&self) -> &Arc<dyn ContentProvider> {
        &self.0.content
    }

    /// Open a fresh content stream.
    pub fn open(&self) -> Result<Box<dyn Read + Send + '_>> {
        self.0.content.open()
    }

    /// Read the whole content into memory.
    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.open()?
            .read_to_end(&mut buf)
            .map_err(|e| crate::Error::io(self.display_path(), e))?;
        Ok(buf)
    }

    /// Read the whole content as UTF-8 text (lossy).
    pub fn read_string(&self) -> Result<String> {
        let bytes = self.read_bytes()?;
        Ok(String::from_utf8(bytes)
            .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()))
    }

    /// Hash of the content bytes, used by the write tracker.
    pub fn content_hash(&self) -> Result<u64> {
        let reader = self.open()?;
        hash_reader(reader).map_err(|e| crate::Error::io(self.display_path(), e))
    }

    /// Returns `true` if both handles point to the same instance.
    #[inline]
    pub fn same_instance(&self, other: &Document) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Key identifying this instance, stable while the instance is alive.
    #[inline]
    pub(crate) fn instance_key(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// Returns `true` once the content handle has been released.
    pub fn is_released(&self) -> bool {
        self.0.content.is_released()
    }

    /// Visit every document referenced from this document's metadata.
    pub fn for_each_child(&self, mut f: impl FnMut(&Document)) {
        for value in self.0.metadata.values() {
            value.for_each_document(&mut f);
        }
    }

    fn display_path(&self) -> PathBuf {
        self.0
            .source
            .clone()
            .or_else(|| self.0.destination.clone())
            .unwrap_or_else(|| PathBuf::from(self.0.id.to_string()))
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.0.id)
            .field("source", &self.0.source)
            .field("destination", &self.0.destination)
            .field("metadata", &self.0.metadata.len())
            .finish()
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.0.source, &self.0.destination) {
            (Some(src), _) => write!(f, "{}", src.display()),
            (None, Some(dest)) => write!(f, "{}", dest.display()),
            (None, None) => write!(f, "{}", self.0.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_keeps_identity() {
        let original = Document::from_text("hello");
        let derived = original.derive(DocumentChanges::new().destination("a.html").set("k", 1));

        assert_eq!(original.id(), derived.id());
        assert!(!original.same_instance(&derived));
        assert_eq!(derived.destination(), Some(Path::new("a.html")));
        assert_eq!(derived.get_as::<i64>("k"), Some(1));
        assert!(original.get("k").is_none());
        assert_eq!(derived.read_string().unwrap(), "hello");
    }

    #[test]
    fn test_new_documents_get_distinct_ids() {
        let a = Document::from_text("");
        let b = Document::from_text("");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_content_hash_tracks_content() {
        let a = Document::from_text("A");
        let b = a.derive(DocumentChanges::new().text("B"));
        let a2 = Document::from_text("A");
        assert_eq!(a.content_hash().unwrap(), a2.content_hash().unwrap());
        assert_ne!(a.content_hash().unwrap(), b.content_hash().unwrap());
    }

    #[test]
    fn test_changes_metadata_accumulates() {
        let doc = Document::from_text("x");
        let derived = doc.derive(DocumentChanges::new().set("a", 1).set("b", 2));
        assert_eq!(derived.metadata().len(), 2);
    }
}
