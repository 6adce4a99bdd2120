//! Document creation hooks.

use std::path::PathBuf;
use std::sync::Arc;

use super::{ContentProvider, Document, DocumentChanges};
use crate::value::Metadata;

/// Creates and clones documents on behalf of modules.
///
/// The engine wraps every call so that the produced instance is tracked by the
/// executing phase; implementations only decide *what* gets built. Replace the
/// default with [`EngineBuilder::document_factory`](crate::EngineBuilder::document_factory)
/// to stamp every document with extra metadata or to normalize paths.
pub trait DocumentFactory: Send + Sync {
    /// Create a document with a fresh identity.
    fn create(
        &self,
        source: Option<PathBuf>,
        destination: Option<PathBuf>,
        metadata: Metadata,
        content: Arc<dyn ContentProvider>,
    ) -> Document {
        Document::new(source, destination, metadata, content)
    }

    /// Derive a new instance of `original`, keeping its identity.
    fn clone_document(&self, original: &Document, changes: DocumentChanges) -> Document {
        original.derive(changes)
    }
}

/// Factory that builds plain documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDocumentFactory;

impl DocumentFactory for DefaultDocumentFactory {}
