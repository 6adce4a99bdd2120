//! What a module sees while it runs.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use super::outputs::Outputs;
use super::{BuildState, CancellationToken};
use crate::config::ConfigCache;
use crate::document::{ContentProvider, Document, DocumentChanges, MemoryContent};
use crate::error::Result;
use crate::fs::FileSystem;
use crate::module::Module;
use crate::pipeline::{Phase, PhaseNode};
use crate::settings::Settings;
use crate::tracker::WriteTracker;
use crate::value::Metadata;

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

/// Execution context of one module invocation.
///
/// A fresh context is created for every module a phase runs, and for every
/// nested module run through [`execute_modules`](Self::execute_modules).
/// Context-only [`Config`](crate::Config) values are evaluated at most once
/// per context.
pub struct ExecutionContext<'a> {
    id: u64,
    state: &'a BuildState<'a>,
    node: &'a PhaseNode,
    module: String,
    parent: Option<&'a ExecutionContext<'a>>,
    cache: ConfigCache,
}

impl<'a> ExecutionContext<'a> {
    pub(crate) fn new(
        state: &'a BuildState<'a>,
        node: &'a PhaseNode,
        module: &str,
        parent: Option<&'a ExecutionContext<'a>>,
    ) -> Self {
        Self {
            id: NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed),
            state,
            node,
            module: module.to_owned(),
            parent,
            cache: ConfigCache::new(),
        }
    }

    /// Unique id of this context.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Name of the executing pipeline.
    pub fn pipeline(&self) -> &str {
        self.node.pipeline()
    }

    /// The executing phase.
    pub fn phase(&self) -> Phase {
        self.node.phase()
    }

    /// Name of the executing module.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Context of the meta-module that runs this one, if any.
    pub fn parent(&self) -> Option<&ExecutionContext<'a>> {
        self.parent
    }

    /// Nesting depth; `0` for modules run directly by a phase.
    pub fn depth(&self) -> usize {
        self.parent.map_or(0, |p| p.depth() + 1)
    }

    /// Build counter of the running engine, starting at 1.
    pub fn build(&self) -> u64 {
        self.state.build
    }

    /// Engine settings.
    pub fn settings(&self) -> &'a Settings {
        self.state.settings
    }

    /// The engine's file system.
    pub fn fs(&self) -> &'a Arc<dyn FileSystem> {
        self.state.fs
    }

    /// The engine's write tracker.
    pub fn write_tracker(&self) -> &'a WriteTracker {
        self.state.tracker
    }

    /// Cancellation signal of the running build.
    pub fn cancellation(&self) -> &'a CancellationToken {
        self.state.cancel
    }

    /// Returns `true` once the build was canceled.
    pub fn is_canceled(&self) -> bool {
        self.state.cancel.is_canceled()
    }

    /// Fail with [`Error::Canceled`](crate::Error::Canceled) if the build was
    /// canceled.
    pub fn check_canceled(&self) -> Result<()> {
        self.state.cancel.check()
    }

    /// Guarded view of other pipelines' outputs.
    pub fn outputs(&self) -> Outputs<'a> {
        Outputs::new(
            self.state.outputs,
            self.state.graph,
            self.node.pipeline(),
            self.node.phase(),
        )
    }

    /// Create a document tracked by the executing phase.
    ///
    /// The phase takes ownership of `content` and releases it once none of
    /// its outputs uses it. To reuse another document's content, derive with
    /// [`clone_document`](Self::clone_document) instead.
    pub fn create_document(
        &self,
        source: Option<PathBuf>,
        destination: Option<PathBuf>,
        metadata: Metadata,
        content: Arc<dyn ContentProvider>,
    ) -> Document {
        let document = self.state.factory.create(source, destination, metadata, content);
        self.node.tracker().track_created(&document);
        document
    }

    /// Create a tracked in-memory text document.
    pub fn create_text(
        &self,
        destination: Option<PathBuf>,
        metadata: Metadata,
        text: impl Into<String>,
    ) -> Document {
        self.create_document(
            None,
            destination,
            metadata,
            Arc::new(MemoryContent::from(text.into())),
        )
    }

    /// Derive a new instance of `original`, tracked by the executing phase.
    pub fn clone_document(&self, original: &Document, changes: DocumentChanges) -> Document {
        let document = self.state.factory.clone_document(original, changes);
        if Arc::ptr_eq(document.content(), original.content()) {
            self.node.tracker().track(&document);
        } else {
            self.node.tracker().track_created(&document);
        }
        document
    }

    /// Run a nested module list on `inputs`, each module in a child context.
    ///
    /// Modules run in sequence; each receives the previous one's outputs.
    pub fn execute_modules(
        &self,
        modules: &[Arc<dyn Module>],
        inputs: &[Document],
    ) -> Result<Vec<Document>> {
        let mut documents = inputs.to_vec();
        for module in modules {
            self.check_canceled()?;
            let child = ExecutionContext::new(self.state, self.node, module.name(), Some(self));
            debug!(
                module = module.name(),
                parent = %self.module,
                inputs = documents.len(),
                "nested module"
            );
            documents = module.execute(&documents, &child)?;
        }
        Ok(documents)
    }

    pub(crate) fn config_cache(&self) -> &ConfigCache {
        &self.cache
    }
}

impl std::fmt::Debug for ExecutionContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.id)
            .field("pipeline", &self.node.pipeline())
            .field("phase", &self.node.phase())
            .field("module", &self.module)
            .field("depth", &self.depth())
            .finish()
    }
}
