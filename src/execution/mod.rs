//! Running phase nodes.
//!
//! ```text
//! Engine::execute
//!   └── scheduler::schedule(graph)           one task per PhaseNode
//!         └── phase::execute_phase(node)     modules in sequence
//!               └── Module::execute(inputs, &ExecutionContext)
//!                     └── ExecutionContext::execute_modules (nested)
//! ```
//!
//! Everything a running node may touch is gathered in [`BuildState`], which
//! lives for exactly one build.

mod cancel;
mod context;
mod outputs;
pub(crate) mod phase;
pub(crate) mod scheduler;

pub use cancel::CancellationToken;
pub use context::ExecutionContext;
pub use outputs::{Outputs, PipelineOutputs};

use std::sync::Arc;

use crate::document::DocumentFactory;
use crate::fs::FileSystem;
use crate::pipeline::PhaseGraph;
use crate::settings::Settings;
use crate::tracker::WriteTracker;

/// Shared, read-mostly state of one build.
pub(crate) struct BuildState<'a> {
    pub(crate) build: u64,
    pub(crate) settings: &'a Settings,
    pub(crate) fs: &'a Arc<dyn FileSystem>,
    pub(crate) factory: &'a dyn DocumentFactory,
    pub(crate) tracker: &'a WriteTracker,
    pub(crate) cancel: &'a CancellationToken,
    pub(crate) graph: &'a PhaseGraph,
    pub(crate) outputs: &'a PipelineOutputs,
}

#[cfg(test)]
pub(crate) mod testing {
    //! Standalone contexts for module tests.

    use std::sync::Arc;

    use super::*;
    use crate::document::{DefaultDocumentFactory, Document};
    use crate::error::Result;
    use crate::fs::MemoryFileSystem;
    use crate::module::Module;
    use crate::pipeline::{build_graph, Phase, PhaseNode, Pipeline, Pipelines};

    /// A single pipeline named `test` with a memory file system.
    pub(crate) struct Harness {
        pub(crate) memory: Arc<MemoryFileSystem>,
        pub(crate) fs: Arc<dyn FileSystem>,
        pub(crate) settings: Settings,
        pub(crate) tracker: WriteTracker,
        pub(crate) cancel: CancellationToken,
        pub(crate) graph: PhaseGraph,
        pub(crate) outputs: PipelineOutputs,
        factory: DefaultDocumentFactory,
    }

    impl Harness {
        pub(crate) fn new() -> Self {
            Self::with_pipelines([Pipeline::builder("test").build()].into_iter().collect())
        }

        pub(crate) fn with_pipelines(pipelines: Pipelines) -> Self {
            let memory = Arc::new(MemoryFileSystem::new());
            let graph = build_graph(&pipelines).unwrap();
            let outputs = PipelineOutputs::for_graph(&graph);
            Self {
                fs: memory.clone(),
                memory,
                settings: Settings::new(),
                tracker: WriteTracker::new(),
                cancel: CancellationToken::new(),
                graph,
                outputs,
                factory: DefaultDocumentFactory,
            }
        }

        pub(crate) fn settings(mut self, settings: Settings) -> Self {
            self.settings = settings;
            self
        }

        pub(crate) fn node(&self, phase: Phase) -> &PhaseNode {
            self.graph.node("test", phase).unwrap()
        }

        /// Run `f` with a context of the `test` pipeline's `phase`.
        pub(crate) fn run<R>(&self, phase: Phase, f: impl FnOnce(&ExecutionContext<'_>) -> R) -> R {
            self.run_in("test", phase, f)
        }

        pub(crate) fn run_in<R>(
            &self,
            pipeline: &str,
            phase: Phase,
            f: impl FnOnce(&ExecutionContext<'_>) -> R,
        ) -> R {
            let state = self.state();
            let node = self.graph.node(pipeline, phase).unwrap();
            let ctx = ExecutionContext::new(&state, node, "test", None);
            f(&ctx)
        }

        /// Execute one module in the Process phase.
        pub(crate) fn execute(
            &self,
            module: &dyn Module,
            inputs: &[Document],
        ) -> Result<Vec<Document>> {
            self.run(Phase::Process, |ctx| module.execute(inputs, ctx))
        }

        pub(crate) fn state(&self) -> BuildState<'_> {
            BuildState {
                build: 1,
                settings: &self.settings,
                fs: &self.fs,
                factory: &self.factory,
                tracker: &self.tracker,
                cancel: &self.cancel,
                graph: &self.graph,
                outputs: &self.outputs,
            }
        }
    }
}
