//! Pipelines, phases and the dependency graph between them.
//!
//! ```text
//! Pipeline "posts"                 Pipeline "index" (depends on posts)
//! ┌────────┬─────────┬────────┬───────┐
//! │ Read   │ Process │ Render │ Write │
//! └────────┴─────────┴────────┴───────┘
//! ```
//!
//! - [`Pipeline`] - four ordered module lists, dependencies, isolation flag
//! - [`Pipelines`] - ordered, versioned collection
//! - [`build_graph`] - topological sort into [`PhaseNode`]s

mod collection;
mod graph;

pub use collection::Pipelines;
pub use graph::{build_graph, GraphError, PhaseGraph, PhaseNode, PipelineInfo};

use std::fmt;
use std::sync::Arc;

use indexmap::IndexSet;

use crate::module::Module;

/// One of the four phases every pipeline has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// Load documents.
    Read,
    /// Transform documents; other pipelines may depend on this phase.
    Process,
    /// Produce final content once every non-isolated pipeline has processed.
    Render,
    /// Write outputs.
    Write,
}

impl Phase {
    /// All phases in execution order.
    pub const ALL: [Phase; 4] = [Phase::Read, Phase::Process, Phase::Render, Phase::Write];

    /// Position in [`Phase::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "Read",
            Self::Process => "Process",
            Self::Render => "Render",
            Self::Write => "Write",
        })
    }
}

/// Ordered list of modules for one phase.
pub type ModuleList = Vec<Arc<dyn Module>>;

/// A named pipeline.
///
/// # Example
///
/// ```ignore
/// let pipeline = Pipeline::builder("posts")
///     .read(ReadFiles::new("posts"))
///     .process(SetDestination::with_extension("html"))
///     .write(WriteFiles::new())
///     .build();
/// ```
#[derive(Clone)]
pub struct Pipeline {
    name: String,
    phases: [ModuleList; 4],
    dependencies: IndexSet<String>,
    isolated: bool,
}

impl Pipeline {
    /// Start building a pipeline.
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder {
            pipeline: Pipeline {
                name: name.into(),
                phases: Default::default(),
                dependencies: IndexSet::new(),
                isolated: false,
            },
        }
    }

    /// Pipeline name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Modules of one phase.
    pub fn modules(&self, phase: Phase) -> &ModuleList {
        &self.phases[phase.index()]
    }

    /// Mutable access to the modules of one phase.
    pub fn modules_mut(&mut self, phase: Phase) -> &mut ModuleList {
        &mut self.phases[phase.index()]
    }

    /// Declared dependency names, in declaration order.
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.dependencies.iter().map(String::as_str)
    }

    /// Declare a dependency.
    pub fn add_dependency(&mut self, name: impl Into<String>) {
        self.dependencies.insert(name.into());
    }

    /// Returns `true` if the pipeline takes no part in cross-pipeline wiring.
    pub fn is_isolated(&self) -> bool {
        self.isolated
    }

    /// Change the isolation flag.
    pub fn set_isolated(&mut self, isolated: bool) {
        self.isolated = isolated;
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: Vec<usize> = self.phases.iter().map(Vec::len).collect();
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("modules", &counts)
            .field("dependencies", &self.dependencies)
            .field("isolated", &self.isolated)
            .finish()
    }
}

/// Fluent builder for [`Pipeline`].
pub struct PipelineBuilder {
    pipeline: Pipeline,
}

impl PipelineBuilder {
    /// Append a module to a phase.
    pub fn module(mut self, phase: Phase, module: impl Module + 'static) -> Self {
        self.pipeline.phases[phase.index()].push(Arc::new(module));
        self
    }

    /// Append a shared module to a phase.
    pub fn module_arc(mut self, phase: Phase, module: Arc<dyn Module>) -> Self {
        self.pipeline.phases[phase.index()].push(module);
        self
    }

    /// Append a Read module.
    pub fn read(self, module: impl Module + 'static) -> Self {
        self.module(Phase::Read, module)
    }

    /// Append a Process module.
    pub fn process(self, module: impl Module + 'static) -> Self {
        self.module(Phase::Process, module)
    }

    /// Append a Render module.
    pub fn render(self, module: impl Module + 'static) -> Self {
        self.module(Phase::Render, module)
    }

    /// Append a Write module.
    pub fn write(self, module: impl Module + 'static) -> Self {
        self.module(Phase::Write, module)
    }

    /// Declare a dependency on another pipeline.
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.pipeline.add_dependency(name);
        self
    }

    /// Mark the pipeline as isolated.
    pub fn isolated(mut self) -> Self {
        self.pipeline.isolated = true;
        self
    }

    /// Finish building.
    pub fn build(self) -> Pipeline {
        self.pipeline
    }
}
