//! Cross-pipeline document outputs.
//!
//! ```text
//! PipelineOutputs                 (one slot per pipeline, created per build)
//! ├── "posts" → RwLock<[Document]>   latest finished phase of "posts"
//! ├── "tags"  → RwLock<[Document]>
//! └── …
//!
//! Outputs<'a>                     (guarded view handed to a module)
//! └── which slots the requesting pipeline/phase may read
//! ```
//!
//! | requester            | may read                              |
//! |----------------------|---------------------------------------|
//! | any phase            | its own pipeline                      |
//! | Read                 | nothing else                          |
//! | Process              | transitive dependencies               |
//! | Render / Write       | every non-isolated pipeline           |
//! | isolated pipeline    | nothing else                          |

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::document::Document;
use crate::error::{Error, Result};
use crate::pipeline::{Phase, PhaseGraph};

/// Latest outputs of every pipeline in the current (or last) build.
#[derive(Debug, Default)]
pub struct PipelineOutputs {
    slots: IndexMap<String, RwLock<Arc<[Document]>>>,
}

impl PipelineOutputs {
    /// Create one empty slot per pipeline of `graph`.
    pub(crate) fn for_graph(graph: &PhaseGraph) -> Self {
        Self {
            slots: graph
                .pipeline_names()
                .map(|name| (name.to_owned(), RwLock::new(Arc::from(Vec::new()))))
                .collect(),
        }
    }

    /// Replace a pipeline's outputs. Unknown names are ignored.
    pub(crate) fn publish(&self, pipeline: &str, documents: Arc<[Document]>) {
        if let Some(slot) = self.slots.get(pipeline) {
            *slot.write() = documents;
        }
    }

    /// Outputs of one pipeline, unguarded.
    pub fn get(&self, pipeline: &str) -> Option<Arc<[Document]>> {
        self.slots.get(pipeline).map(|slot| slot.read().clone())
    }

    /// Pipeline names with a slot.
    pub fn pipelines(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// Every output document of every pipeline, in pipeline order.
    pub fn all(&self) -> Vec<Document> {
        self.slots
            .values()
            .flat_map(|slot| slot.read().iter().cloned().collect::<Vec<_>>())
            .collect()
    }

    /// Number of pipelines.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if there are no pipelines.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Outputs as seen from one executing phase.
#[derive(Clone, Copy)]
pub struct Outputs<'a> {
    outputs: &'a PipelineOutputs,
    graph: &'a PhaseGraph,
    pipeline: &'a str,
    phase: Phase,
}

impl<'a> Outputs<'a> {
    pub(crate) fn new(
        outputs: &'a PipelineOutputs,
        graph: &'a PhaseGraph,
        pipeline: &'a str,
        phase: Phase,
    ) -> Self {
        Self {
            outputs,
            graph,
            pipeline,
            phase,
        }
    }

    /// Returns `true` if the requesting phase may read `pipeline`.
    pub fn is_available(&self, pipeline: &str) -> bool {
        if pipeline == self.pipeline {
            return self.graph.pipeline(pipeline).is_some();
        }
        let (Some(own), Some(other)) = (
            self.graph.pipeline(self.pipeline),
            self.graph.pipeline(pipeline),
        ) else {
            return false;
        };
        if own.isolated {
            return false;
        }
        match self.phase {
            Phase::Read => false,
            Phase::Process => own.dependencies.contains(pipeline),
            Phase::Render | Phase::Write => !other.isolated,
        }
    }

    /// Outputs of `pipeline`, or [`Error::OutputsUnavailable`] if the
    /// requesting phase may not observe them.
    pub fn from_pipeline(&self, pipeline: &str) -> Result<Arc<[Document]>> {
        if !self.is_available(pipeline) {
            return Err(Error::OutputsUnavailable {
                pipeline: self.pipeline.to_owned(),
                phase: self.phase,
                requested: pipeline.to_owned(),
            });
        }
        Ok(self.outputs.get(pipeline).unwrap_or_else(|| Arc::from(Vec::new())))
    }

    /// Outputs of every other pipeline the requesting phase may read.
    pub fn visible(&self) -> Vec<(&'a str, Arc<[Document]>)> {
        self.outputs
            .pipelines()
            .filter(|name| *name != self.pipeline && self.is_available(name))
            .filter_map(|name| Some((name, self.outputs.get(name)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{build_graph, Pipeline, Pipelines};

    fn graph() -> PhaseGraph {
        let pipelines: Pipelines = [
            Pipeline::builder("base").build(),
            Pipeline::builder("mid").depends_on("base").build(),
            Pipeline::builder("top").depends_on("mid").build(),
            Pipeline::builder("side").build(),
            Pipeline::builder("iso").isolated().build(),
        ]
        .into_iter()
        .collect();
        build_graph(&pipelines).unwrap()
    }

    #[test]
    fn test_process_sees_transitive_dependencies_only() {
        let graph = graph();
        let outputs = PipelineOutputs::for_graph(&graph);
        let view = Outputs::new(&outputs, &graph, "top", Phase::Process);

        assert!(view.is_available("mid"));
        assert!(view.is_available("base"));
        assert!(view.is_available("top"));
        assert!(!view.is_available("side"));
        assert!(matches!(
            view.from_pipeline("side"),
            Err(Error::OutputsUnavailable { .. })
        ));
    }

    #[test]
    fn test_render_sees_non_isolated() {
        let graph = graph();
        let outputs = PipelineOutputs::for_graph(&graph);
        let view = Outputs::new(&outputs, &graph, "base", Phase::Render);
        assert!(view.is_available("side"));
        assert!(view.is_available("top"));
        assert!(!view.is_available("iso"));
        assert_eq!(view.visible().len(), 3);

        let read = Outputs::new(&outputs, &graph, "top", Phase::Read);
        assert!(!read.is_available("base"));
    }

    #[test]
    fn test_isolated_sees_only_itself() {
        let graph = graph();
        let outputs = PipelineOutputs::for_graph(&graph);
        outputs.publish("iso", Arc::from(vec![Document::from_text("i")]));

        let view = Outputs::new(&outputs, &graph, "iso", Phase::Write);
        assert!(!view.is_available("base"));
        assert_eq!(view.from_pipeline("iso").unwrap().len(), 1);
        assert!(view.visible().is_empty());
    }
}
