//! Pipeline dependency graph.
//!
//! Pipelines are visited depth-first (dependencies first) and every pipeline
//! contributes four phase nodes. Nodes are laid out phase-major:
//!
//! ```text
//! index = phase * pipeline_count + visitation_position
//!
//! [ Read(p0) Read(p1) … | Process(p0) … | Render(p0) … | Write(p0) … ]
//! ```
//!
//! Edges (dependency index 0 always feeds the node's input):
//!
//! ```text
//! Read    ← (none)
//! Process ← own Read, Process of each declared dependency
//! Render  ← own Process, Process of every other non-isolated pipeline
//! Write   ← own Render
//! ```
//!
//! Isolated pipelines get the plain Read → Process → Render → Write chain and
//! never take part in the Render fan-in.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use super::{ModuleList, Phase, Pipeline, Pipelines};
use crate::document::{Document, DocumentTracker};

/// Invalid pipeline graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// A declared dependency does not exist.
    #[error("pipeline {pipeline} depends on missing pipeline {dependency}")]
    MissingDependency {
        /// Declaring pipeline.
        pipeline: String,
        /// Missing name.
        dependency: String,
    },

    /// A pipeline depends on an isolated pipeline.
    #[error("pipeline {pipeline} depends on isolated pipeline {dependency}")]
    IsolatedDependency {
        /// Declaring pipeline.
        pipeline: String,
        /// Isolated dependency.
        dependency: String,
    },

    /// Dependencies form a cycle (including a pipeline depending on itself).
    #[error("pipeline dependency cycle: {}", .cycle.join(" -> "))]
    CyclicDependency {
        /// Pipelines on the cycle; the first name is repeated at the end.
        cycle: Vec<String>,
    },

    /// An isolated pipeline declares dependencies.
    #[error("isolated pipeline {pipeline} cannot declare dependencies")]
    IsolatedWithDependencies {
        /// The isolated pipeline.
        pipeline: String,
    },
}

/// Per-pipeline facts derived while building the graph.
#[derive(Debug, Clone, Default)]
pub struct PipelineInfo {
    /// Visitation position.
    pub position: usize,
    /// Isolation flag.
    pub isolated: bool,
    /// Direct and transitive dependencies.
    pub dependencies: FxHashSet<String>,
}

/// One phase of one pipeline, as scheduled.
pub struct PhaseNode {
    index: usize,
    pipeline: String,
    phase: Phase,
    isolated: bool,
    modules: ModuleList,
    dependencies: Vec<usize>,
    tracker: DocumentTracker,
    outputs: RwLock<Arc<[Document]>>,
}

impl PhaseNode {
    /// Position in the graph's node list.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Owning pipeline.
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// Phase kind.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns `true` if the owning pipeline is isolated.
    pub fn is_isolated(&self) -> bool {
        self.isolated
    }

    /// Modules run by this node, in order.
    pub fn modules(&self) -> &ModuleList {
        &self.modules
    }

    /// Node indices this node waits for. Index 0 supplies the input.
    pub fn dependencies(&self) -> &[usize] {
        &self.dependencies
    }

    /// The dependency whose outputs become this node's input.
    pub fn input_dependency(&self) -> Option<usize> {
        self.dependencies.first().copied()
    }

    /// Documents created during this node's executions.
    pub fn tracker(&self) -> &DocumentTracker {
        &self.tracker
    }

    /// Outputs of the most recent execution.
    pub fn outputs(&self) -> Arc<[Document]> {
        self.outputs.read().clone()
    }

    pub(crate) fn set_outputs(&self, outputs: Arc<[Document]>) {
        *self.outputs.write() = outputs;
    }

    /// Label used in logs and reports.
    pub fn label(&self) -> String {
        format!("{}/{}", self.pipeline, self.phase)
    }
}

impl std::fmt::Debug for PhaseNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseNode")
            .field("index", &self.index)
            .field("pipeline", &self.pipeline)
            .field("phase", &self.phase)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// Scheduled form of a pipeline collection.
#[derive(Debug)]
pub struct PhaseGraph {
    nodes: Vec<PhaseNode>,
    pipelines: IndexMap<String, PipelineInfo>,
    version: u64,
}

impl PhaseGraph {
    /// All nodes: Read nodes, then Process, Render, Write.
    pub fn nodes(&self) -> &[PhaseNode] {
        &self.nodes
    }

    /// The node for one pipeline phase.
    pub fn node(&self, pipeline: &str, phase: Phase) -> Option<&PhaseNode> {
        let info = self.pipelines.get(pipeline)?;
        self.nodes
            .get(phase.index() * self.pipelines.len() + info.position)
    }

    /// Facts about a pipeline.
    pub fn pipeline(&self, name: &str) -> Option<&PipelineInfo> {
        self.pipelines.get(name)
    }

    /// Pipeline names in visitation order.
    pub fn pipeline_names(&self) -> impl Iterator<Item = &str> {
        self.pipelines.keys().map(String::as_str)
    }

    /// Version of the pipeline collection this graph was built from.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if there are no pipelines.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Visited,
}

struct Visitor<'a> {
    pipelines: &'a Pipelines,
    marks: FxHashMap<&'a str, Mark>,
    path: Vec<&'a str>,
    order: Vec<&'a Pipeline>,
    transitive: FxHashMap<&'a str, FxHashSet<String>>,
}

impl<'a> Visitor<'a> {
    fn visit(&mut self, pipeline: &'a Pipeline) -> Result<(), GraphError> {
        let name = pipeline.name();
        match self.marks.get(name) {
            Some(Mark::Visited) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = self.path.iter().position(|p| *p == name).unwrap_or(0);
                let mut cycle: Vec<String> =
                    self.path[start..].iter().map(|p| p.to_string()).collect();
                cycle.push(name.to_owned());
                return Err(GraphError::CyclicDependency { cycle });
            }
            None => {}
        }

        if pipeline.is_isolated() {
            if pipeline.dependencies().next().is_some() {
                return Err(GraphError::IsolatedWithDependencies {
                    pipeline: name.to_owned(),
                });
            }
            self.marks.insert(name, Mark::Visited);
            self.order.push(pipeline);
            return Ok(());
        }

        self.marks.insert(name, Mark::Visiting);
        self.path.push(name);

        let mut transitive = FxHashSet::default();
        for dependency in pipeline.dependencies() {
            let Some(dep) = self.pipelines.get(dependency) else {
                return Err(GraphError::MissingDependency {
                    pipeline: name.to_owned(),
                    dependency: dependency.to_owned(),
                });
            };
            if dep.is_isolated() {
                return Err(GraphError::IsolatedDependency {
                    pipeline: name.to_owned(),
                    dependency: dependency.to_owned(),
                });
            }
            self.visit(dep)?;
            transitive.insert(dependency.to_owned());
            if let Some(inherited) = self.transitive.get(dep.name()) {
                transitive.extend(inherited.iter().cloned());
            }
        }

        self.path.pop();
        self.marks.insert(name, Mark::Visited);
        self.transitive.insert(name, transitive);
        self.order.push(pipeline);
        Ok(())
    }
}

/// Topologically sort `pipelines` into phase nodes.
///
/// Fails fast with the first configuration error found; nothing is scheduled
/// for an invalid collection.
pub fn build_graph(pipelines: &Pipelines) -> Result<PhaseGraph, GraphError> {
    let mut visitor = Visitor {
        pipelines,
        marks: FxHashMap::default(),
        path: Vec::new(),
        order: Vec::with_capacity(pipelines.len()),
        transitive: FxHashMap::default(),
    };
    for pipeline in pipelines.iter() {
        visitor.visit(pipeline)?;
    }

    let order = visitor.order;
    let count = order.len();
    let infos: IndexMap<String, PipelineInfo> = order
        .iter()
        .enumerate()
        .map(|(position, p)| {
            let info = PipelineInfo {
                position,
                isolated: p.is_isolated(),
                dependencies: visitor.transitive.remove(p.name()).unwrap_or_default(),
            };
            (p.name().to_owned(), info)
        })
        .collect();

    let index = |phase: Phase, position: usize| phase.index() * count + position;

    let mut nodes = Vec::with_capacity(count * Phase::ALL.len());
    for phase in Phase::ALL {
        for (position, pipeline) in order.iter().enumerate() {
            let dependencies = match phase {
                Phase::Read => Vec::new(),
                Phase::Process => std::iter::once(index(Phase::Read, position))
                    .chain(
                        pipeline
                            .dependencies()
                            .map(|d| index(Phase::Process, infos[d].position)),
                    )
                    .collect(),
                Phase::Render => {
                    let mut deps = vec![index(Phase::Process, position)];
                    if !pipeline.is_isolated() {
                        deps.extend(
                            infos
                                .values()
                                .filter(|other| !other.isolated && other.position != position)
                                .map(|other| index(Phase::Process, other.position)),
                        );
                    }
                    deps
                }
                Phase::Write => vec![index(Phase::Render, position)],
            };

            nodes.push(PhaseNode {
                index: index(phase, position),
                pipeline: pipeline.name().to_owned(),
                phase,
                isolated: pipeline.is_isolated(),
                modules: pipeline.modules(phase).clone(),
                dependencies,
                tracker: DocumentTracker::new(),
                outputs: RwLock::new(Arc::from(Vec::new())),
            });
        }
    }

    Ok(PhaseGraph {
        nodes,
        pipelines: infos,
        version: pipelines.version(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipelines(specs: &[(&str, &[&str], bool)]) -> Pipelines {
        specs
            .iter()
            .map(|(name, deps, isolated)| {
                let mut builder = Pipeline::builder(*name);
                for dep in *deps {
                    builder = builder.depends_on(*dep);
                }
                if *isolated {
                    builder = builder.isolated();
                }
                builder.build()
            })
            .collect()
    }

    fn process_position(graph: &PhaseGraph, name: &str) -> usize {
        graph.node(name, Phase::Process).unwrap().index()
    }

    #[test]
    fn test_dependencies_precede_dependents() {
        let graph = build_graph(&pipelines(&[
            ("site", &["posts", "tags"], false),
            ("tags", &["posts"], false),
            ("posts", &[], false),
        ]))
        .unwrap();

        assert!(process_position(&graph, "posts") < process_position(&graph, "tags"));
        assert!(process_position(&graph, "tags") < process_position(&graph, "site"));

        let site = graph.node("site", Phase::Process).unwrap();
        assert_eq!(site.input_dependency(), Some(graph.node("site", Phase::Read).unwrap().index()));
        assert!(site.dependencies().contains(&process_position(&graph, "posts")));
        assert!(graph.pipeline("site").unwrap().dependencies.contains("posts"));
    }

    #[test]
    fn test_nodes_are_phase_major() {
        let graph = build_graph(&pipelines(&[("a", &[], false), ("b", &[], false)])).unwrap();
        let phases: Vec<Phase> = graph.nodes().iter().map(PhaseNode::phase).collect();
        assert_eq!(
            phases,
            [
                Phase::Read, Phase::Read,
                Phase::Process, Phase::Process,
                Phase::Render, Phase::Render,
                Phase::Write, Phase::Write,
            ]
        );
        for (i, node) in graph.nodes().iter().enumerate() {
            assert_eq!(node.index(), i);
        }
    }

    #[test]
    fn test_cycle_detected() {
        let cyclic = pipelines(&[("a", &["b"], false), ("b", &["a"], false)]);
        let err = build_graph(&cyclic).unwrap_err();
        assert_eq!(
            err,
            GraphError::CyclicDependency {
                cycle: vec!["a".into(), "b".into(), "a".into()]
            }
        );
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let err = build_graph(&pipelines(&[("a", &["a"], false)])).unwrap_err();
        assert!(matches!(err, GraphError::CyclicDependency { .. }));
    }

    #[test]
    fn test_missing_dependency() {
        let err = build_graph(&pipelines(&[("a", &["nope"], false)])).unwrap_err();
        assert_eq!(
            err,
            GraphError::MissingDependency {
                pipeline: "a".into(),
                dependency: "nope".into()
            }
        );
    }

    #[test]
    fn test_isolated_dependency_rejected() {
        let invalid = pipelines(&[("iso", &[], true), ("a", &["iso"], false)]);
        let err = build_graph(&invalid).unwrap_err();
        assert!(matches!(err, GraphError::IsolatedDependency { .. }));

        let err = build_graph(&pipelines(&[("a", &[], false), ("iso", &["a"], true)])).unwrap_err();
        assert!(matches!(err, GraphError::IsolatedWithDependencies { .. }));
    }

    #[test]
    fn test_isolated_pipeline_is_private_chain() {
        let graph = build_graph(&pipelines(&[
            ("a", &[], false),
            ("iso", &[], true),
            ("b", &["a"], false),
        ]))
        .unwrap();

        let iso: Vec<usize> = Phase::ALL
            .iter()
            .map(|p| graph.node("iso", *p).unwrap().index())
            .collect();

        for node in graph.nodes() {
            if node.pipeline() == "iso" {
                assert!(node.dependencies().iter().all(|d| iso.contains(d)), "{node:?}");
            } else {
                assert!(node.dependencies().iter().all(|d| !iso.contains(d)), "{node:?}");
            }
        }
        let render = graph.node("iso", Phase::Render).unwrap();
        assert_eq!(render.dependencies(), &[iso[1]]);
    }

    #[test]
    fn test_render_fan_in() {
        let graph = build_graph(&pipelines(&[
            ("a", &[], false),
            ("b", &[], false),
            ("c", &[], false),
        ]))
        .unwrap();

        let processes: FxHashSet<usize> = ["a", "b", "c"]
            .iter()
            .map(|n| process_position(&graph, n))
            .collect();
        for name in ["a", "b", "c"] {
            let render = graph.node(name, Phase::Render).unwrap();
            let deps: FxHashSet<usize> = render.dependencies().iter().copied().collect();
            assert_eq!(deps, processes);
            assert_eq!(render.input_dependency(), Some(process_position(&graph, name)));

            let write = graph.node(name, Phase::Write).unwrap();
            assert_eq!(write.dependencies(), &[render.index()]);
        }
    }

    #[test]
    fn test_empty_phases_stay_in_graph() {
        let graph = build_graph(&pipelines(&[("a", &[], false)])).unwrap();
        assert_eq!(graph.len(), 4);
        assert!(graph.nodes().iter().all(|n| n.modules().is_empty()));
    }
}
