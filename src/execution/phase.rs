//! Executing a single phase node.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info_span};

use super::{BuildState, ExecutionContext};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::pipeline::PhaseNode;

/// Run `node`'s modules in sequence on `input`.
///
/// On success the final outputs are swept (unreachable tracked documents are
/// released), stored on the node and published for other pipelines. On
/// failure the node's outputs become empty and every tracked document is
/// released.
pub(crate) fn execute_phase(
    state: &BuildState<'_>,
    node: &PhaseNode,
    input: Arc<[Document]>,
) -> Result<Arc<[Document]>> {
    let span = info_span!("phase", pipeline = node.pipeline(), phase = %node.phase());
    let _enter = span.enter();
    let started = Instant::now();

    if node.modules().is_empty() {
        debug!(documents = input.len(), "no modules, passing input through");
        finish(state, node, input.clone());
        return Ok(input);
    }

    let mut documents: Vec<Document> = input.to_vec();
    for module in node.modules() {
        if let Err(canceled) = state.cancel.check() {
            abort(state, node);
            return Err(canceled);
        }

        let ctx = ExecutionContext::new(state, node, module.name(), None);
        let inputs = documents.len();
        match module.execute(&documents, &ctx) {
            Ok(outputs) => {
                debug!(module = module.name(), inputs, outputs = outputs.len(), "module finished");
                documents = outputs;
            }
            Err(source) => {
                let elapsed = started.elapsed();
                error!(module = module.name(), inputs, ?elapsed, error = %source, "module failed");
                abort(state, node);
                return Err(Error::ModuleExecution {
                    pipeline: node.pipeline().to_owned(),
                    phase: node.phase(),
                    module: module.name().to_owned(),
                    inputs,
                    elapsed,
                    source: Box::new(source),
                });
            }
        }
    }

    let outputs: Arc<[Document]> = documents.into();
    let stats = node.tracker().sweep(&outputs);
    debug!(
        outputs = outputs.len(),
        released = stats.released,
        retained = stats.retained,
        elapsed = ?started.elapsed(),
        "phase finished"
    );
    finish(state, node, outputs.clone());
    Ok(outputs)
}

fn finish(state: &BuildState<'_>, node: &PhaseNode, outputs: Arc<[Document]>) {
    node.set_outputs(outputs.clone());
    state.outputs.publish(node.pipeline(), outputs);
}

fn abort(state: &BuildState<'_>, node: &PhaseNode) {
    let released = node.tracker().release_all();
    debug!(released, "released documents of failed phase");
    finish(state, node, Arc::from(Vec::new()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentChanges;
    use crate::execution::testing::Harness;
    use crate::module::Module;
    use crate::pipeline::{Phase, Pipeline, Pipelines};

    struct Append(&'static str);

    impl Module for Append {
        fn execute(
            &self,
            inputs: &[Document],
            ctx: &ExecutionContext<'_>,
        ) -> Result<Vec<Document>> {
            inputs
                .iter()
                .map(|doc| {
                    let text = doc.read_string()? + self.0;
                    Ok(ctx.clone_document(doc, DocumentChanges::new().text(text)))
                })
                .collect()
        }
    }

    struct Fail;

    impl Module for Fail {
        fn execute(&self, _: &[Document], _: &ExecutionContext<'_>) -> Result<Vec<Document>> {
            Err(Error::module("broken"))
        }
    }

    fn harness(modules: Vec<Arc<dyn Module>>) -> Harness {
        let mut pipeline = Pipeline::builder("test").build();
        *pipeline.modules_mut(Phase::Process) = modules;
        Harness::with_pipelines(Pipelines::from_iter([pipeline]))
    }

    #[test]
    fn test_modules_run_in_sequence() {
        let harness = harness(vec![Arc::new(Append("b")), Arc::new(Append("c"))]);
        let state = harness.state();
        let node = harness.node(Phase::Process);

        let input: Arc<[Document]> = Arc::from(vec![Document::from_text("a")]);
        let outputs = execute_phase(&state, node, input).unwrap();
        assert_eq!(outputs[0].read_string().unwrap(), "abc");
        assert_eq!(node.outputs().len(), 1);
        assert_eq!(harness.outputs.get("test").unwrap().len(), 1);
        // the intermediate "ab" clone was released, the final one kept
        assert_eq!(node.tracker().len(), 1);
    }

    #[test]
    fn test_empty_phase_passes_input_through() {
        let harness = Harness::new();
        let state = harness.state();
        let input: Arc<[Document]> = Arc::from(vec![Document::from_text("x")]);
        let outputs = execute_phase(&state, harness.node(Phase::Render), input.clone()).unwrap();
        assert!(outputs[0].same_instance(&input[0]));
    }

    #[test]
    fn test_failure_clears_outputs() {
        let harness = harness(vec![Arc::new(Append("b")), Arc::new(Fail)]);
        let state = harness.state();
        let node = harness.node(Phase::Process);
        node.set_outputs(Arc::from(vec![Document::from_text("stale")]));

        let input = Document::from_text("a");
        let err = execute_phase(&state, node, Arc::from(vec![input.clone()])).unwrap_err();
        match err {
            Error::ModuleExecution { pipeline, phase, module, inputs, .. } => {
                assert_eq!(pipeline, "test");
                assert_eq!(phase, Phase::Process);
                assert_eq!(module, "Fail");
                assert_eq!(inputs, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(node.outputs().is_empty());
        assert!(node.tracker().is_empty());
        assert_eq!(input.read_string().unwrap(), "a");
    }

    #[test]
    fn test_cancel_between_modules() {
        let harness = harness(vec![Arc::new(Append("b"))]);
        harness.cancel.cancel();
        let state = harness.state();
        let node = harness.node(Phase::Process);
        let err = execute_phase(&state, node, Arc::from(Vec::new())).unwrap_err();
        assert!(matches!(err, Error::Canceled));
    }
}
