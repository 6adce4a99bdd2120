//! Concurrent execution of a phase graph.
//!
//! ```text
//! remaining[i] = number of dependencies of node i
//!
//! start: spawn every node with remaining == 0
//! node i finishes ──► for each dependent d: remaining[d] -= 1
//!                         └── reached 0 ──► spawn d
//! ```
//!
//! The dependency that brings a dependent's counter to zero spawns it, so a
//! node starts exactly once and only after all of its dependencies finished,
//! successfully or not. A node whose dependency did not succeed never runs its
//! modules; it is recorded as skipped (or canceled) and still releases its own
//! dependents so every node gets an outcome.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use rayon::{Scope, ThreadPool};
use tracing::{debug, warn};

use super::phase::execute_phase;
use super::BuildState;
use crate::document::Document;
use crate::engine::PhaseStatus;
use crate::error::Error;

/// What happened to one node.
#[derive(Debug)]
pub(crate) struct NodeOutcome {
    pub(crate) status: PhaseStatus,
    pub(crate) inputs: usize,
    pub(crate) outputs: usize,
    pub(crate) elapsed: Duration,
    pub(crate) error: Option<Error>,
}

impl NodeOutcome {
    fn not_run(status: PhaseStatus) -> Self {
        Self {
            status,
            inputs: 0,
            outputs: 0,
            elapsed: Duration::ZERO,
            error: None,
        }
    }
}

struct Scheduler<'a> {
    state: &'a BuildState<'a>,
    remaining: Vec<AtomicUsize>,
    dependents: Vec<Vec<usize>>,
    outcomes: Vec<OnceLock<NodeOutcome>>,
}

/// Execute every node of `state.graph` on `pool`.
///
/// Returns one outcome per node, in node order.
pub(crate) fn schedule(pool: &ThreadPool, state: &BuildState<'_>) -> Vec<NodeOutcome> {
    let nodes = state.graph.nodes();
    let mut dependents = vec![Vec::new(); nodes.len()];
    for node in nodes {
        for &dependency in node.dependencies() {
            dependents[dependency].push(node.index());
        }
    }

    let scheduler = Scheduler {
        state,
        remaining: nodes
            .iter()
            .map(|node| AtomicUsize::new(node.dependencies().len()))
            .collect(),
        dependents,
        outcomes: nodes.iter().map(|_| OnceLock::new()).collect(),
    };

    pool.scope(|scope| {
        for node in nodes.iter().filter(|node| node.dependencies().is_empty()) {
            let scheduler = &scheduler;
            let index = node.index();
            scope.spawn(move |scope| run_node(scope, scheduler, index));
        }
    });

    scheduler
        .outcomes
        .into_iter()
        .map(|outcome| {
            outcome
                .into_inner()
                .unwrap_or_else(|| NodeOutcome::not_run(PhaseStatus::Skipped))
        })
        .collect()
}

fn run_node<'s>(scope: &Scope<'s>, scheduler: &'s Scheduler<'s>, index: usize) {
    let outcome = execute_node(scheduler, index);
    if scheduler.outcomes[index].set(outcome).is_err() {
        warn!(node = index, "phase node finished twice");
    }

    for &dependent in &scheduler.dependents[index] {
        if scheduler.remaining[dependent].fetch_sub(1, Ordering::AcqRel) == 1 {
            scope.spawn(move |scope| run_node(scope, scheduler, dependent));
        }
    }
}

fn execute_node(scheduler: &Scheduler<'_>, index: usize) -> NodeOutcome {
    let state = scheduler.state;
    let node = &state.graph.nodes()[index];

    let blocked = node.dependencies().iter().any(|&dependency| {
        scheduler.outcomes[dependency]
            .get()
            .is_none_or(|outcome| outcome.status != PhaseStatus::Succeeded)
    });
    if blocked || state.cancel.is_canceled() {
        node.set_outputs(Arc::from(Vec::new()));
        let status = if state.cancel.is_canceled() {
            PhaseStatus::Canceled
        } else {
            PhaseStatus::Skipped
        };
        debug!(pipeline = node.pipeline(), phase = %node.phase(), ?status, "phase not started");
        return NodeOutcome::not_run(status);
    }

    let input: Arc<[Document]> = match node.input_dependency() {
        Some(dependency) => state.graph.nodes()[dependency].outputs(),
        None => Arc::from(Vec::new()),
    };

    let started = Instant::now();
    let inputs = input.len();
    match execute_phase(state, node, input) {
        Ok(outputs) => NodeOutcome {
            status: PhaseStatus::Succeeded,
            inputs,
            outputs: outputs.len(),
            elapsed: started.elapsed(),
            error: None,
        },
        Err(err) => NodeOutcome {
            status: if err.is_canceled() {
                PhaseStatus::Canceled
            } else {
                PhaseStatus::Failed
            },
            inputs,
            outputs: 0,
            elapsed: started.elapsed(),
            error: Some(err),
        },
    }
}
