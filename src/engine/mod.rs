//! The build engine.
//!
//! ```text
//! execute()
//! ├── clean temp (always), clean output (CleanMode::Full)
//! ├── phase graph: reuse if pipelines unchanged, else build_graph (fail fast)
//! ├── schedule every phase node on the worker pool
//! ├── CleanMode::Unwritten: delete output files this build did not touch
//! └── rotate write tracker generations, return BuildReport
//! ```
//!
//! An engine is meant to live across builds (watch mode). It keeps the phase
//! graph, the per-phase document trackers and the write tracker between
//! calls to [`Engine::execute`].

mod report;

pub use report::{BuildReport, PhaseReport, PhaseStatus, ReportOptions};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Local;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, error, info, warn};

use crate::document::DocumentFactory;
use crate::error::{Error, Result};
use crate::execution::{scheduler, BuildState, CancellationToken, PipelineOutputs};
use crate::fs::FileSystem;
use crate::options::{CleanMode, EngineBuilder, EngineOptions};
use crate::pipeline::{build_graph, PhaseGraph, Pipeline, Pipelines};
use crate::settings::Settings;
use crate::tracker::WriteTracker;

/// Runs pipelines.
///
/// # Example
///
/// ```ignore
/// let mut engine = Engine::builder()
///     .input_path("site")
///     .output_path("public")
///     .build()?;
///
/// engine.add_pipeline(
///     Pipeline::builder("pages")
///         .read(ReadFiles::new("pages"))
///         .process(SetDestination::with_extension("html"))
///         .write(WriteFiles::new())
///         .build(),
/// );
///
/// let report = engine.execute()?;
/// println!("{report}");
/// ```
pub struct Engine {
    options: EngineOptions,
    settings: Settings,
    fs: Arc<dyn FileSystem>,
    factory: Arc<dyn DocumentFactory>,
    pipelines: Pipelines,
    graph: Option<PhaseGraph>,
    tracker: WriteTracker,
    cancel: CancellationToken,
    pool: ThreadPool,
    outputs: PipelineOutputs,
    builds: u64,
    last_report: Option<BuildReport>,
}

impl Engine {
    /// Start configuring an engine.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub(crate) fn from_parts(
        options: EngineOptions,
        settings: Settings,
        fs: Arc<dyn FileSystem>,
        factory: Arc<dyn DocumentFactory>,
    ) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(options.max_threads)
            .thread_name(|i| format!("docpipe-{i}"))
            .build()
            .map_err(|e| Error::module(format!("failed to start worker pool: {e}")))?;

        Ok(Self {
            options,
            settings,
            fs,
            factory,
            pipelines: Pipelines::new(),
            graph: None,
            tracker: WriteTracker::new(),
            cancel: CancellationToken::new(),
            pool,
            outputs: PipelineOutputs::default(),
            builds: 0,
            last_report: None,
        })
    }

    /// Resolved options.
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Settings visible to every module.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Mutable settings, applied from the next build on.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// The file system.
    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    /// Registered pipelines.
    pub fn pipelines(&self) -> &Pipelines {
        &self.pipelines
    }

    /// Mutable pipelines. Changes trigger a graph rebuild on the next build.
    pub fn pipelines_mut(&mut self) -> &mut Pipelines {
        &mut self.pipelines
    }

    /// Register a pipeline, replacing any pipeline of the same name.
    pub fn add_pipeline(&mut self, pipeline: Pipeline) -> &mut Self {
        self.pipelines.add(pipeline);
        self
    }

    /// The write tracker shared by every build of this engine.
    pub fn write_tracker(&self) -> &WriteTracker {
        &self.tracker
    }

    /// Handle to cancel the running build from another thread.
    ///
    /// The flag is cleared when the next build starts.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Per-pipeline outputs of the last build.
    pub fn outputs(&self) -> &PipelineOutputs {
        &self.outputs
    }

    /// The phase graph of the last build, if any.
    pub fn graph(&self) -> Option<&PhaseGraph> {
        self.graph.as_ref()
    }

    /// Number of builds started so far.
    pub fn builds(&self) -> u64 {
        self.builds
    }

    /// Report of the last build that ran its phases.
    pub fn last_report(&self) -> Option<&BuildReport> {
        self.last_report.as_ref()
    }

    /// Delete everything in the output directory.
    pub fn clean_output_path(&self) -> Result<()> {
        info!(path = %self.options.output_path.display(), "cleaning output directory");
        self.fs.clean_output()
    }

    /// Delete everything in the temp directory.
    pub fn clean_temp_path(&self) -> Result<()> {
        debug!(path = %self.options.temp_path.display(), "cleaning temp directory");
        self.fs.clean_temp()
    }

    /// Run one build.
    ///
    /// Configuration errors are reported before any phase runs. Otherwise
    /// every phase node gets an outcome; the first module failure (in graph
    /// order) is returned, or [`Error::Canceled`] if the build was canceled.
    /// The report of a failed build remains available through
    /// [`last_report`](Self::last_report).
    pub fn execute(&mut self) -> Result<BuildReport> {
        let started_at = Local::now();
        let started = Instant::now();
        self.builds += 1;
        let build = self.builds;
        self.cancel.reset();
        info!(build, pipelines = self.pipelines.len(), "build started");

        let graph = match self.graph.take() {
            Some(graph) if graph.version() == self.pipelines.version() => {
                debug!(nodes = graph.len(), "reusing phase graph");
                graph
            }
            _ => {
                let graph = build_graph(&self.pipelines).inspect_err(|e| {
                    error!(build, error = %e, "invalid pipeline configuration");
                })?;
                debug!(nodes = graph.len(), "built phase graph");
                graph
            }
        };

        self.clean_temp_path()?;
        if self.options.clean_mode == CleanMode::Full {
            self.clean_output_path()?;
        }

        self.outputs = PipelineOutputs::for_graph(&graph);
        let outcomes = {
            let state = BuildState {
                build,
                settings: &self.settings,
                fs: &self.fs,
                factory: self.factory.as_ref(),
                tracker: &self.tracker,
                cancel: &self.cancel,
                graph: &graph,
                outputs: &self.outputs,
            };
            scheduler::schedule(&self.pool, &state)
        };

        let mut phases = Vec::with_capacity(outcomes.len());
        let mut failure = None;
        let mut canceled = false;
        for (node, outcome) in graph.nodes().iter().zip(outcomes) {
            canceled |= outcome.status == PhaseStatus::Canceled;
            if let Some(err) = outcome.error
                && failure.is_none()
                && !err.is_canceled()
            {
                failure = Some(err);
            }
            phases.push(PhaseReport {
                pipeline: node.pipeline().to_owned(),
                phase: node.phase(),
                inputs: outcome.inputs,
                outputs: outcome.outputs,
                elapsed: outcome.elapsed,
                status: outcome.status,
            });
        }
        self.graph = Some(graph);

        let success = failure.is_none() && !canceled;
        let cleanup = if success && self.options.clean_mode == CleanMode::Unwritten {
            self.remove_unwritten()
        } else {
            Ok(0)
        };
        self.tracker.finish_run(success);

        let report = BuildReport {
            build,
            started: started_at,
            elapsed: started.elapsed(),
            phases,
        };
        self.last_report = Some(report.clone());

        if let Some(err) = failure {
            error!(build, elapsed = ?report.elapsed, error = %err, "build failed");
            return Err(err);
        }
        if canceled {
            warn!(build, elapsed = ?report.elapsed, "build canceled");
            return Err(Error::Canceled);
        }
        let removed = cleanup?;
        info!(build, elapsed = ?report.elapsed, removed, "build finished");
        Ok(report)
    }

    /// Delete output files neither written nor skipped during this build.
    fn remove_unwritten(&self) -> Result<usize> {
        let stale: Vec<PathBuf> = self
            .fs
            .output_files()?
            .into_iter()
            .filter(|path| !self.tracker.touched(path))
            .collect();
        for path in &stale {
            debug!(path = %path.display(), "removing unwritten output");
            self.fs.remove(path)?;
        }
        Ok(stale.len())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("options", &self.options)
            .field("pipelines", &self.pipelines.len())
            .field("builds", &self.builds)
            .finish()
    }
}
