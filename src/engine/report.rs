//! Build reports.
//!
//! # Example
//!
//! ```ignore
//! let report = engine.execute()?;
//!
//! // Colored table for a terminal
//! eprintln!("{}", report.format(ReportOptions::default()));
//!
//! // Plain text for log files
//! log::info!("{}", report.format(ReportOptions::plain()));
//! ```

use std::fmt::{self, Write as _};
use std::time::Duration;

use chrono::{DateTime, Local};

use crate::pipeline::Phase;

/// Final state of one phase node in a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseStatus {
    /// Every module ran.
    Succeeded,
    /// A module failed.
    Failed,
    /// Cancellation was observed before or during the phase.
    Canceled,
    /// Not started because a dependency did not succeed.
    Skipped,
}

impl PhaseStatus {
    fn label(self) -> &'static str {
        match self {
            Self::Succeeded => "ok",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Timing and document counts of one phase node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    /// Pipeline name.
    pub pipeline: String,
    /// Phase kind.
    pub phase: Phase,
    /// Documents the phase received.
    pub inputs: usize,
    /// Documents the phase produced.
    pub outputs: usize,
    /// Wall time spent in the phase.
    pub elapsed: Duration,
    /// Final state.
    pub status: PhaseStatus,
}

/// Summary of one [`Engine::execute`](crate::Engine::execute) call.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Build counter, starting at 1.
    pub build: u64,
    /// Local start time.
    pub started: DateTime<Local>,
    /// Total wall time.
    pub elapsed: Duration,
    /// One entry per phase node, in graph order.
    pub phases: Vec<PhaseReport>,
}

impl BuildReport {
    /// Returns `true` if every phase succeeded.
    pub fn succeeded(&self) -> bool {
        self.phases.iter().all(|p| p.status == PhaseStatus::Succeeded)
    }

    /// The report of one pipeline phase.
    pub fn phase(&self, pipeline: &str, phase: Phase) -> Option<&PhaseReport> {
        self.phases
            .iter()
            .find(|p| p.pipeline == pipeline && p.phase == phase)
    }

    /// Phases with the given status.
    pub fn with_status(&self, status: PhaseStatus) -> impl Iterator<Item = &PhaseReport> {
        self.phases.iter().filter(move |p| p.status == status)
    }

    /// Render the report as a table.
    pub fn format(&self, options: ReportOptions) -> String {
        let mut out = String::new();
        let width = self
            .phases
            .iter()
            .map(|p| p.pipeline.len())
            .max()
            .unwrap_or(0)
            .max("pipeline".len());

        let _ = writeln!(
            out,
            "build #{} started {} took {:.2?}",
            self.build,
            self.started.format("%Y-%m-%d %H:%M:%S"),
            self.elapsed
        );
        let _ = writeln!(
            out,
            "{:<width$}  {:<8}  {:>6}  {:>6}  {:>10}  status",
            "pipeline", "phase", "in", "out", "elapsed"
        );
        for phase in &self.phases {
            let status = paint(options, phase.status);
            let _ = writeln!(
                out,
                "{:<width$}  {:<8}  {:>6}  {:>6}  {:>10}  {}",
                phase.pipeline,
                phase.phase.to_string(),
                phase.inputs,
                phase.outputs,
                format!("{:.2?}", phase.elapsed),
                status
            );
        }
        out
    }
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format(ReportOptions::plain()))
    }
}

// ============================================================================
// Options
// ============================================================================

/// Options for [`BuildReport::format`].
#[derive(Debug, Clone, Copy)]
pub struct ReportOptions {
    /// Whether to use ANSI colors for the status column.
    pub colored: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self { colored: true }
    }
}

impl ReportOptions {
    /// Colored terminal output.
    pub fn colored() -> Self {
        Self::default()
    }

    /// Plain text output.
    pub fn plain() -> Self {
        Self { colored: false }
    }

    /// Set whether to use colors.
    pub fn with_colored(mut self, colored: bool) -> Self {
        self.colored = colored;
        self
    }
}

// ============================================================================
// Coloring
// ============================================================================

#[cfg(feature = "colored-report")]
fn colorize(status: PhaseStatus) -> String {
    use owo_colors::OwoColorize;
    let label = status.label();
    match status {
        PhaseStatus::Succeeded => label.green().to_string(),
        PhaseStatus::Failed => label.red().to_string(),
        PhaseStatus::Canceled => label.yellow().to_string(),
        PhaseStatus::Skipped => label.dimmed().to_string(),
    }
}

#[cfg(not(feature = "colored-report"))]
fn colorize(status: PhaseStatus) -> String {
    status.label().to_owned()
}

fn paint(options: ReportOptions, status: PhaseStatus) -> String {
    if options.colored {
        colorize(status)
    } else {
        status.label().to_owned()
    }
}
