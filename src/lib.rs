//! # docpipe
//!
//! A content-build engine: named pipelines of modules turn input files into
//! in-memory documents and write the results to an output directory.
//!
//! ```text
//!            ┌──────── Pipeline "posts" ────────┐
//! input ──►  Read ──► Process ──► Render ──► Write  ──► output
//!                        │            ▲
//!                        └── other ───┘   (Render waits for every
//!                            pipelines'         non-isolated Process)
//! ```
//!
//! - **Pipelines** have four phases (Read, Process, Render, Write), each an
//!   ordered list of [`Module`]s. Pipelines may depend on each other; the
//!   engine turns the collection into a graph of phase nodes and rejects
//!   cycles and missing or isolated dependencies before anything runs.
//! - **Scheduling**: phase nodes run concurrently on a worker pool. A node
//!   starts once all of its dependencies finished and receives the outputs of
//!   its first dependency.
//! - **Documents** are immutable handles with a stable identity. Each phase
//!   tracks the documents it creates and releases the ones its outputs no
//!   longer reach.
//! - **[`Config`]** values parametrize modules: literals, per-context values
//!   (evaluated once, single-flight) or per-document values.
//! - **Incremental writes**: the [`WriteTracker`] skips writing outputs whose
//!   content and destination did not change since the previous build.
//!
//! ## Quick Start
//!
//! ```ignore
//! use docpipe::prelude::*;
//!
//! let mut engine = Engine::builder()
//!     .input_path("site")
//!     .output_path("public")
//!     .setting("title", "My Site")
//!     .build()?;
//!
//! engine
//!     .add_pipeline(
//!         Pipeline::builder("pages")
//!             .read(ReadFiles::new("pages"))
//!             .process(SetDestination::with_extension("html"))
//!             .write(WriteFiles::new())
//!             .build(),
//!     )
//!     .add_pipeline(
//!         Pipeline::builder("assets")
//!             .isolated()
//!             .read(CopyFiles::new("assets"))
//!             .build(),
//!     );
//!
//! let report = engine.execute()?;
//! eprintln!("{}", report.format(ReportOptions::default()));
//! ```
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events and one `phase` span per executed phase
//! node. Install a subscriber in the application to see them.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod execution;
pub mod fs;
pub mod module;
pub mod modules;
pub mod options;
pub mod pipeline;
pub mod prelude;
pub mod settings;
pub mod tracker;
pub mod value;

pub use config::Config;
pub use document::{
    ContentProvider, DefaultDocumentFactory, Document, DocumentChanges, DocumentFactory,
    DocumentId, DocumentTracker,
};
pub use engine::{BuildReport, Engine, PhaseReport, PhaseStatus, ReportOptions};
pub use error::{Error, Result};
pub use execution::{CancellationToken, ExecutionContext, Outputs, PipelineOutputs};
pub use fs::{FileSystem, MemoryFileSystem, PhysicalFileSystem};
pub use module::Module;
pub use options::{CleanMode, EngineBuilder, EngineOptions};
pub use pipeline::{GraphError, Phase, Pipeline, PipelineBuilder, Pipelines};
pub use settings::Settings;
pub use tracker::{WriteEntry, WriteTracker};
pub use value::{ConversionError, FromValue, Metadata, Value};
