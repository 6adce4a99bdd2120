//! Prelude module for convenient imports.
//!
//! ```ignore
//! use docpipe::prelude::*;
//! ```

// Engine
pub use crate::engine::{BuildReport, Engine, PhaseStatus, ReportOptions};
pub use crate::options::{CleanMode, EngineBuilder};
pub use crate::settings::Settings;

// Pipelines & modules
pub use crate::execution::{CancellationToken, ExecutionContext};
pub use crate::module::Module;
pub use crate::modules::{
    Concat, CopyFiles, ExecuteContext, ExecuteDocuments, FilterDocuments, ReadFiles,
    ReadPipelines, SetContent, SetDestination, SetMetadata, WriteFiles,
};
pub use crate::pipeline::{Phase, Pipeline};

// Documents & values
pub use crate::config::Config;
pub use crate::document::{Document, DocumentChanges};
pub use crate::value::{Metadata, Value};

// Errors
pub use crate::error::{Error, Result};
