//! Engine error type.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::pipeline::{GraphError, Phase};
use crate::value::ConversionError;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error type for engine, module, and configuration failures.
///
/// # Example
///
/// ```ignore
/// match engine.execute() {
///     Ok(report) => println!("{report}"),
///     Err(Error::Configuration(e)) => eprintln!("bad pipeline graph: {e}"),
///     Err(Error::ModuleExecution { pipeline, phase, module, .. }) => {
///         eprintln!("{pipeline}/{phase} failed in {module}");
///     }
///     Err(e) => eprintln!("{e}"),
/// }
/// ```
#[derive(Debug, Error)]
pub enum Error {
    /// The pipeline graph is invalid. Reported before any phase runs.
    #[error("configuration error: {0}")]
    Configuration(#[from] GraphError),

    /// A dynamic value could not be converted to the requested type.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// A module failed while executing.
    #[error(
        "module {module} failed in {pipeline}/{phase} ({inputs} inputs, {elapsed:.2?}): {source}"
    )]
    ModuleExecution {
        /// Pipeline that owns the failing phase.
        pipeline: String,
        /// Phase the module belongs to.
        phase: Phase,
        /// Name of the failing module.
        module: String,
        /// Number of documents the module received.
        inputs: usize,
        /// Time spent in the phase up to the failure.
        elapsed: Duration,
        /// The underlying failure.
        source: Box<Error>,
    },

    /// Cooperative cancellation was observed.
    #[error("the build was canceled")]
    Canceled,

    /// File I/O failed for a specific path.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// The path being accessed.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A document-dependent config was resolved without a document.
    #[error("config requires a document but none was provided")]
    DocumentRequired,

    /// A context-only config was resolved again, on the same thread, while
    /// its own evaluation was still running.
    #[error("config value was resolved again while it was being evaluated")]
    ConfigReentered,

    /// Document content was read after its handle was released.
    #[error("content of document {0} was already released")]
    ContentReleased(String),

    /// A module asked for outputs it is not allowed to observe.
    #[error("outputs of pipeline {requested} are not available from {pipeline}/{phase}")]
    OutputsUnavailable {
        /// Pipeline that made the request.
        pipeline: String,
        /// Phase that made the request.
        phase: Phase,
        /// Pipeline whose outputs were requested.
        requested: String,
    },

    /// Failure raised by module code.
    #[error("{0}")]
    Module(String),

    /// A failure observed by several callers of the same evaluation.
    #[error(transparent)]
    Shared(#[from] Arc<Error>),
}

impl Error {
    /// Create an I/O error for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a module-defined error.
    pub fn module(message: impl Into<String>) -> Self {
        Self::Module(message.into())
    }

    /// Check whether this error, or the error it wraps, is a cancellation.
    pub fn is_canceled(&self) -> bool {
        match self {
            Self::Canceled => true,
            Self::ModuleExecution { source, .. } => source.is_canceled(),
            Self::Shared(inner) => inner.is_canceled(),
            _ => false,
        }
    }

    /// Name of the failing module, if this is a module execution error.
    pub fn module_name(&self) -> Option<&str> {
        match self {
            Self::ModuleExecution { module, .. } => Some(module),
            Self::Shared(inner) => inner.module_name(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canceled_through_module_error() {
        let err = Error::ModuleExecution {
            pipeline: "content".into(),
            phase: Phase::Process,
            module: "SetMetadata".into(),
            inputs: 3,
            elapsed: Duration::from_millis(5),
            source: Box::new(Error::Canceled),
        };
        assert!(err.is_canceled());
        assert_eq!(err.module_name(), Some("SetMetadata"));
        assert!(err.to_string().contains("content/Process"));
    }

    #[test]
    fn test_shared_error_display() {
        let err = Error::from(Arc::new(Error::module("boom")));
        assert_eq!(err.to_string(), "boom");
        assert!(!err.is_canceled());
    }
}
