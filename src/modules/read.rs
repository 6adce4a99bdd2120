use std::path::PathBuf;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::debug;

use crate::config::Config;
use crate::document::{Document, FileContent};
use crate::error::Result;
use crate::execution::ExecutionContext;
use crate::module::Module;
use crate::value::Metadata;

/// Metadata key holding the path relative to its input root.
pub const RELATIVE_PATH: &str = "relative_path";

/// Reads input files into documents.
///
/// Each document gets the file's full path as source, its path relative to the
/// input root as destination, and lazily read content. Input documents are
/// replaced.
///
/// # Example
///
/// ```ignore
/// Pipeline::builder("posts").read(ReadFiles::new("posts")).build();
/// ```
pub struct ReadFiles {
    patterns: Config<Vec<String>>,
}

impl ReadFiles {
    /// Read the files or directories named by `patterns`.
    pub fn new(patterns: impl Into<Config<Vec<String>>>) -> Self {
        Self {
            patterns: patterns.into(),
        }
    }
}

impl Module for ReadFiles {
    fn execute(&self, _inputs: &[Document], ctx: &ExecutionContext<'_>) -> Result<Vec<Document>> {
        let patterns = self.patterns.resolve_once(ctx)?;
        let files = ctx.fs().input_files(&patterns)?;
        debug!(?patterns, files = files.len(), "reading input files");

        files
            .into_par_iter()
            .map(|file| {
                ctx.check_canceled()?;
                let metadata = Metadata::new().with(RELATIVE_PATH, file.relative.clone());
                let content = Arc::new(FileContent::new(ctx.fs().clone(), file.path.clone()));
                Ok(ctx.create_document(
                    Some(file.path),
                    Some(PathBuf::from(&file.relative)),
                    metadata,
                    content,
                ))
            })
            .collect()
    }
}
