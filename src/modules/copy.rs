use std::path::PathBuf;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, error};

use crate::config::Config;
use crate::document::{Document, FileContent};
use crate::error::Result;
use crate::execution::ExecutionContext;
use crate::module::Module;
use crate::value::Metadata;

use super::read::RELATIVE_PATH;

/// Copies input files to the output root without loading them.
///
/// The source file's cache code stands in for the content hash, so a file
/// that did not change since the previous build is not copied again. Outputs
/// one document per matched file (source = input path, destination = output
/// path relative to the output root); input documents are replaced.
pub struct CopyFiles {
    patterns: Config<Vec<String>>,
    destination: Option<Config<PathBuf>>,
}

impl CopyFiles {
    /// Copy the files or directories named by `patterns`, keeping their
    /// relative paths.
    pub fn new(patterns: impl Into<Config<Vec<String>>>) -> Self {
        Self {
            patterns: patterns.into(),
            destination: None,
        }
    }

    /// Place the copies under `directory` (relative to the output root).
    pub fn to(mut self, directory: impl Into<Config<PathBuf>>) -> Self {
        self.destination = Some(directory.into());
        self
    }
}

impl Module for CopyFiles {
    fn execute(&self, _inputs: &[Document], ctx: &ExecutionContext<'_>) -> Result<Vec<Document>> {
        let patterns = self.patterns.resolve_once(ctx)?;
        let prefix = match &self.destination {
            Some(directory) => directory.resolve_once(ctx)?,
            None => PathBuf::new(),
        };
        let fs = ctx.fs();
        let tracker = ctx.write_tracker();
        let files = fs.input_files(&patterns)?;
        debug!(?patterns, files = files.len(), "copying input files");

        files
            .into_par_iter()
            .map(|file| {
                ctx.check_canceled()?;
                let destination = prefix.join(&file.relative);
                let target = fs.output_path(&destination);

                match fs.cache_code(&file.path) {
                    Some(hash) if tracker.should_skip(fs.as_ref(), &target, hash) => {
                        debug!(path = %target.display(), "unchanged, skipping copy");
                    }
                    hash => {
                        if let Some(hash) = hash {
                            tracker.record_content(&target, hash);
                        }
                        if let Err(err) = fs.copy(&file.path, &target) {
                            error!(
                                from = %file.path.display(),
                                to = %target.display(),
                                error = %err,
                                "failed to copy file"
                            );
                            return Err(err);
                        }
                        tracker.record_write(fs.as_ref(), &target);
                    }
                }

                let metadata = Metadata::new().with(RELATIVE_PATH, file.relative.clone());
                let content = Arc::new(FileContent::new(fs.clone(), file.path.clone()));
                Ok(ctx.create_document(Some(file.path), Some(destination), metadata, content))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::testing::Harness;
    use std::path::Path;

    #[test]
    fn test_copies_and_skips_unchanged_sources() {
        let harness = Harness::new();
        harness.memory.add_input("assets/logo.svg", "<svg/>");
        harness.memory.add_input("assets/css/site.css", "body{}");

        let module = CopyFiles::new("assets").to("static");
        let docs = harness.execute(&module, &[]).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(
            harness.memory.output_string("static/assets/logo.svg").as_deref(),
            Some("<svg/>")
        );
        assert_eq!(harness.memory.physical_writes(), 2);

        harness.tracker.finish_run(true);
        harness.execute(&module, &[]).unwrap();
        assert_eq!(harness.memory.physical_writes(), 2);

        harness.tracker.finish_run(true);
        harness.memory.add_input("assets/logo.svg", "<svg></svg>");
        harness.execute(&module, &[]).unwrap();
        assert_eq!(harness.memory.physical_writes(), 3);
        assert!(docs
            .iter()
            .any(|d| d.destination() == Some(Path::new("static/assets/css/site.css"))));
    }
}
