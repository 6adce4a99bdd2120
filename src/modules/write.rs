use std::path::Path;

use rayon::prelude::*;
use rustc_hash::FxHashSet;
use tracing::{debug, error, warn};

use crate::document::Document;
use crate::error::Result;
use crate::execution::ExecutionContext;
use crate::module::Module;
use crate::tracker::duplicate_destinations;

/// Writes documents to their destinations under the output root.
///
/// Writes go through the engine's write tracker: a document whose content
/// hash matches what the previous build wrote to an unmodified destination is
/// not written again. Documents without a destination are passed through
/// untouched. Outputs are the inputs.
///
/// Several documents with the same destination are reported as a warning and
/// written in document order (the last one wins). In append mode they are
/// concatenated instead: the first document of a destination replaces the
/// file, later ones are appended, and nothing is skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct WriteFiles {
    append: bool,
}

impl WriteFiles {
    /// Overwrite destinations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Concatenate documents sharing a destination.
    pub fn append(mut self) -> Self {
        self.append = true;
        self
    }
}

impl Module for WriteFiles {
    fn execute(&self, inputs: &[Document], ctx: &ExecutionContext<'_>) -> Result<Vec<Document>> {
        let duplicates = duplicate_destinations(inputs.iter().filter_map(Document::destination));
        if !self.append {
            for (path, count) in &duplicates {
                warn!(
                    path = %path.display(),
                    count,
                    "multiple documents write to the same destination"
                );
            }
        }

        if self.append || !duplicates.is_empty() {
            let mut started = FxHashSet::default();
            for doc in inputs {
                ctx.check_canceled()?;
                if let Some(destination) = doc.destination() {
                    let append = self.append && !started.insert(destination.to_path_buf());
                    write_document(ctx, doc, destination, append, !self.append)?;
                }
            }
        } else {
            inputs.par_iter().try_for_each(|doc| {
                ctx.check_canceled()?;
                match doc.destination() {
                    Some(destination) => {
                        write_document(ctx, doc, destination, false, true).map(|_| ())
                    }
                    None => Ok(()),
                }
            })?;
        }

        Ok(inputs.to_vec())
    }
}

/// Write one document. Returns `false` if the write was skipped.
fn write_document(
    ctx: &ExecutionContext<'_>,
    doc: &Document,
    destination: &Path,
    append: bool,
    skip_unchanged: bool,
) -> Result<bool> {
    let fs = ctx.fs().as_ref();
    let tracker = ctx.write_tracker();
    let path = fs.output_path(destination);
    let hash = doc.content_hash()?;

    if skip_unchanged && tracker.should_skip(fs, &path, hash) {
        debug!(path = %path.display(), "unchanged, skipping write");
        return Ok(false);
    }

    tracker.record_content(&path, hash);
    let mut reader = doc.open()?;
    let written = if append {
        fs.append(&path, &mut reader)
    } else {
        fs.write(&path, &mut reader)
    };
    match written {
        Ok(bytes) => {
            tracker.record_write(fs, &path);
            debug!(path = %path.display(), bytes, append, "wrote document");
            Ok(true)
        }
        Err(err) => {
            error!(path = %path.display(), error = %err, "failed to write document");
            Err(err)
        }
    }
}
