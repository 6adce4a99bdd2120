//! Built-in modules.
//!
//! | module             | phase (typical) | effect                                      |
//! |--------------------|-----------------|---------------------------------------------|
//! | [`ReadFiles`]      | Read            | input files → documents (lazy content)      |
//! | [`CopyFiles`]      | Read / Write    | input files → output, skipping unchanged    |
//! | [`SetMetadata`]    | any             | set one metadata key per document           |
//! | [`SetDestination`] | Process         | set the output path                         |
//! | [`SetContent`]     | Process/Render  | replace content with text                   |
//! | [`FilterDocuments`]| any             | keep documents matching a predicate         |
//! | [`Concat`]         | any             | inputs followed by a nested module run      |
//! | [`ReadPipelines`]  | Process/Render  | outputs of other pipelines                  |
//! | [`ExecuteDocuments`], [`ExecuteContext`] | any | closures                         |
//! | [`WriteFiles`]     | Write           | documents → output, skipping unchanged      |
//!
//! Content transforms (Markdown, templates, minification) are expected to be
//! provided by the application as further [`Module`](crate::Module) impls.

mod control;
mod copy;
mod read;
mod transform;
mod write;

pub use control::{Concat, ExecuteContext, ExecuteDocuments, ReadPipelines};
pub use copy::CopyFiles;
pub use read::{ReadFiles, RELATIVE_PATH};
pub use transform::{FilterDocuments, SetContent, SetDestination, SetMetadata};
pub use write::WriteFiles;

use rayon::prelude::*;

use crate::config::Config;
use crate::document::Document;
use crate::error::Result;
use crate::execution::ExecutionContext;

/// Map every document in parallel, checking for cancellation before each one.
///
/// Output order follows input order; the first error wins.
pub(crate) fn par_map<F>(
    inputs: &[Document],
    ctx: &ExecutionContext<'_>,
    f: F,
) -> Result<Vec<Document>>
where
    F: Fn(&Document) -> Result<Document> + Send + Sync,
{
    inputs
        .par_iter()
        .map(|doc| {
            ctx.check_canceled()?;
            f(doc)
        })
        .collect()
}

/// Like [`par_map`], passing each document's resolved `config` value to `f`.
///
/// A context-only value is resolved once before the fan-out.
pub(crate) fn par_map_config<T, F>(
    inputs: &[Document],
    ctx: &ExecutionContext<'_>,
    config: &Config<T>,
    f: F,
) -> Result<Vec<Document>>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(&Document, T) -> Result<Document> + Send + Sync,
{
    if inputs.is_empty() {
        return Ok(Vec::new());
    }
    let shared = config.resolve_shared(ctx)?;
    par_map(inputs, ctx, |doc| {
        let value = match &shared {
            Some(value) => value.clone(),
            None => config.resolve_for(doc, ctx)?,
        };
        f(doc, value)
    })
}
