//! The unit of work inside a phase.

use crate::document::Document;
use crate::error::Result;
use crate::execution::ExecutionContext;

/// Consumes input documents and produces output documents.
///
/// A phase runs its modules strictly in sequence, feeding each module the
/// previous module's outputs. A module may parallelize its own per-document
/// work; it should call [`ExecutionContext::check_canceled`] between documents
/// or steps.
///
/// Documents a module creates should go through
/// [`ExecutionContext::create_document`] / [`ExecutionContext::clone_document`]
/// so the phase can release the ones that are no longer reachable.
///
/// # Example
///
/// ```
/// use docpipe::{Document, ExecutionContext, Module, Result};
///
/// struct Upper;
///
/// impl Module for Upper {
///     fn execute(
///         &self,
///         inputs: &[Document],
///         ctx: &ExecutionContext<'_>,
///     ) -> Result<Vec<Document>> {
///         inputs
///             .iter()
///             .map(|doc| {
///                 let text = doc.read_string()?.to_uppercase();
///                 Ok(ctx.clone_document(doc, docpipe::DocumentChanges::new().text(text)))
///             })
///             .collect()
///     }
/// }
/// ```
pub trait Module: Send + Sync {
    /// Name used in logs, errors and reports. Defaults to the type name.
    fn name(&self) -> &str {
        short_type_name(std::any::type_name::<Self>())
    }

    /// Run the module.
    fn execute(&self, inputs: &[Document], ctx: &ExecutionContext<'_>) -> Result<Vec<Document>>;
}

/// Strip the module path and generic arguments from a type name.
fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
