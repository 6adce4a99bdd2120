//! Meta-modules and closure modules.

use std::sync::Arc;

use super::par_map;
use crate::document::Document;
use crate::error::Result;
use crate::execution::ExecutionContext;
use crate::module::Module;

// =============================================================================
// Concat
// =============================================================================

/// Runs a nested module list on the inputs and appends its outputs to the
/// inputs.
pub struct Concat {
    modules: Vec<Arc<dyn Module>>,
}

impl Concat {
    /// Concatenate with the outputs of `modules`.
    pub fn new(modules: Vec<Arc<dyn Module>>) -> Self {
        Self { modules }
    }

    /// Add a nested module.
    pub fn with(mut self, module: impl Module + 'static) -> Self {
        self.modules.push(Arc::new(module));
        self
    }
}

impl Module for Concat {
    fn execute(&self, inputs: &[Document], ctx: &ExecutionContext<'_>) -> Result<Vec<Document>> {
        let nested = ctx.execute_modules(&self.modules, inputs)?;
        let mut outputs = Vec::with_capacity(inputs.len() + nested.len());
        outputs.extend_from_slice(inputs);
        outputs.extend(nested);
        Ok(outputs)
    }
}

// =============================================================================
// ReadPipelines
// =============================================================================

/// Replaces the inputs with the current outputs of other pipelines.
///
/// With no names, reads every pipeline the executing phase may observe
/// (excluding its own). Naming a pipeline the phase may not observe fails with
/// [`Error::OutputsUnavailable`](crate::Error::OutputsUnavailable).
#[derive(Debug, Default, Clone)]
pub struct ReadPipelines {
    pipelines: Vec<String>,
}

impl ReadPipelines {
    /// Read the named pipelines, in the given order.
    pub fn new<I, S>(pipelines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pipelines: pipelines.into_iter().map(Into::into).collect(),
        }
    }

    /// Read every visible pipeline.
    pub fn all() -> Self {
        Self::default()
    }
}

impl Module for ReadPipelines {
    fn execute(&self, _inputs: &[Document], ctx: &ExecutionContext<'_>) -> Result<Vec<Document>> {
        let outputs = ctx.outputs();
        if self.pipelines.is_empty() {
            return Ok(outputs
                .visible()
                .into_iter()
                .flat_map(|(_, docs)| docs.to_vec())
                .collect());
        }

        let mut documents = Vec::new();
        for name in &self.pipelines {
            documents.extend(outputs.from_pipeline(name)?.iter().cloned());
        }
        Ok(documents)
    }
}

// =============================================================================
// Closure modules
// =============================================================================

type DocumentFn = dyn Fn(&Document, &ExecutionContext<'_>) -> Result<Document> + Send + Sync;
type ContextFn = dyn Fn(&[Document], &ExecutionContext<'_>) -> Result<Vec<Document>> + Send + Sync;

/// Runs a closure for every document, in parallel.
pub struct ExecuteDocuments {
    name: String,
    f: Box<DocumentFn>,
}

impl ExecuteDocuments {
    /// Wrap `f`.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Document, &ExecutionContext<'_>) -> Result<Document> + Send + Sync + 'static,
    {
        Self {
            name: "ExecuteDocuments".to_owned(),
            f: Box::new(f),
        }
    }

    /// Name used in logs and errors.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Module for ExecuteDocuments {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, inputs: &[Document], ctx: &ExecutionContext<'_>) -> Result<Vec<Document>> {
        par_map(inputs, ctx, |doc| (self.f)(doc, ctx))
    }
}

/// Runs a closure once with all inputs.
pub struct ExecuteContext {
    name: String,
    f: Box<ContextFn>,
}

impl ExecuteContext {
    /// Wrap `f`.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Document], &ExecutionContext<'_>) -> Result<Vec<Document>> + Send + Sync + 'static,
    {
        Self {
            name: "ExecuteContext".to_owned(),
            f: Box::new(f),
        }
    }

    /// Name used in logs and errors.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Module for ExecuteContext {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, inputs: &[Document], ctx: &ExecutionContext<'_>) -> Result<Vec<Document>> {
        (self.f)(inputs, ctx)
    }
}
