//! Per-document transforms.

use std::path::PathBuf;

use rayon::prelude::*;

use super::par_map_config;
use crate::config::Config;
use crate::document::{Document, DocumentChanges};
use crate::error::{Error, Result};
use crate::execution::ExecutionContext;
use crate::module::Module;
use crate::value::Value;

// =============================================================================
// SetMetadata
// =============================================================================

/// Sets one metadata key on every document.
pub struct SetMetadata {
    key: String,
    value: Config<Value>,
}

impl SetMetadata {
    /// Set `key` to `value`.
    pub fn new(key: impl Into<String>, value: impl Into<Config<Value>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl Module for SetMetadata {
    fn execute(&self, inputs: &[Document], ctx: &ExecutionContext<'_>) -> Result<Vec<Document>> {
        par_map_config(inputs, ctx, &self.value, |doc, value| {
            Ok(ctx.clone_document(doc, DocumentChanges::new().set(self.key.clone(), value)))
        })
    }
}

// =============================================================================
// SetDestination
// =============================================================================

/// Sets the destination path of every document.
pub struct SetDestination {
    path: Config<PathBuf>,
}

impl SetDestination {
    /// Use `path` as destination.
    pub fn new(path: impl Into<Config<PathBuf>>) -> Self {
        Self { path: path.into() }
    }

    /// Keep the current destination (or source file name) but change its
    /// extension.
    pub fn with_extension(extension: impl Into<String>) -> Self {
        let extension = extension.into();
        Self::new(Config::from_document(move |doc, _| {
            let current = doc
                .destination()
                .map(PathBuf::from)
                .or_else(|| doc.source().and_then(|s| s.file_name()).map(PathBuf::from))
                .ok_or_else(|| {
                    Error::module(format!("document {doc} has neither destination nor source"))
                })?;
            Ok(current.with_extension(&extension))
        }))
    }
}

impl Module for SetDestination {
    fn execute(&self, inputs: &[Document], ctx: &ExecutionContext<'_>) -> Result<Vec<Document>> {
        par_map_config(inputs, ctx, &self.path, |doc, path| {
            Ok(ctx.clone_document(doc, DocumentChanges::new().destination(path)))
        })
    }
}

// =============================================================================
// SetContent
// =============================================================================

/// Replaces the content of every document with text.
pub struct SetContent {
    content: Config<String>,
}

impl SetContent {
    /// Use `content` as the new content.
    pub fn new(content: impl Into<Config<String>>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

impl Module for SetContent {
    fn execute(&self, inputs: &[Document], ctx: &ExecutionContext<'_>) -> Result<Vec<Document>> {
        par_map_config(inputs, ctx, &self.content, |doc, text| {
            Ok(ctx.clone_document(doc, DocumentChanges::new().text(text)))
        })
    }
}

// =============================================================================
// FilterDocuments
// =============================================================================

/// Keeps the documents for which the predicate is `true`, in order.
pub struct FilterDocuments {
    predicate: Config<bool>,
}

impl FilterDocuments {
    /// Filter with `predicate`.
    pub fn new(predicate: impl Into<Config<bool>>) -> Self {
        Self {
            predicate: predicate.into(),
        }
    }

    /// Keep documents whose metadata `key` converts to `true` (falling back to
    /// settings); missing keys count as `false`.
    pub fn by_metadata(key: impl Into<String>) -> Self {
        Self::new(Config::<Option<bool>>::from_metadata(key).map(|v| v.unwrap_or(false)))
    }
}

impl Module for FilterDocuments {
    fn execute(&self, inputs: &[Document], ctx: &ExecutionContext<'_>) -> Result<Vec<Document>> {
        if !self.predicate.requires_document() {
            let keep = self.predicate.resolve_once(ctx)?;
            return Ok(if keep { inputs.to_vec() } else { Vec::new() });
        }

        let kept: Vec<Option<Document>> = inputs
            .par_iter()
            .map(|doc| {
                ctx.check_canceled()?;
                Ok(self.predicate.resolve_for(doc, ctx)?.then(|| doc.clone()))
            })
            .collect::<Result<_>>()?;
        Ok(kept.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::testing::Harness;
    use crate::settings::Settings;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn docs() -> Vec<Document> {
        ["a", "b", "c"]
            .iter()
            .map(|name| {
                Document::from_text(*name).derive(
                    DocumentChanges::new()
                        .destination(format!("{name}.md"))
                        .set("draft", *name == "b"),
                )
            })
            .collect()
    }

    #[test]
    fn test_set_metadata_context_value_resolved_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let module = SetMetadata::new(
            "stamp",
            Config::from_context(move |ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Value::from(ctx.pipeline()))
            }),
        );

        let harness = Harness::new();
        let outputs = harness.execute(&module, &docs()).unwrap();
        assert_eq!(outputs.len(), 3);
        assert!(outputs.iter().all(|d| d.get_as::<String>("stamp").as_deref() == Some("test")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parallel_context_value_completes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let module = SetMetadata::new(
            "total",
            Config::from_context(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Value::from((0..1000_i64).into_par_iter().sum::<i64>()))
            }),
        );
        let inputs: Vec<Document> = (0..64).map(|i| Document::from_text(i.to_string())).collect();

        let harness = Harness::new();
        let outputs = harness.execute(&module, &inputs).unwrap();
        assert_eq!(outputs.len(), 64);
        assert!(outputs.iter().all(|d| d.get_as::<i64>("total") == Some(499_500)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_set_destination_with_extension() {
        let harness = Harness::new();
        let outputs = harness.execute(&SetDestination::with_extension("html"), &docs()).unwrap();
        assert_eq!(outputs[0].destination(), Some(Path::new("a.html")));
        let missing = [Document::from_text("x")];
        assert!(harness.execute(&SetDestination::with_extension("html"), &missing).is_err());
    }

    #[test]
    fn test_set_content_from_metadata() {
        let harness = Harness::new().settings(Settings::new().with("footer", "(c)"));
        let module = SetContent::new(Config::from_document(|doc, ctx| {
            let footer = ctx.settings().get_as::<String>("footer").unwrap_or_default();
            Ok(format!("{}{footer}", doc.read_string()?))
        }));
        let outputs = harness.execute(&module, &docs()).unwrap();
        assert_eq!(outputs[2].read_string().unwrap(), "c(c)");
    }

    #[test]
    fn test_filter_keeps_order() {
        let harness = Harness::new();
        let module = FilterDocuments::new(Config::from_document(|doc, _| {
            Ok(!doc.get_as::<bool>("draft").unwrap_or(false))
        }));
        let outputs = harness.execute(&module, &docs()).unwrap();
        let names: Vec<String> = outputs.iter().map(|d| d.read_string().unwrap()).collect();
        assert_eq!(names, ["a", "c"]);

        let drafts = harness.execute(&FilterDocuments::by_metadata("draft"), &docs()).unwrap();
        assert_eq!(drafts.len(), 1);
        assert!(harness.execute(&FilterDocuments::new(false), &docs()).unwrap().is_empty());
    }
}
