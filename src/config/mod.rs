//! Configuration values for modules.
//!
//! A [`Config<T>`] is either a literal or a function evaluated against the
//! execution context and, when needed, a document:
//!
//! ```text
//! Config<T>
//! ├── Literal(T)                                     clone on resolve
//! └── Function(doc?, ctx) → Result<T>
//!     ├── requires_document = true   evaluated for every document
//!     └── requires_document = false  evaluated once per context (single-flight)
//! ```
//!
//! A function that does not require a document never sees one, which is what
//! makes the per-context memoization sound.

mod cache;

pub(crate) use cache::ConfigCache;

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::document::Document;
use crate::error::{Error, Result};
use crate::execution::ExecutionContext;
use crate::value::{ConversionError, FromValue, Value};

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

type Evaluate<T> = dyn Fn(Option<&Document>, &ExecutionContext<'_>) -> Result<T> + Send + Sync;

enum Source<T> {
    Literal(T),
    Function(Arc<Evaluate<T>>),
}

/// A module parameter resolved at execution time.
///
/// # Example
///
/// ```ignore
/// // Same value everywhere
/// let title: Config<String> = "Home".into();
///
/// // Once per module execution
/// let base = Config::<String>::from_setting("base_url");
///
/// // Per document, falling back to settings
/// let layout = Config::<String>::from_metadata("layout");
///
/// // Composed: still per document, because `layout` is
/// let path = base.combine_with(layout, |base, layout| Ok(format!("{base}/{layout}")));
/// ```
pub struct Config<T> {
    source: Source<T>,
    requires_document: bool,
    key: u64,
}

impl<T> Config<T> {
    /// A constant value.
    pub fn literal(value: T) -> Self {
        Self {
            source: Source::Literal(value),
            requires_document: false,
            key: next_key(),
        }
    }

    /// Alias for [`literal`](Self::literal).
    pub fn value(value: T) -> Self {
        Self::literal(value)
    }

    /// A value computed from the context alone, once per context.
    pub fn from_context<F>(f: F) -> Self
    where
        F: Fn(&ExecutionContext<'_>) -> Result<T> + Send + Sync + 'static,
    {
        Self::function(false, move |_, ctx| f(ctx))
    }

    /// A value computed for every document.
    pub fn from_document<F>(f: F) -> Self
    where
        F: Fn(&Document, &ExecutionContext<'_>) -> Result<T> + Send + Sync + 'static,
    {
        Self::function(true, move |doc, ctx| f(doc.ok_or(Error::DocumentRequired)?, ctx))
    }

    fn function<F>(requires_document: bool, f: F) -> Self
    where
        F: Fn(Option<&Document>, &ExecutionContext<'_>) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            source: Source::Function(Arc::new(f)),
            requires_document,
            key: next_key(),
        }
    }

    /// Returns `true` if resolving needs a document.
    pub fn requires_document(&self) -> bool {
        self.requires_document
    }

    /// Returns `true` for literal configs.
    pub fn is_literal(&self) -> bool {
        matches!(self.source, Source::Literal(_))
    }
}

impl<T> Config<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Resolve the value.
    ///
    /// Document-dependent configs are evaluated every time and fail with
    /// [`Error::DocumentRequired`] if `document` is `None`. Other configs are
    /// evaluated at most once per context; `document` is ignored.
    pub fn resolve(&self, document: Option<&Document>, ctx: &ExecutionContext<'_>) -> Result<T> {
        match &self.source {
            Source::Literal(value) => Ok(value.clone()),
            Source::Function(f) if self.requires_document => {
                let document = document.ok_or(Error::DocumentRequired)?;
                f(Some(document), ctx)
            }
            Source::Function(f) => ctx.config_cache().get_or_compute(self.key, || f(None, ctx)),
        }
    }

    /// Resolve for a document.
    pub fn resolve_for(&self, document: &Document, ctx: &ExecutionContext<'_>) -> Result<T> {
        self.resolve(Some(document), ctx)
    }

    /// Resolve without a document.
    pub fn resolve_once(&self, ctx: &ExecutionContext<'_>) -> Result<T> {
        self.resolve(None, ctx)
    }

    /// Resolve a value shared by every document, or `None` if the value
    /// depends on the document.
    ///
    /// Modules call this before fanning out over documents, so a context-only
    /// function runs on the module's thread rather than inside a parallel job.
    pub fn resolve_shared(&self, ctx: &ExecutionContext<'_>) -> Result<Option<T>> {
        if self.requires_document {
            Ok(None)
        } else {
            self.resolve_once(ctx).map(Some)
        }
    }

    /// Apply an infallible function to the resolved value.
    ///
    /// Literals are mapped immediately. The document flag is kept.
    pub fn map<U, F>(self, f: F) -> Config<U>
    where
        U: Send + Sync + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        match self.source {
            Source::Literal(value) => Config::literal(f(value)),
            Source::Function(_) => self.transform(move |value| Ok(f(value))),
        }
    }

    /// Apply a fallible function to the resolved value. The document flag is
    /// kept.
    pub fn transform<U, F>(self, f: F) -> Config<U>
    where
        U: Send + Sync + 'static,
        F: Fn(T) -> Result<U> + Send + Sync + 'static,
    {
        let requires_document = self.requires_document;
        Config::function(requires_document, move |doc, ctx| f(self.resolve(doc, ctx)?))
    }

    /// Combine with another config. The result needs a document if either
    /// operand does.
    pub fn combine_with<U, R, F>(self, other: Config<U>, f: F) -> Config<R>
    where
        U: Clone + Send + Sync + 'static,
        R: Send + Sync + 'static,
        F: Fn(T, U) -> Result<R> + Send + Sync + 'static,
    {
        let requires_document = self.requires_document || other.requires_document;
        Config::function(requires_document, move |doc, ctx| {
            f(self.resolve(doc, ctx)?, other.resolve(doc, ctx)?)
        })
    }
}

impl<T: FromValue + Clone + Send + Sync + 'static> Config<T> {
    /// Read a setting, converted to `T`.
    ///
    /// A missing key converts from [`Value::Null`], so `Option<_>` targets
    /// resolve to `None`.
    pub fn from_setting(key: impl Into<String>) -> Self {
        let key = key.into();
        Self::from_context(move |ctx| {
            let null = Value::Null;
            let value = ctx.settings().get(&key).unwrap_or(&null);
            T::from_value(value).ok_or_else(|| ConversionError::new::<T>(value).into())
        })
    }

    /// Read document metadata, falling back to settings, converted to `T`.
    pub fn from_metadata(key: impl Into<String>) -> Self {
        let key = key.into();
        Self::from_document(move |doc, ctx| {
            let null = Value::Null;
            let value = doc
                .get(&key)
                .or_else(|| ctx.settings().get(&key))
                .unwrap_or(&null);
            T::from_value(value)
                .ok_or_else(|| ConversionError::new::<T>(value).with_path(doc.source()).into())
        })
    }
}

impl Config<Value> {
    /// Convert a dynamic config to a typed one.
    ///
    /// Conversion failures carry the document's source path when resolved for
    /// a document.
    pub fn cast<U>(self) -> Config<U>
    where
        U: FromValue + Send + Sync + 'static,
    {
        let requires_document = self.requires_document;
        Config::function(requires_document, move |doc, ctx| {
            let value = self.resolve(doc, ctx)?;
            U::from_value(&value).ok_or_else(|| {
                ConversionError::new::<U>(&value)
                    .with_path(doc.and_then(Document::source))
                    .into()
            })
        })
    }
}

fn next_key() -> u64 {
    NEXT_KEY.fetch_add(1, Ordering::Relaxed)
}

impl<T: Clone> Clone for Config<T> {
    fn clone(&self) -> Self {
        Self {
            source: match &self.source {
                Source::Literal(value) => Source::Literal(value.clone()),
                Source::Function(f) => Source::Function(f.clone()),
            },
            requires_document: self.requires_document,
            key: self.key,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Config<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Source::Literal(value) => f.debug_tuple("Config::Literal").field(value).finish(),
            Source::Function(_) => f
                .debug_struct("Config::Function")
                .field("requires_document", &self.requires_document)
                .finish(),
        }
    }
}

impl<T> From<T> for Config<T> {
    fn from(value: T) -> Self {
        Self::literal(value)
    }
}

impl From<&str> for Config<String> {
    fn from(value: &str) -> Self {
        Self::literal(value.to_owned())
    }
}

impl From<&str> for Config<PathBuf> {
    fn from(value: &str) -> Self {
        Self::literal(PathBuf::from(value))
    }
}

impl From<&str> for Config<Value> {
    fn from(value: &str) -> Self {
        Self::literal(Value::from(value))
    }
}

impl From<&str> for Config<Vec<String>> {
    fn from(value: &str) -> Self {
        Self::literal(vec![value.to_owned()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentChanges;
    use crate::execution::testing::Harness;
    use crate::pipeline::Phase;
    use crate::settings::Settings;
    use rayon::prelude::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_context_config_evaluated_once_under_contention() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let config = Config::from_context(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            Ok(42_i64)
        });

        let pool = rayon::ThreadPoolBuilder::new().num_threads(8).build().unwrap();
        let harness = Harness::new();
        let docs: Vec<Document> = (0..50).map(|i| Document::from_text(i.to_string())).collect();
        let results: Vec<i64> = harness.run(Phase::Process, |ctx| {
            pool.install(|| {
                docs.par_iter()
                    .map(|doc| config.resolve(Some(doc), ctx).unwrap())
                    .collect()
            })
        });

        assert_eq!(results.len(), 50);
        assert!(results.iter().all(|v| *v == 42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cache_is_per_context() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let config = Config::from_context(move |ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(ctx.id())
        });
        let harness = Harness::new();
        let a = harness.run(Phase::Process, |ctx| {
            let first = config.resolve_once(ctx).unwrap();
            assert_eq!(config.clone().resolve_once(ctx).unwrap(), first);
            first
        });
        let b = harness.run(Phase::Process, |ctx| config.resolve_once(ctx).unwrap());
        assert_ne!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_document_config_evaluated_per_document() {
        let config = Config::from_document(|doc, _| doc.read_string());
        let harness = Harness::new();
        harness.run(Phase::Process, |ctx| {
            assert_eq!(config.resolve_for(&Document::from_text("a"), ctx).unwrap(), "a");
            assert_eq!(config.resolve_for(&Document::from_text("b"), ctx).unwrap(), "b");
            assert!(matches!(config.resolve_once(ctx), Err(Error::DocumentRequired)));
        });
    }

    #[test]
    fn test_composition_ors_document_flag() {
        let literal: Config<i64> = 2.into();
        let context = Config::from_context(|_| Ok(3_i64));
        let document = Config::from_document(|doc, _| Ok(doc.get_as::<i64>("n").unwrap_or(0)));

        assert!(literal.is_literal());
        let mapped = literal.clone().map(|v| v * 10);
        assert!(mapped.is_literal());
        assert!(!context.clone().map(|v| v + 1).requires_document());

        let both = literal.clone().combine_with(context.clone(), |a, b| Ok(a * b));
        assert!(!both.requires_document());
        let mixed = context.combine_with(document, |a, b| Ok(a + b));
        assert!(mixed.requires_document());

        let harness = Harness::new();
        harness.run(Phase::Process, |ctx| {
            assert_eq!(mapped.resolve_once(ctx).unwrap(), 20);
            assert_eq!(both.resolve_once(ctx).unwrap(), 6);
            let doc = Document::from_text("").derive(DocumentChanges::new().set("n", 4));
            assert_eq!(mixed.resolve_for(&doc, ctx).unwrap(), 7);
            assert!(mixed.resolve_once(ctx).is_err());
        });
    }

    #[test]
    fn test_settings_and_metadata_lookup() {
        let harness = Harness::new().settings(
            Settings::new()
                .with("layout", "default")
                .with("count", "3"),
        );
        let count = Config::<u32>::from_setting("count");
        let missing = Config::<Option<String>>::from_setting("missing");
        let layout = Config::<String>::from_metadata("layout");

        harness.run(Phase::Process, |ctx| {
            assert_eq!(count.resolve_once(ctx).unwrap(), 3);
            assert_eq!(missing.resolve_once(ctx).unwrap(), None);

            let plain = Document::from_text("");
            assert_eq!(layout.resolve_for(&plain, ctx).unwrap(), "default");
            let custom = plain.derive(DocumentChanges::new().set("layout", "post"));
            assert_eq!(layout.resolve_for(&custom, ctx).unwrap(), "post");
        });
    }

    #[test]
    fn test_conversion_error_carries_source_path() {
        let config = Config::<Value>::from_document(|doc, _| {
            Ok(doc.get("n").cloned().unwrap_or(Value::Null))
        })
        .cast::<i64>();
        let doc = Document::new(
            Some(PathBuf::from("posts/a.md")),
            None,
            crate::value::Metadata::new().with("n", "not a number"),
            Arc::new(crate::document::NullContent),
        );
        let harness = Harness::new();
        let err = harness.run(Phase::Process, |ctx| config.resolve_for(&doc, ctx)).unwrap_err();
        match err {
            Error::Conversion(e) => {
                assert_eq!(e.to, "i64");
                assert_eq!(e.path.as_deref(), Some(std::path::Path::new("posts/a.md")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
