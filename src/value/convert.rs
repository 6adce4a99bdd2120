//! Typed conversion out of [`Value`].

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::{Metadata, Value};
use crate::document::Document;

/// A dynamic value could not be converted to the requested type.
#[derive(Debug, Clone, Error)]
#[error("cannot convert {from} to {to}{}", path_suffix(.path))]
pub struct ConversionError {
    /// Type name of the value that was found.
    pub from: &'static str,
    /// Type name that was requested.
    pub to: &'static str,
    /// Source path of the document being evaluated, when known.
    pub path: Option<PathBuf>,
}

impl ConversionError {
    /// Create an error for converting `value` to `T`.
    pub fn new<T>(value: &Value) -> Self {
        Self {
            from: value.type_name(),
            to: std::any::type_name::<T>(),
            path: None,
        }
    }

    /// Attach the source path of the document being evaluated.
    pub fn with_path(mut self, path: Option<&Path>) -> Self {
        if self.path.is_none() {
            self.path = path.map(Path::to_path_buf);
        }
        self
    }
}

fn path_suffix(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" (document {})", p.display()))
        .unwrap_or_default()
}

/// Conversion from a dynamic [`Value`] with lenient fallbacks.
///
/// Implementations return `None` when no sensible conversion exists; callers
/// turn that into a [`ConversionError`].
pub trait FromValue: Sized {
    /// Convert, or `None` if the value has an incompatible shape.
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

macro_rules! impl_from_value_int {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> Option<Self> {
                    i64::from_value(value).and_then(|i| <$ty>::try_from(i).ok())
                }
            }
        )*
    };
}

impl_from_value_int!(i32, u32, u64, usize);

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Bool(_) | Value::Int(_) | Value::Float(_) => Some(value.to_string()),
            _ => None,
        }
    }
}

impl FromValue for PathBuf {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(PathBuf::from(s)),
            _ => None,
        }
    }
}

impl FromValue for Metadata {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(map.clone()),
            Value::Document(doc) => Some(doc.metadata().clone()),
            _ => None,
        }
    }
}

impl FromValue for Document {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Document(doc) => Some(doc.clone()),
            Value::Documents(docs) if docs.len() == 1 => Some(docs[0].clone()),
            _ => None,
        }
    }
}

impl FromValue for Vec<Document> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Document(doc) => Some(vec![doc.clone()]),
            Value::Documents(docs) => Some(docs.clone()),
            Value::Array(items) => items.iter().map(Document::from_value).collect(),
            Value::Null => Some(Vec::new()),
            _ => None,
        }
    }
}

impl FromValue for Vec<String> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => items.iter().map(String::from_value).collect(),
            Value::Null => Some(Vec::new()),
            scalar => String::from_value(scalar).map(|s| vec![s]),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}
