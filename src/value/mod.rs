//! Dynamic values stored in metadata and settings.
//!
//! ```text
//! Value
//! ├── scalars      Null | Bool | Int | Float | String
//! ├── containers   Array(Vec<Value>) | Object(Metadata)
//! └── documents    Document | Documents(Vec<Document>)   ← document graph edges
//! ```
//!
//! Typed access goes through [`FromValue`], which applies the same fallback
//! rules everywhere (`"true"` → `bool`, `"42"` → `i64`, scalars → `String`).

mod convert;
mod metadata;

pub use convert::{ConversionError, FromValue};
pub use metadata::Metadata;

use std::fmt;
use std::path::PathBuf;

use crate::document::Document;

/// A dynamically typed metadata value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absent value.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Ordered list of values.
    Array(Vec<Value>),
    /// Nested key/value map.
    Object(Metadata),
    /// Reference to another document.
    Document(Document),
    /// Ordered references to other documents.
    Documents(Vec<Document>),
}

impl Value {
    /// Short name of the variant, used in conversion errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Document(_) => "document",
            Self::Documents(_) => "documents",
        }
    }

    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Borrow the string if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to the requested type using the shared fallback rules.
    pub fn get<T: FromValue>(&self) -> Option<T> {
        T::from_value(self)
    }

    /// Convert to the requested type, reporting a [`ConversionError`] on failure.
    pub fn try_get<T: FromValue>(&self) -> Result<T, ConversionError> {
        T::from_value(self).ok_or_else(|| ConversionError::new::<T>(self))
    }

    /// Visit every document directly referenced by this value, recursing into
    /// arrays and objects but not into the referenced documents themselves.
    pub fn for_each_document(&self, f: &mut impl FnMut(&Document)) {
        match self {
            Self::Document(doc) => f(doc),
            Self::Documents(docs) => docs.iter().for_each(|d| f(d)),
            Self::Array(items) => items.iter().for_each(|v| v.for_each_document(f)),
            Self::Object(map) => map.values().for_each(|v| v.for_each_document(f)),
            _ => {}
        }
    }

    /// Convert to JSON. Documents are represented by their identity.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Self::Null => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Int(i) => Json::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
            Self::String(s) => Json::String(s.clone()),
            Self::Array(items) => Json::Array(items.iter().map(Self::to_json).collect()),
            Self::Object(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Self::Document(doc) => Json::String(doc.id().to_string()),
            Self::Documents(docs) => {
                Json::Array(docs.iter().map(|d| Json::String(d.id().to_string())).collect())
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Document(a), Self::Document(b)) => a.same_instance(b),
            (Self::Documents(a), Self::Documents(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_instance(y))
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
            Self::Document(doc) => write!(f, "{doc}"),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

// =============================================================================
// Conversions into Value
// =============================================================================

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Self::String(s),
            Json::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Json::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident $(as $cast:ty)?),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Self::$variant(value $(as $cast)?)
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i64 => Int,
    i32 => Int as i64,
    u32 => Int as i64,
    f64 => Float,
    String => String,
    Vec<Value> => Array,
    Metadata => Object,
    Document => Document,
    Vec<Document> => Documents,
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<PathBuf> for Value {
    fn from(value: PathBuf) -> Self {
        Self::String(value.to_string_lossy().into_owned())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    #[test]
    fn test_from_json() {
        let json = serde_json::json!({
            "title": "Hello",
            "count": 3,
            "ratio": 0.5,
            "tags": ["a", "b"],
        });
        let Value::Object(map) = Value::from(json) else {
            panic!("expected object");
        };
        assert_eq!(map.get("title"), Some(&Value::from("Hello")));
        assert_eq!(map.get("count"), Some(&Value::Int(3)));
        assert_eq!(map.get("ratio"), Some(&Value::Float(0.5)));
        assert_eq!(map.get_as::<Vec<String>>("tags"), Some(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn test_for_each_document_recurses_containers() {
        let a = Document::from_text("a");
        let b = Document::from_text("b");
        let c = Document::from_text("c");
        let nested: Metadata = [("inner", Value::Document(c.clone()))].into_iter().collect();
        let value = Value::Array(vec![
            Value::Document(a.clone()),
            Value::Documents(vec![b.clone()]),
            Value::Object(nested),
            Value::Int(1),
        ]);

        let mut seen = Vec::new();
        value.for_each_document(&mut |d| seen.push(d.clone()));
        assert_eq!(seen.len(), 3);
        assert!(seen[0].same_instance(&a));
        assert!(seen[1].same_instance(&b));
        assert!(seen[2].same_instance(&c));
    }

    #[test]
    fn test_document_equality_is_by_instance() {
        let a = Document::from_text("same");
        let b = Document::from_text("same");
        assert_eq!(Value::Document(a.clone()), Value::Document(a.clone()));
        assert_ne!(Value::Document(a), Value::Document(b));
    }
}
