//! Engine-wide settings store.

use std::ops::{Deref, DerefMut};
use std::path::Path;

use crate::error::{Error, Result};
use crate::value::{Metadata, Value};

/// Ordered key/value settings with typed getters.
///
/// Settings are visible to every module through the execution context and
/// back [`Config::from_setting`](crate::Config::from_setting). Documents fall
/// back to settings for keys missing from their own metadata when read through
/// [`Config::from_metadata`](crate::Config::from_metadata).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings(Metadata);

impl Settings {
    /// Create empty settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse settings from a JSON object.
    ///
    /// # Example
    ///
    /// ```
    /// use docpipe::Settings;
    ///
    /// let json = r#"{ "title": "Site", "drafts": "false" }"#;
    /// let settings = Settings::from_json_str(json).unwrap();
    /// assert_eq!(settings.get_as::<bool>("drafts"), Some(false));
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self> {
        let parsed: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| Error::module(format!("invalid settings JSON: {e}")))?;
        Self::from_json(parsed)
    }

    /// Read settings from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_json_str(&text)
    }

    /// Build settings from a parsed JSON object.
    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        match Value::from(json) {
            Value::Object(map) => Ok(Self(map)),
            other => Err(Error::module(format!(
                "settings must be a JSON object, found {}",
                other.type_name()
            ))),
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key, value);
        self
    }

    /// Consume into the underlying metadata.
    pub fn into_inner(self) -> Metadata {
        self.0
    }
}

impl Deref for Settings {
    type Target = Metadata;

    fn deref(&self) -> &Metadata {
        &self.0
    }
}

impl DerefMut for Settings {
    fn deref_mut(&mut self) -> &mut Metadata {
        &mut self.0
    }
}

impl From<Metadata> for Settings {
    fn from(metadata: Metadata) -> Self {
        Self(metadata)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Settings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_from_json_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "host": "example.org", "port": "8080", "nested": { "a": 1 } }"#)
            .unwrap();

        let settings = Settings::from_json_file(&path).unwrap();
        assert_eq!(settings.get_as::<String>("host").as_deref(), Some("example.org"));
        assert_eq!(settings.get_as::<u32>("port"), Some(8080));
        assert!(matches!(settings.get("nested"), Some(Value::Object(_))));
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(Settings::from_json_str("[1, 2]").is_err());
        assert!(Settings::from_json_str("{ nope").is_err());
    }
}
