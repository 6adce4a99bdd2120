//! Ordered key/value map used for document metadata and engine settings.

use indexmap::IndexMap;

use super::{ConversionError, FromValue, Value};

/// Insertion-ordered metadata map.
///
/// Metadata is never mutated through a [`Document`](crate::Document); clones
/// receive a new map built from the old one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata(IndexMap<String, Value>);

impl Metadata {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Look up a raw value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns `true` if the key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Look up and convert a value, treating conversion failure as absence.
    pub fn get_as<T: FromValue>(&self, key: &str) -> Option<T> {
        self.0.get(key).and_then(T::from_value)
    }

    /// Look up and convert a value, falling back to `default`.
    pub fn get_or<T: FromValue>(&self, key: &str, default: T) -> T {
        self.get_as(key).unwrap_or(default)
    }

    /// Look up and convert a value, reporting conversion failures.
    ///
    /// Returns `Ok(None)` when the key is absent.
    pub fn try_get_as<T: FromValue>(&self, key: &str) -> Result<Option<T>, ConversionError> {
        self.0.get(key).map(Value::try_get).transpose()
    }

    /// Insert or replace a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Remove a value, preserving the order of the remaining entries.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Return a new map with `other` layered on top of `self`.
    pub fn merged(&self, other: &Metadata) -> Metadata {
        let mut result = self.clone();
        for (key, value) in other.iter() {
            result.0.insert(key.clone(), value.clone());
        }
        result
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Iterate keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Iterate values in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.0.values()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<String>, V: Into<Value>> Extend<(K, V)> for Metadata {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.0.extend(iter.into_iter().map(|(k, v)| (k.into(), v.into())));
    }
}

impl IntoIterator for Metadata {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_order_and_overrides() {
        let base: Metadata = [("a", 1), ("b", 2)].into_iter().collect();
        let top: Metadata = [("b", 20), ("c", 30)].into_iter().collect();
        let merged = base.merged(&top);

        let keys: Vec<_> = merged.keys().cloned().collect();
        assert_eq!(keys, ["a", "b", "c"]);
        assert_eq!(merged.get_as::<i64>("b"), Some(20));
        assert_eq!(base.get_as::<i64>("b"), Some(2));
    }

    #[test]
    fn test_try_get_reports_mismatch() {
        let meta = Metadata::new().with("count", "many");
        assert!(meta.try_get_as::<i64>("count").is_err());
        assert_eq!(meta.try_get_as::<i64>("missing").unwrap(), None);
        assert_eq!(meta.get_or("count", 5_i64), 5);
    }
}
