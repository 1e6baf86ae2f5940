/*!
 * In-Memory Storage Implementation
 *
 * This module provides the key-value map that backs minidb. It knows
 * nothing about sockets or files; the dispatcher mutates it and the
 * snapshot layer fills and drains it.
 */

use std::collections::HashMap;
use std::hash::BuildHasherDefault;

// AHash is considerably faster than SipHash for short string keys
type AHash = BuildHasherDefault<ahash::AHasher>;

/// In-memory string-to-string dictionary
///
/// Keys are unique. Iteration order is unspecified.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Store {
    inner: HashMap<String, String, AHash>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value by key
    ///
    /// # Returns
    /// * `Some(&str)` if key exists
    /// * `None` if key doesn't exist
    #[inline]
    pub fn get(&self, k: &str) -> Option<&str> {
        self.inner.get(k).map(String::as_str)
    }

    /// Set a key-value pair
    ///
    /// Inserts or overwrites unconditionally.
    #[inline]
    pub fn set(&mut self, k: String, v: String) {
        self.inner.insert(k, v);
    }

    /// Delete a key
    ///
    /// # Returns
    /// * `true` if key existed and was deleted
    /// * `false` if key didn't exist
    #[inline]
    pub fn del(&mut self, k: &str) -> bool {
        self.inner.remove(k).is_some()
    }

    #[inline]
    pub fn exists(&self, k: &str) -> bool {
        self.inner.contains_key(k)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterate over all entries in unspecified order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for Store {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut store = Store::new();
        for (k, v) in iter {
            store.set(k, v);
        }
        store
    }
}
