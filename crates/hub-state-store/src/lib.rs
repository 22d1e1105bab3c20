//! Shared key/value state storage for homehub
//!
//! This crate provides the StateStore, a concurrent string key/value store
//! that components read from and write to. Displays resolve short codes
//! against it and camera workers publish their last artifact pointer into it.
//! Values are stored as strings, usually JSON-encoded.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

/// The state store holds the latest value for each key
pub struct StateStore {
    /// All values keyed by state key
    values: DashMap<String, String>,
}

impl StateStore {
    /// Create an empty state store
    pub fn new() -> Self {
        Self {
            values: DashMap::new(),
        }
    }

    /// Set the value of a key
    ///
    /// Returns the previous value, if any.
    #[instrument(skip(self, value), fields(key = %key))]
    pub fn set(&self, key: &str, value: impl Into<String>) -> Option<String> {
        let value = value.into();
        let old = self.values.insert(key.to_string(), value);
        debug!(changed = old.is_some(), "Setting state");
        old
    }

    /// Get the current value of a key
    pub fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).map(|v| v.clone())
    }

    /// Check if a key holds a value
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Remove a key
    #[instrument(skip(self))]
    pub fn remove(&self, key: &str) -> Option<String> {
        let old = self.values.remove(key).map(|(_, v)| v);
        if old.is_some() {
            trace!("Removed state");
        }
        old
    }

    /// Get all keys
    pub fn keys(&self) -> Vec<String> {
        self.values.iter().map(|r| r.key().clone()).collect()
    }

    /// Get the number of stored keys
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper for StateStore
pub type SharedStateStore = Arc<StateStore>;
