//! The per-run context map.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;

/// Stage inputs recorded on a `StageResult` are cut to this many characters.
pub const INPUT_SNAPSHOT_CHARS: usize = 200;

/// Key/value state shared by the stages of one run.
///
/// Keys are only ever added. [`set`](Self::set) replaces a value with a
/// newer version of the same artifact; [`insert_unique`](Self::insert_unique)
/// never replaces anything.
#[derive(Debug, Default)]
pub struct RunContext {
    data: RwLock<BTreeMap<String, Value>>,
}

impl RunContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context seeded with the original request.
    #[must_use]
    pub fn for_request(request: &str) -> Self {
        let ctx = Self::new();
        ctx.set(super::keys::ORIGINAL_REQUEST, Value::String(request.to_string()));
        ctx
    }

    /// Gets a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.read().get(key).cloned()
    }

    /// Gets a value as text. Non-string values are rendered as JSON.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.data.read().get(key).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.read().contains_key(key)
    }

    /// Stores a value, replacing any previous version.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.data.write().insert(key.into(), value);
    }

    /// Stores a value without ever overwriting, returning the key used.
    ///
    /// If `key` is taken the value goes under `key#2`, `key#3`, and so on.
    pub fn insert_unique(&self, key: &str, value: Value) -> String {
        let mut data = self.data.write();
        let mut candidate = key.to_string();
        let mut n = 2;
        while data.contains_key(&candidate) {
            candidate = format!("{key}#{n}");
            n += 1;
        }
        data.insert(candidate.clone(), value);
        candidate
    }

    /// Returns all keys in sorted order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if the context is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Returns a copy of every entry.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.data.read().clone()
    }

    /// Returns the named entries as text, each cut to [`INPUT_SNAPSHOT_CHARS`].
    ///
    /// Missing keys are left out.
    #[must_use]
    pub fn input_snapshot(&self, keys: &[&str]) -> BTreeMap<String, String> {
        keys.iter()
            .filter_map(|key| {
                self.get_str(key)
                    .map(|v| ((*key).to_string(), v.chars().take(INPUT_SNAPSHOT_CHARS).collect()))
            })
            .collect()
    }
}

impl Clone for RunContext {
    fn clone(&self) -> Self {
        Self {
            data: RwLock::new(self.data.read().clone()),
        }
    }
}
