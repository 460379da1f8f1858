// ABOUTME: In-memory key/value property store keyed by sandbox handle.
// ABOUTME: Backs container properties, label filters, and reserved state keys.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// Properties of one sandbox, ordered by name.
pub type Properties = BTreeMap<String, String>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("property does not exist: {name}")]
pub struct NoSuchProperty {
    pub name: String,
}

#[derive(Debug, Default)]
pub struct PropertyManager {
    spaces: RwLock<HashMap<String, Properties>>,
}

impl PropertyManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, handle: &str, name: &str, value: &str) {
        self.spaces
            .write()
            .entry(handle.to_string())
            .or_default()
            .insert(name.to_string(), value.to_string());
    }

    pub fn get(&self, handle: &str, name: &str) -> Option<String> {
        self.spaces
            .read()
            .get(handle)
            .and_then(|props| props.get(name).cloned())
    }

    /// Snapshot of every property under `handle`; empty when unknown.
    pub fn all(&self, handle: &str) -> Properties {
        self.spaces.read().get(handle).cloned().unwrap_or_default()
    }

    pub fn remove(&self, handle: &str, name: &str) -> Result<(), NoSuchProperty> {
        self.spaces
            .write()
            .get_mut(handle)
            .and_then(|props| props.remove(name))
            .map(|_| ())
            .ok_or_else(|| NoSuchProperty {
                name: name.to_string(),
            })
    }

    /// True when every filter entry is present under `handle` with an equal value.
    pub fn matches_all(&self, handle: &str, filter: &Properties) -> bool {
        let spaces = self.spaces.read();
        let props = spaces.get(handle);
        filter
            .iter()
            .all(|(k, v)| props.and_then(|p| p.get(k)) == Some(v))
    }

    pub fn destroy_key_space(&self, handle: &str) {
        self.spaces.write().remove(handle);
    }
}
