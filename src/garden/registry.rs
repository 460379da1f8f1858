// ABOUTME: Concurrent handle-to-container map; the point where handles are claimed.
// ABOUTME: Inserts check and claim under one write lock.

use super::error::GardenError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

#[derive(Debug)]
pub struct Registry<C> {
    entries: RwLock<HashMap<String, Arc<C>>>,
}

impl<C> Default for Registry<C> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<C> Registry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, handle: &str, container: Arc<C>) -> Result<(), GardenError> {
        match self.entries.write().entry(handle.to_string()) {
            Entry::Occupied(_) => Err(GardenError::AlreadyExists {
                handle: handle.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(container);
                Ok(())
            }
        }
    }

    /// Removing an absent handle is not an error.
    pub fn remove(&self, handle: &str) -> Option<Arc<C>> {
        self.entries.write().remove(handle)
    }

    pub fn get(&self, handle: &str) -> Result<Arc<C>, GardenError> {
        self.entries
            .read()
            .get(handle)
            .cloned()
            .ok_or_else(|| GardenError::NotFound {
                handle: handle.to_string(),
            })
    }

    /// Unordered snapshot.
    pub fn list(&self) -> Vec<Arc<C>> {
        self.entries.read().values().cloned().collect()
    }

    pub fn exists(&self, handle: &str) -> bool {
        self.entries.read().contains_key(handle)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
