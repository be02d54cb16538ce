//! # Collection Registry
//!
//! Creates or opens named record collections in the in-process store.
//! `create_or_open` is atomic: callers racing to create the same name all
//! end up holding the single collection that resulted, and creation
//! options only apply to whichever caller actually created it.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

pub mod collection;
pub mod errors;

pub use collection::{Collection, CollectionOptions};
pub use errors::{RegistryError, RegistryResult};

/// Registry of named collections sharing one key type.
#[derive(Debug)]
pub struct CollectionRegistry<K: Ord> {
    collections: RwLock<HashMap<String, Arc<Collection<K>>>>,
}

impl<K: Ord> Default for CollectionRegistry<K> {
    fn default() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }
}

impl<K: Ord + Clone + fmt::Display> CollectionRegistry<K> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Open the collection named `name`, creating it with `options` if it
    /// does not exist yet. Options are ignored when the collection is
    /// already present; caps apply only at creation.
    pub fn create_or_open(
        &self,
        name: &str,
        options: CollectionOptions,
    ) -> RegistryResult<Arc<Collection<K>>> {
        {
            let map = self
                .collections
                .read()
                .map_err(|_| RegistryError::poisoned())?;
            if let Some(existing) = map.get(name) {
                return Ok(Arc::clone(existing));
            }
        }

        let mut map = self
            .collections
            .write()
            .map_err(|_| RegistryError::poisoned())?;
        // A racing creator may have won between the two locks; its
        // collection is the one everyone gets.
        if let Some(existing) = map.get(name) {
            return Ok(Arc::clone(existing));
        }

        options.validate()?;
        let collection = Arc::new(Collection::new(name, options));
        map.insert(name.to_string(), Arc::clone(&collection));
        Ok(collection)
    }

    /// Drop the collection named `name` with all its records. Returns
    /// whether a collection was present.
    pub fn drop_collection(&self, name: &str) -> RegistryResult<bool> {
        let mut map = self
            .collections
            .write()
            .map_err(|_| RegistryError::poisoned())?;
        Ok(map.remove(name).is_some())
    }

    /// Names of all resident collections
    pub fn names(&self) -> Vec<String> {
        self.collections
            .read()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }
}
