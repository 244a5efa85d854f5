//! String-keyed, string-valued persistence seam.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::error::PersistenceError;

/// Key-value persistence used by the selection store and the profile repository.
///
/// Writes to one key must land in call order; both implementations here
/// issue writes synchronously on a single handle.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError>;

    /// Write several entries as one unit.
    fn multi_set(&self, entries: &[(&str, &str)]) -> Result<(), PersistenceError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for &T {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        (**self).set(key, value)
    }

    fn multi_set(&self, entries: &[(&str, &str)]) -> Result<(), PersistenceError> {
        (**self).multi_set(entries)
    }
}

/// In-process store. Used by tests and by runs without a database file.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<String, String>>,
    writes: RefCell<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let store = Self::new();
        store.entries.borrow_mut().extend(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into())),
        );
        store
    }

    /// Keys written so far, in write order.
    pub fn write_log(&self) -> Vec<String> {
        self.writes.borrow().clone()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        self.writes.borrow_mut().push(key.to_string());
        Ok(())
    }

    fn multi_set(&self, entries: &[(&str, &str)]) -> Result<(), PersistenceError> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }
}
