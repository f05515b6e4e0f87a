//! In-process store.

use serde_json::Value;

use super::{StateMap, Store};
use crate::error::StoreError;

/// Map-backed [`Store`] with a switch that simulates a dead extension context.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: StateMap,
    invalidated: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a raw value in place, bypassing the availability switch.
    pub fn seed(&mut self, key: &str, value: Value) {
        self.data.insert(key.to_string(), value);
    }

    /// Raw view of a stored value.
    pub fn peek(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Make every subsequent call fail, as a reloaded extension would.
    pub fn invalidate(&mut self) {
        self.invalidated = true;
    }

    pub fn restore(&mut self) {
        self.invalidated = false;
    }
}

impl Store for MemoryStore {
    fn get(&self, keys: &[&str]) -> Result<StateMap, StoreError> {
        if self.invalidated {
            return Err(StoreError::ContextInvalidated);
        }
        Ok(keys
            .iter()
            .filter_map(|k| self.data.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }

    fn set(&mut self, entries: StateMap) -> Result<(), StoreError> {
        if self.invalidated {
            return Err(StoreError::ContextInvalidated);
        }
        self.data.extend(entries);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_returns_only_present_keys() {
        let mut store = MemoryStore::new();
        store.seed("a", json!(1));
        let got = store.get(&["a", "b"]).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got["a"], json!(1));
    }

    #[test]
    fn invalidated_store_errors() {
        let mut store = MemoryStore::new();
        store.invalidate();
        assert!(matches!(store.get(&["a"]), Err(StoreError::ContextInvalidated)));
        assert!(store.set(StateMap::new()).is_err());
    }
}
