//! Persistent state store.
//!
//! The store is an external collaborator with browser-extension
//! `storage.local` semantics: a flat key-value map of JSON values read and
//! written in batches. The core only ever talks to it through [`SafeStore`],
//! which turns every backend failure into an empty read or a dropped write.

mod config;
pub mod database;
pub mod memory;
pub mod state;

pub use config::Config;
pub use database::SqliteStore;
pub use memory::MemoryStore;
pub use state::{reset_all, Counters, PersistedState};

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::Value;
use tracing::debug;

use crate::error::{ConfigError, StoreError};

/// A batch of key-value pairs as they travel to and from the store.
pub type StateMap = serde_json::Map<String, Value>;

/// Wire names of every persisted key.
pub mod keys {
    pub const COOLDOWN_UNTIL: &str = "cooldownUntil";
    pub const UNLOCKED_UNTIL: &str = "unlockedUntil";
    pub const ESCALATION_COUNT: &str = "escalationCount";
    pub const LAST_ATTEMPT_AT: &str = "lastAttemptAt";
    pub const LAST_COOLDOWN_SECONDS: &str = "lastCooldownSeconds";
    pub const TOTALS: &str = "totals";
    pub const STATS_BY_DAY: &str = "statsByDay";
    pub const REFLECTIONS: &str = "reflections";

    pub const ALL: [&str; 8] = [
        COOLDOWN_UNTIL,
        UNLOCKED_UNTIL,
        ESCALATION_COUNT,
        LAST_ATTEMPT_AT,
        LAST_COOLDOWN_SECONDS,
        TOTALS,
        STATS_BY_DAY,
        REFLECTIONS,
    ];
}

/// Raw key-value backend.
pub trait Store {
    /// Fetch the requested keys. Missing keys are simply absent from the map.
    fn get(&self, keys: &[&str]) -> Result<StateMap, StoreError>;

    /// Write every entry of the batch.
    fn set(&mut self, entries: StateMap) -> Result<(), StoreError>;
}

impl<S: Store + ?Sized> Store for Box<S> {
    fn get(&self, keys: &[&str]) -> Result<StateMap, StoreError> {
        (**self).get(keys)
    }

    fn set(&mut self, entries: StateMap) -> Result<(), StoreError> {
        (**self).set(entries)
    }
}

/// Fail-open wrapper around a [`Store`].
///
/// Reads that fail come back empty and writes that fail are dropped, so
/// callers apply their own defaults and carry on.
#[derive(Debug, Default)]
pub struct SafeStore<S> {
    inner: S,
}

impl<S: Store> SafeStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    pub fn get(&self, keys: &[&str]) -> StateMap {
        match self.inner.get(keys) {
            Ok(map) => map,
            Err(err) => {
                debug!(%err, ?keys, "store read failed, using defaults");
                StateMap::new()
            }
        }
    }

    pub fn set(&mut self, entries: StateMap) {
        if let Err(err) = self.inner.set(entries) {
            debug!(%err, "store write dropped");
        }
    }

    /// Write a single key.
    pub fn set_one(&mut self, key: &str, value: impl Into<Value>) {
        let mut entries = StateMap::new();
        entries.insert(key.to_string(), value.into());
        self.set(entries);
    }

    /// Read an integer key, defaulting to 0.
    pub fn get_u64(&self, key: &str) -> u64 {
        self.get(&[key]).get(key).and_then(value_as_u64).unwrap_or(0)
    }

    /// Read a flat counter map, defaulting to empty.
    pub fn get_counters(&self, key: &str) -> Counters {
        self.get(&[key])
            .get(key)
            .map(counters_from_value)
            .unwrap_or_default()
    }
}

/// Lenient integer decoding: accepts integral and non-negative float JSON numbers.
pub(crate) fn value_as_u64(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0)
            .map(|f| f.round() as u64)
    })
}

/// Decode a counter map, skipping any entry that is not a number.
pub(crate) fn counters_from_value(value: &Value) -> Counters {
    value
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| value_as_u64(v).map(|n| (k.clone(), n)))
                .collect::<BTreeMap<_, _>>()
        })
        .unwrap_or_default()
}

pub(crate) fn counters_to_value(counters: &Counters) -> Value {
    Value::Object(
        counters
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(*v)))
            .collect(),
    )
}

/// Returns the data directory.
///
/// `XCOOLDOWN_DATA_DIR` overrides the location outright; otherwise this is
/// `~/.config/xcooldown[-dev]/`, with `XCOOLDOWN_ENV=dev` selecting the
/// development directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("XCOOLDOWN_DATA_DIR") {
        Some(explicit) => PathBuf::from(explicit),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("XCOOLDOWN_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("xcooldown-dev")
            } else {
                base_dir.join("xcooldown")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(|source| ConfigError::DataDir {
        path: dir.clone(),
        source,
    })?;
    Ok(dir)
}
