//! SQLite-backed key-value store.
//!
//! Values are stored as JSON text in a single `kv` table, which keeps the
//! wire contract identical to the browser's `storage.local`.

use std::path::Path;

use rusqlite::{params, Connection};
use serde_json::Value;

use super::{data_dir, StateMap, Store};
use crate::error::StoreError;

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open the store at `<data_dir>/xcooldown.db`.
    ///
    /// # Errors
    /// Returns an error if the data directory or database cannot be opened.
    pub fn open() -> crate::error::Result<Self> {
        let path = data_dir()?.join("xcooldown.db");
        Ok(Self::open_at(&path)?)
    }

    /// Open (or create) a database file at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )
    }

    fn kv_get(&self, key: &str) -> Result<Option<String>, rusqlite::Error> {
        let mut stmt = self.conn.prepare_cached("SELECT value FROM kv WHERE key = ?1")?;
        match stmt.query_row(params![key], |row| row.get::<_, String>(0)) {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Store for SqliteStore {
    fn get(&self, keys: &[&str]) -> Result<StateMap, StoreError> {
        let mut out = StateMap::new();
        for key in keys {
            if let Some(raw) = self.kv_get(key)? {
                let value: Value =
                    serde_json::from_str(&raw).map_err(|e| StoreError::InvalidValue {
                        key: key.to_string(),
                        message: e.to_string(),
                    })?;
                out.insert(key.to_string(), value);
            }
        }
        Ok(out)
    }

    fn set(&mut self, entries: StateMap) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        for (key, value) in &entries {
            tx.execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                params![key, value.to_string()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn batch_set_then_get() {
        let mut store = SqliteStore::open_memory().unwrap();
        let mut batch = StateMap::new();
        batch.insert("cooldownUntil".into(), json!(1_700_000_000_000u64));
        batch.insert("totals".into(), json!({"attempts": 3}));
        store.set(batch).unwrap();

        let got = store.get(&["cooldownUntil", "totals", "missing"]).unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got["totals"]["attempts"], json!(3));
    }

    #[test]
    fn overwrite_replaces_value() {
        let mut store = SqliteStore::open_memory().unwrap();
        let mut batch = StateMap::new();
        batch.insert("escalationCount".into(), json!(1));
        store.set(batch.clone()).unwrap();
        batch.insert("escalationCount".into(), json!(2));
        store.set(batch).unwrap();
        assert_eq!(store.get(&["escalationCount"]).unwrap()["escalationCount"], json!(2));
    }

    #[test]
    fn corrupt_row_is_reported() {
        let store = SqliteStore::open_memory().unwrap();
        store
            .conn
            .execute("INSERT INTO kv (key, value) VALUES ('totals', '{not json')", [])
            .unwrap();
        assert!(matches!(
            store.get(&["totals"]),
            Err(StoreError::InvalidValue { .. })
        ));
    }
}
