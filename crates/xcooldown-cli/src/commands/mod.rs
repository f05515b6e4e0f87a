pub mod config;
pub mod reset;
pub mod simulate;
pub mod stats;
pub mod status;

use xcooldown_core::{SafeStore, SqliteStore};

/// Open the on-disk store behind the fail-open wrapper.
pub(crate) fn open_store() -> Result<SafeStore<SqliteStore>, Box<dyn std::error::Error>> {
    Ok(SafeStore::new(SqliteStore::open()?))
}
