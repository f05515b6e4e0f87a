//! Typed view over the persisted keys.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use super::{counters_from_value, keys, value_as_u64, SafeStore, StateMap, Store};
use crate::stats::Reflection;

/// Flat counter map (`totals`, or one day of `statsByDay`).
pub type Counters = BTreeMap<String, u64>;

/// Snapshot of everything the store holds, with defaults applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub cooldown_until: u64,
    pub unlocked_until: u64,
    pub escalation_count: u32,
    pub last_attempt_at: u64,
    pub last_cooldown_seconds: u64,
    pub totals: Counters,
    pub stats_by_day: BTreeMap<String, Counters>,
    pub reflections: Vec<Reflection>,
}

impl PersistedState {
    pub fn load<S: Store>(store: &SafeStore<S>) -> Self {
        let raw = store.get(&keys::ALL);
        let int = |key: &str| raw.get(key).and_then(value_as_u64).unwrap_or(0);

        let stats_by_day = raw
            .get(keys::STATS_BY_DAY)
            .and_then(Value::as_object)
            .map(|days| {
                days.iter()
                    .map(|(day, counters)| (day.clone(), counters_from_value(counters)))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            cooldown_until: int(keys::COOLDOWN_UNTIL),
            unlocked_until: int(keys::UNLOCKED_UNTIL),
            escalation_count: u32::try_from(int(keys::ESCALATION_COUNT)).unwrap_or(u32::MAX),
            last_attempt_at: int(keys::LAST_ATTEMPT_AT),
            last_cooldown_seconds: int(keys::LAST_COOLDOWN_SECONDS),
            totals: raw
                .get(keys::TOTALS)
                .map(counters_from_value)
                .unwrap_or_default(),
            stats_by_day,
            reflections: raw
                .get(keys::REFLECTIONS)
                .map(Reflection::list_from_value)
                .unwrap_or_default(),
        }
    }

    /// Counters recorded for one calendar day, empty if none.
    pub fn day(&self, day_key: &str) -> Counters {
        self.stats_by_day.get(day_key).cloned().unwrap_or_default()
    }

    /// Every key at its default value.
    pub fn defaults_map() -> StateMap {
        let mut map = StateMap::new();
        for key in [
            keys::COOLDOWN_UNTIL,
            keys::UNLOCKED_UNTIL,
            keys::ESCALATION_COUNT,
            keys::LAST_ATTEMPT_AT,
            keys::LAST_COOLDOWN_SECONDS,
        ] {
            map.insert(key.to_string(), Value::from(0));
        }
        map.insert(keys::TOTALS.to_string(), Value::Object(StateMap::new()));
        map.insert(keys::STATS_BY_DAY.to_string(), Value::Object(StateMap::new()));
        map.insert(keys::REFLECTIONS.to_string(), Value::Array(Vec::new()));
        map
    }
}

/// Zero every key back to its default. Destructive; used by the dashboard.
pub fn reset_all<S: Store>(store: &mut SafeStore<S>) {
    store.set(PersistedState::defaults_map());
    tracing::info!("persisted state reset to defaults");
}
