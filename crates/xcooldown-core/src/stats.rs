//! Stats recorder: lifetime totals, per-day counters and reflection history.

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::gate::ActionType;
use crate::storage::{counters_from_value, counters_to_value, keys, SafeStore, Store};

/// Default cap on the reflection history.
pub const REFLECTION_LIMIT: usize = 50;

/// Every counter tracked in `totals` and `statsByDay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Counter {
    Attempts,
    Confirmed,
    Canceled,
    EngagementsAllowed,
    CooldownsCommitted,
    CooldownsCanceled,
    BlockedDuringCooldown,
}

impl Counter {
    pub const ALL: [Counter; 7] = [
        Counter::Attempts,
        Counter::Confirmed,
        Counter::Canceled,
        Counter::EngagementsAllowed,
        Counter::CooldownsCommitted,
        Counter::CooldownsCanceled,
        Counter::BlockedDuringCooldown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Counter::Attempts => "attempts",
            Counter::Confirmed => "confirmed",
            Counter::Canceled => "canceled",
            Counter::EngagementsAllowed => "engagementsAllowed",
            Counter::CooldownsCommitted => "cooldownsCommitted",
            Counter::CooldownsCanceled => "cooldownsCanceled",
            Counter::BlockedDuringCooldown => "blockedDuringCooldown",
        }
    }
}

/// Name of the timestamp kept alongside the lifetime counters.
pub const LAST_COOLDOWN_AT: &str = "lastCooldownAt";

/// One entry of the reflection history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reflection {
    pub ts: u64,
    pub action_type: ActionType,
    pub reflection: String,
    pub cooldown_seconds: u64,
}

impl Reflection {
    /// Decode a stored list, dropping entries that do not parse.
    pub fn list_from_value(value: &Value) -> Vec<Reflection> {
        value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Local calendar day of an epoch-millisecond instant, as `YYYY-MM-DD`.
pub fn day_key(now_ms: u64) -> String {
    local_time(now_ms).format("%Y-%m-%d").to_string()
}

pub(crate) fn local_time(ms: u64) -> DateTime<Local> {
    let ms = i64::try_from(ms).unwrap_or(i64::MAX);
    Local
        .timestamp_millis_opt(ms)
        .single()
        .unwrap_or_else(|| DateTime::<Utc>::UNIX_EPOCH.with_timezone(&Local))
}

/// Counter bookkeeping on top of the state store.
///
/// Each call is a read-modify-write of one key; there is no cross-key
/// transaction, matching the store's own semantics.
pub struct StatsRecorder<'a, S> {
    store: &'a mut SafeStore<S>,
}

impl<'a, S: Store> StatsRecorder<'a, S> {
    pub fn new(store: &'a mut SafeStore<S>) -> Self {
        Self { store }
    }

    /// Bump both the lifetime total and today's counter by one.
    pub fn record(&mut self, counter: Counter, now_ms: u64) {
        self.bump_total(counter, 1);
        self.bump_daily(counter, 1, now_ms);
    }

    pub fn bump_total(&mut self, counter: Counter, inc: u64) {
        let mut totals = self.store.get_counters(keys::TOTALS);
        *totals.entry(counter.as_str().to_string()).or_insert(0) += inc;
        self.store.set_one(keys::TOTALS, counters_to_value(&totals));
    }

    /// Stamp `lastCooldownAt` into the lifetime totals.
    pub fn mark_last_cooldown(&mut self, at_ms: u64) {
        let mut totals = self.store.get_counters(keys::TOTALS);
        totals.insert(LAST_COOLDOWN_AT.to_string(), at_ms);
        self.store.set_one(keys::TOTALS, counters_to_value(&totals));
    }

    pub fn bump_daily(&mut self, counter: Counter, inc: u64, now_ms: u64) {
        let day = day_key(now_ms);
        let raw = self.store.get(&[keys::STATS_BY_DAY]);
        let mut by_day = raw
            .get(keys::STATS_BY_DAY)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let mut counters = by_day.get(&day).map(counters_from_value).unwrap_or_default();
        *counters.entry(counter.as_str().to_string()).or_insert(0) += inc;
        by_day.insert(day, counters_to_value(&counters));

        self.store.set_one(keys::STATS_BY_DAY, Value::Object(by_day));
    }

    /// Prepend a reflection and keep at most `limit` entries, newest first.
    pub fn append_reflection(&mut self, entry: Reflection, limit: usize) {
        let raw = self.store.get(&[keys::REFLECTIONS]);
        let mut list = raw
            .get(keys::REFLECTIONS)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        match serde_json::to_value(&entry) {
            Ok(value) => list.insert(0, value),
            Err(err) => {
                tracing::debug!(%err, "reflection not encodable, skipped");
                return;
            }
        }
        list.truncate(limit);
        self.store.set_one(keys::REFLECTIONS, Value::Array(list));
    }
}
