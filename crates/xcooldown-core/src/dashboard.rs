//! Read-only statistics view over the persisted store.

use std::fmt;

use serde::Serialize;

use crate::stats::{day_key, local_time, Counter, Reflection, LAST_COOLDOWN_AT};
use crate::storage::{Counters, PersistedState, SafeStore, Store};

/// How many reflections the dashboard lists.
pub const RECENT_REFLECTIONS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GateStatus {
    Ready,
    Cooldown { remaining_ms: u64, level: u32 },
    Unlocked { remaining_ms: u64 },
}

impl fmt::Display for GateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateStatus::Ready => write!(f, "Ready (no cooldown)"),
            GateStatus::Cooldown {
                remaining_ms,
                level,
            } => write!(
                f,
                "Cooldown: {} remaining (level {level})",
                format_remaining(*remaining_ms)
            ),
            GateStatus::Unlocked { remaining_ms } => {
                write!(f, "Unlocked: {} remaining", format_remaining(*remaining_ms))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub day: String,
    pub status: GateStatus,
    pub totals: Counters,
    pub today: Counters,
    pub last_cooldown_seconds: u64,
    pub last_cooldown_at: Option<u64>,
    pub recent: Vec<Reflection>,
}

impl DashboardView {
    pub fn load<S: Store>(store: &SafeStore<S>, now: u64) -> Self {
        let state = PersistedState::load(store);
        let day = day_key(now);

        let status = if state.cooldown_until > now {
            GateStatus::Cooldown {
                remaining_ms: state.cooldown_until - now,
                level: state.escalation_count.max(1),
            }
        } else if state.unlocked_until > now {
            GateStatus::Unlocked {
                remaining_ms: state.unlocked_until - now,
            }
        } else {
            GateStatus::Ready
        };

        let last_cooldown_at = state
            .totals
            .get(LAST_COOLDOWN_AT)
            .copied()
            .filter(|ts| *ts > 0);

        Self {
            today: state.day(&day),
            day,
            status,
            last_cooldown_seconds: state.last_cooldown_seconds,
            last_cooldown_at,
            recent: state
                .reflections
                .into_iter()
                .take(RECENT_REFLECTIONS)
                .collect(),
            totals: state.totals,
        }
    }

    pub fn total(&self, counter: Counter) -> u64 {
        self.totals.get(counter.as_str()).copied().unwrap_or(0)
    }

    pub fn today(&self, counter: Counter) -> u64 {
        self.today.get(counter.as_str()).copied().unwrap_or(0)
    }

    /// `"{secs}s @ {time}"`, or a dash if no cooldown was ever committed.
    pub fn last_cooldown_label(&self) -> String {
        match self.last_cooldown_at {
            Some(at) => {
                let secs = match self.last_cooldown_seconds {
                    0 => "—".to_string(),
                    n => n.to_string(),
                };
                format!("{secs}s @ {}", format_time(at))
            }
            None => "—".to_string(),
        }
    }
}

impl fmt::Display for DashboardView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Status: {}", self.status)?;
        writeln!(f)?;
        writeln!(f, "Lifetime")?;
        for counter in Counter::ALL {
            writeln!(f, "  {:<22} {}", counter.as_str(), self.total(counter))?;
        }
        writeln!(f, "  {:<22} {}", "lastCooldown", self.last_cooldown_label())?;
        writeln!(f)?;
        writeln!(f, "Today ({})", self.day)?;
        for counter in Counter::ALL {
            writeln!(f, "  {:<22} {}", counter.as_str(), self.today(counter))?;
        }
        writeln!(f)?;
        writeln!(f, "Recent reflections")?;
        if self.recent.is_empty() {
            writeln!(f, "  No reflections yet.")?;
        }
        for r in &self.recent {
            writeln!(
                f,
                "  [{} • {}s] {}  {}",
                r.action_type,
                r.cooldown_seconds,
                format_time(r.ts),
                r.reflection
            )?;
        }
        Ok(())
    }
}

/// `"{m}m {s}s"` above a minute, `"{s}s"` otherwise. Rounds up.
pub fn format_remaining(ms: u64) -> String {
    let s = ms.div_ceil(1000);
    let (m, r) = (s / 60, s % 60);
    if m > 0 {
        format!("{m}m {r}s")
    } else {
        format!("{r}s")
    }
}

fn format_time(ms: u64) -> String {
    if ms == 0 {
        return "—".to_string();
    }
    local_time(ms).format("%Y-%m-%d %H:%M:%S").to_string()
}
