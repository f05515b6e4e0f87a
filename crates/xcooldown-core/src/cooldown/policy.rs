//! Escalation ladder.
//!
//! Each committed cooldown climbs one rung; a quiet gap longer than the reset
//! window drops the next cooldown back to the first rung. The ladder is
//! clamped at its last rung, so escalation never grows without bound.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Escalation ladder and the windows around it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    /// Cooldown seconds per rung, non-decreasing.
    pub ladder_secs: Vec<u64>,
    /// Gap after which the ladder resets.
    pub reset_window: Duration,
    /// How long a granted unlock stays open.
    pub unlock_window: Duration,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            ladder_secs: vec![60, 300, 900, 1800],
            reset_window: Duration::from_secs(30 * 60),
            unlock_window: Duration::from_secs(15),
        }
    }
}

/// What the next committed cooldown would look like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationPreview {
    pub duration_ms: u64,
    pub next_count: u32,
    pub now: u64,
}

impl EscalationPolicy {
    /// Escalation count the next commit will record.
    ///
    /// `last_attempt_at == 0` means "never".
    pub fn next_count(&self, escalation_count: u32, last_attempt_at: u64, now: u64) -> u32 {
        let reset_ms = millis(self.reset_window);
        let reset = last_attempt_at == 0 || now.saturating_sub(last_attempt_at) > reset_ms;
        if reset {
            1
        } else {
            escalation_count.saturating_add(1)
        }
    }

    /// Cooldown length for a given escalation count (1-based, clamped).
    pub fn duration_for(&self, count: u32) -> Duration {
        let Some(last) = self.ladder_secs.len().checked_sub(1) else {
            return Duration::ZERO;
        };
        let idx = (count.max(1) as usize - 1).min(last);
        Duration::from_secs(self.ladder_secs[idx])
    }

    pub fn preview(&self, escalation_count: u32, last_attempt_at: u64, now: u64) -> EscalationPreview {
        let next_count = self.next_count(escalation_count, last_attempt_at, now);
        EscalationPreview {
            duration_ms: millis(self.duration_for(next_count)),
            next_count,
            now,
        }
    }

    pub fn unlock_window_ms(&self) -> u64 {
        millis(self.unlock_window)
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
