use clap::Subcommand;
use serde_json::json;
use xcooldown_core::stats::day_key;
use xcooldown_core::{Clock, PersistedState, SystemClock};

use super::open_store;

#[derive(Subcommand)]
pub enum StatsAction {
    /// Today's counters
    Today,
    /// Lifetime counters
    All,
    /// Every persisted key
    Dump,
}

pub fn run(action: StatsAction) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store()?;
    let state = PersistedState::load(&store);

    match action {
        StatsAction::Today => {
            let day = day_key(SystemClock.now_ms());
            let counters = state.day(&day);
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "day": day, "counters": counters }))?
            );
        }
        StatsAction::All => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "totals": state.totals,
                    "escalationCount": state.escalation_count,
                    "lastCooldownSeconds": state.last_cooldown_seconds,
                }))?
            );
        }
        StatsAction::Dump => {
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
    }
    Ok(())
}
