use xcooldown_core::{Clock, DashboardView, PersistedState, SystemClock};

use super::open_store;

pub fn run(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store()?;
    let view = DashboardView::load(&store, SystemClock.now_ms());
    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print!("{view}");
    }
    Ok(())
}

pub fn reflections(limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store()?;
    let state = PersistedState::load(&store);
    let recent: Vec<_> = state.reflections.into_iter().take(limit).collect();
    println!("{}", serde_json::to_string_pretty(&recent)?);
    Ok(())
}
