use xcooldown_core::storage::reset_all;

use super::open_store;

pub fn run(yes: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !yes {
        return Err("this erases every counter, reflection and cooldown; rerun with --yes".into());
    }
    let mut store = open_store()?;
    reset_all(&mut store);
    println!("all stats reset");
    Ok(())
}
