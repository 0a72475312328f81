//! State reset command

use metaloop_core::{Result, StateStore, TracePaths};
use tracing::info;

pub fn handle(paths: &TracePaths) -> anyhow::Result<()> {
    reset(paths)?;
    Ok(())
}

fn reset(paths: &TracePaths) -> Result<bool> {
    let store = StateStore::new(&paths.state);
    let removed = store.reset()?;
    if removed {
        info!("Removed state at {}", store.path().display());
    } else {
        info!("No state at {}; nothing to reset", store.path().display());
    }
    Ok(removed)
}
