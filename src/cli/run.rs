//! Single-round command

use metaloop_core::{MetaLoop, SimulatedExecutor, TracePaths};
use tracing::debug;

use super::helpers::print_json;

/// Run one round with the simulated executor and print the receipt
pub fn handle(paths: &TracePaths, task: &str, seed: Option<u64>, pretty: bool) -> anyhow::Result<()> {
    let engine = MetaLoop::from_paths(paths)?;
    debug!(
        "Running round: state={}, receipts={}",
        paths.state.display(),
        paths.receipts.display()
    );

    let mut executor = match seed {
        Some(seed) => SimulatedExecutor::seeded(seed),
        None => SimulatedExecutor::from_entropy(),
    };
    let report = engine.run_round(task, &mut executor)?;

    print_json(&report.receipt, pretty)?;
    if let Some(adaptation) = &report.adaptation {
        print_json(adaptation, pretty)?;
    }
    Ok(())
}
