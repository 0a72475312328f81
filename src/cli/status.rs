//! Selector state summary

use metaloop_core::orchestration::StatusReport;
use metaloop_core::{MetaLoop, TracePaths};

use super::helpers::print_json;

pub fn handle(paths: &TracePaths) -> anyhow::Result<()> {
    let engine = MetaLoop::from_paths(paths)?;
    let status = StatusReport::collect(&engine)?;
    print_json(&status, true)
}
