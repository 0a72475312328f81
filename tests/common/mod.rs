//! Common test utilities and helpers

#![allow(dead_code)]

use metaloop_core::orchestration::{ExecutionOutput, ExecutionRequest};
use metaloop_core::{LoopConfig, MetaLoop, Telemetry, TracePaths};
use tempfile::TempDir;

/// Trace paths rooted in a temporary directory
pub fn temp_paths(dir: &TempDir) -> TracePaths {
    TracePaths {
        config: dir.path().join("policies").join("meta_loop.json"),
        state: dir.path().join("trace").join("meta_ucb_state.json"),
        receipts: dir.path().join("trace").join("meta_receipts.jsonl"),
    }
}

/// Engine over the built-in default configuration
pub fn default_engine(dir: &TempDir) -> MetaLoop {
    MetaLoop::new(LoopConfig::default(), &temp_paths(dir)).expect("default config is valid")
}

pub fn telemetry(pairs: &[(&str, f64)]) -> Telemetry {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

/// Executor whose pass flag depends only on the chosen plan
pub fn plan_oracle(
    winning_plan: &'static str,
) -> impl FnMut(&ExecutionRequest<'_>) -> anyhow::Result<ExecutionOutput> {
    move |req: &ExecutionRequest<'_>| {
        let pass = match req.arm("plan") {
            Some(arm) if arm.id() == winning_plan => 1.0,
            _ => 0.0,
        };
        Ok(ExecutionOutput {
            telemetry: telemetry(&[("pass", pass), ("time", 0.2), ("cost", 0.1)]),
            artifact: serde_json::json!({ "task": req.task }),
        })
    }
}
