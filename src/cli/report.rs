//! Receipt rollup with guardrail checks

use anyhow::bail;
use metaloop_core::orchestration::{Guardrails, ReceiptRollup};
use metaloop_core::{ReceiptLog, TracePaths};
use serde_json::json;
use tracing::{info, warn};

use super::helpers::print_json;

/// Print the rollup; fail when any guardrail is violated
pub fn handle(
    paths: &TracePaths,
    min_pass_rate: Option<f64>,
    min_avg_score: Option<f64>,
) -> anyhow::Result<()> {
    let log = ReceiptLog::new(&paths.receipts);
    let records = log.read_all()?;
    info!("Read {} receipts from {}", records.len(), log.path().display());

    let rollup = ReceiptRollup::from_records(&records);
    let violations = rollup.check(&Guardrails {
        min_pass_rate,
        min_avg_score,
    });

    print_json(&json!({ "rollup": rollup, "violations": violations }), true)?;

    if !violations.is_empty() {
        for v in &violations {
            warn!(
                "Guardrail {} violated: {:?} < {}",
                v.metric, v.actual, v.threshold
            );
        }
        bail!("{} guardrail(s) violated", violations.len());
    }
    Ok(())
}
