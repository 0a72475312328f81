//! Read-only views over the persisted state and the receipt log.
//!
//! [`StatusReport`] summarizes where the selectors currently stand.
//! [`ReceiptRollup`] folds the receipt log into totals and per-arm means and
//! checks them against static [`Guardrails`].

use crate::error::Result;
use crate::evaluation::{FeedbackEntry, PlateauPolicy, ScoreSource, Section, StatisticsAggregator, UcbSelector};
use crate::orchestration::engine::MetaLoop;
use crate::storage::{ReceiptRecord, RoundReceipt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const TOP_N: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArmStatus {
    pub id: String,
    pub count: u64,
    pub value: f64,
    /// Current confidence bound; absent while the arm is untried
    pub ucb: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionStatus {
    pub t: u64,
    pub arms: Vec<ArmStatus>,
    pub top: Vec<FeedbackEntry>,
}

/// Snapshot of the loop as the next round would see it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub rounds: u64,
    pub ts: Option<DateTime<Utc>>,
    pub last_adapt: Option<DateTime<Utc>>,
    pub rubric: String,
    pub rubric_accepted: bool,
    pub policy: PlateauPolicy,
    pub recent_pass_rate: Option<f64>,
    pub dimensions: BTreeMap<String, DimensionStatus>,
    pub top_pairs: Vec<FeedbackEntry>,
}

impl StatusReport {
    pub fn collect(engine: &MetaLoop) -> Result<Self> {
        let state = engine.store().load();
        let config = engine.config();
        let stats = StatisticsAggregator::new(config.telemetry.clone(), state.stats.clone());

        let mut dimensions = BTreeMap::new();
        for set in &config.arm_sets {
            let selector = UcbSelector::new(
                set.arms.iter().map(|a| a.id.clone()),
                state.dimensions.get(&set.dimension),
            )?;
            let arms = selector
                .arms()
                .iter()
                .zip(selector.ucb_scores())
                .map(|(arm, ucb)| ArmStatus {
                    id: arm.id.clone(),
                    count: arm.trial_count,
                    value: arm.value_estimate,
                    ucb: ucb.is_finite().then_some(ucb),
                })
                .collect();
            dimensions.insert(
                set.dimension.clone(),
                DimensionStatus {
                    t: selector.t(),
                    arms,
                    top: stats.top(Section::Dimension(&set.dimension), TOP_N),
                },
            );
        }

        let recent_pass_rate = (!state.outcomes.is_empty()).then(|| {
            state.outcomes.iter().map(|&o| f64::from(o)).sum::<f64>() / state.outcomes.len() as f64
        });

        Ok(Self {
            rounds: state.rounds,
            ts: state.ts,
            last_adapt: state.last_adapt,
            rubric: config.rubric.clone(),
            rubric_accepted: engine.scorer().rubric().is_some(),
            policy: engine.current_policy(&state),
            recent_pass_rate,
            dimensions,
            top_pairs: stats.top(Section::Pairs, TOP_N),
        })
    }
}

/// Per-arm totals across the receipt log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmRollup {
    pub id: String,
    pub rounds: u64,
    pub avg_score: f64,
    pub pass_rate: f64,
}

/// Totals across the receipt log
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceiptRollup {
    pub rounds: u64,
    pub adaptations: u64,
    pub fallback_rounds: u64,
    pub pass_rate: Option<f64>,
    pub avg_score: Option<f64>,
    pub first_ts: Option<DateTime<Utc>>,
    pub last_ts: Option<DateTime<Utc>>,
    pub arms: BTreeMap<String, Vec<ArmRollup>>,
}

impl ReceiptRollup {
    pub fn from_records(records: &[ReceiptRecord]) -> Self {
        let mut rollup = Self::default();
        let mut score_sum = 0.0;
        let mut passes = 0u64;

        for record in records {
            match record {
                ReceiptRecord::Adaptation(_) => rollup.adaptations += 1,
                ReceiptRecord::Round(receipt) => {
                    rollup.rounds += 1;
                    score_sum += receipt.score;
                    passes += u64::from(receipt.outcome);
                    if matches!(receipt.score_source, ScoreSource::Fallback { .. }) {
                        rollup.fallback_rounds += 1;
                    }
                    rollup.first_ts = Some(rollup.first_ts.map_or(receipt.ts, |t| t.min(receipt.ts)));
                    rollup.last_ts = Some(rollup.last_ts.map_or(receipt.ts, |t| t.max(receipt.ts)));
                    rollup.fold_arms(receipt);
                }
            }
        }

        if rollup.rounds > 0 {
            let n = rollup.rounds as f64;
            rollup.pass_rate = Some(passes as f64 / n);
            rollup.avg_score = Some(score_sum / n);
        }
        rollup
    }

    fn fold_arms(&mut self, receipt: &RoundReceipt) {
        for choice in &receipt.arms {
            let bucket = self.arms.entry(choice.dimension.clone()).or_default();
            let idx = match bucket.iter().position(|a| a.id == choice.id()) {
                Some(i) => i,
                None => {
                    bucket.push(ArmRollup {
                        id: choice.id().to_string(),
                        rounds: 0,
                        avg_score: 0.0,
                        pass_rate: 0.0,
                    });
                    bucket.len() - 1
                }
            };
            let arm = &mut bucket[idx];
            arm.rounds += 1;
            let n = arm.rounds as f64;
            arm.avg_score += (receipt.score - arm.avg_score) / n;
            arm.pass_rate += (f64::from(receipt.outcome) - arm.pass_rate) / n;
        }
    }

    /// Every guardrail the rollup violates. A threshold with no data to
    /// compare against counts as violated.
    pub fn check(&self, guardrails: &Guardrails) -> Vec<GuardrailViolation> {
        let mut violations = Vec::new();
        let mut test = |metric: &str, actual: Option<f64>, threshold: Option<f64>| {
            if let Some(threshold) = threshold {
                if actual.map_or(true, |a| a < threshold) {
                    violations.push(GuardrailViolation {
                        metric: metric.to_string(),
                        actual,
                        threshold,
                    });
                }
            }
        };
        test("pass_rate", self.pass_rate, guardrails.min_pass_rate);
        test("avg_score", self.avg_score, guardrails.min_avg_score);
        violations
    }
}

/// Static thresholds for `report`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Guardrails {
    pub min_pass_rate: Option<f64>,
    pub min_avg_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuardrailViolation {
    pub metric: String,
    pub actual: Option<f64>,
    pub threshold: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LoopConfig, TracePaths};
    use crate::orchestration::executor::{ExecutionOutput, ExecutionRequest};
    use crate::types::Telemetry;
    use tempfile::TempDir;

    fn engine(dir: &TempDir) -> MetaLoop {
        let paths = TracePaths {
            config: dir.path().join("cfg.json"),
            state: dir.path().join("state.json"),
            receipts: dir.path().join("receipts.jsonl"),
        };
        MetaLoop::new(LoopConfig::default(), &paths).unwrap()
    }

    fn alternating() -> impl FnMut(&ExecutionRequest<'_>) -> anyhow::Result<ExecutionOutput> {
        let mut round = 0u32;
        move |_req: &ExecutionRequest<'_>| {
            round += 1;
            let mut telemetry = Telemetry::new();
            telemetry.insert("pass".to_string(), f64::from(round % 2));
            Ok(ExecutionOutput {
                telemetry,
                artifact: serde_json::Value::Null,
            })
        }
    }

    #[test]
    fn test_status_of_cold_loop() {
        let dir = TempDir::new().unwrap();
        let status = StatusReport::collect(&engine(&dir)).unwrap();
        assert_eq!(status.rounds, 0);
        assert!(status.rubric_accepted);
        assert_eq!(status.recent_pass_rate, None);
        let plan = &status.dimensions["plan"];
        assert_eq!(plan.t, 0);
        assert_eq!(plan.arms.len(), 3);
        assert!(plan.arms.iter().all(|a| a.ucb.is_none()));
    }

    #[test]
    fn test_status_after_rounds() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let mut exec = alternating();
        for _ in 0..4 {
            engine.run_round("t", &mut exec).unwrap();
        }

        let status = StatusReport::collect(&engine).unwrap();
        assert_eq!(status.rounds, 4);
        assert_eq!(status.recent_pass_rate, Some(0.5));
        assert_eq!(status.dimensions["plan"].t, 4);
        assert!(status.dimensions["plan"].arms.iter().all(|a| a.ucb.is_some()));
        assert!(!status.top_pairs.is_empty());
    }

    #[test]
    fn test_rollup_and_guardrails() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let mut exec = alternating();
        for _ in 0..4 {
            engine.run_round("t", &mut exec).unwrap();
        }

        let records = engine.receipts().read_all().unwrap();
        let rollup = ReceiptRollup::from_records(&records);
        assert_eq!(rollup.rounds, 4);
        assert_eq!(rollup.adaptations, 0);
        assert_eq!(rollup.pass_rate, Some(0.5));
        assert_eq!(rollup.fallback_rounds, 0);
        let plan_rounds: u64 = rollup.arms["plan"].iter().map(|a| a.rounds).sum();
        assert_eq!(plan_rounds, 4);
        assert!(rollup.first_ts <= rollup.last_ts);

        let ok = Guardrails {
            min_pass_rate: Some(0.5),
            min_avg_score: None,
        };
        assert!(rollup.check(&ok).is_empty());

        let strict = Guardrails {
            min_pass_rate: Some(0.9),
            min_avg_score: Some(10.0),
        };
        let violations = rollup.check(&strict);
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].metric, "pass_rate");
    }

    #[test]
    fn test_empty_log_fails_any_guardrail() {
        let rollup = ReceiptRollup::from_records(&[]);
        assert_eq!(rollup.pass_rate, None);
        assert!(rollup.check(&Guardrails::default()).is_empty());
        let v = rollup.check(&Guardrails {
            min_pass_rate: Some(0.1),
            min_avg_score: None,
        });
        assert_eq!(v[0].actual, None);
    }
}
