//! One tuning round, end to end.
//!
//! ```text
//! LOAD → SELECT (per dimension) → EXECUTE → SCORE → UPDATE SELECTORS
//!      → UPDATE STATS → CHECK PLATEAU → [ADAPT] → PERSIST → RECEIPT
//! ```
//!
//! [`MetaLoop`] is the per-invocation context: it owns the validated
//! configuration, the compiled scorer, and the file handles. Every round
//! rebuilds the selectors and aggregator from the persisted document, so
//! nothing survives in memory between calls.
//!
//! Only the executor can abort a round. When it fails, the round returns
//! [`MetaLoopError::Executor`] before anything is persisted or logged.

use crate::config::{LoopConfig, TracePaths};
use crate::error::{MetaLoopError, Result};
use crate::evaluation::{
    PlateauDetector, PlateauPolicy, PolicyAdapter, Scorer, StatisticsAggregator, UcbSelector,
};
use crate::orchestration::executor::{ExecutionRequest, TaskExecutor};
use crate::storage::{
    AdaptationReceipt, AdaptationRecord, PersistedState, ReceiptLog, RoundReceipt, StateStore,
};
use crate::types::{now, outcome_of, retain_finite, SelectedArm};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Receipts produced by a round
#[derive(Debug, Clone)]
pub struct RoundReport {
    pub receipt: RoundReceipt,
    pub adaptation: Option<AdaptationReceipt>,
}

/// Tuning loop context
#[derive(Debug, Clone)]
pub struct MetaLoop {
    config: LoopConfig,
    scorer: Scorer,
    store: StateStore,
    receipts: ReceiptLog,
}

impl MetaLoop {
    /// Build a context from an already loaded configuration.
    pub fn new(config: LoopConfig, paths: &TracePaths) -> Result<Self> {
        config.validate()?;
        let scorer = Scorer::new(&config.rubric, &config.telemetry);
        Ok(Self {
            config,
            scorer,
            store: StateStore::new(&paths.state),
            receipts: ReceiptLog::new(&paths.receipts),
        })
    }

    /// Load the configuration at `paths.config` and build a context.
    pub fn from_paths(paths: &TracePaths) -> Result<Self> {
        let config = LoopConfig::load(&paths.config)?;
        Self::new(config, paths)
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn receipts(&self) -> &ReceiptLog {
        &self.receipts
    }

    /// Policy in force: bounds and window from the configuration, the
    /// adapted knobs from the persisted state.
    pub fn current_policy(&self, state: &PersistedState) -> PlateauPolicy {
        let mut policy = self.config.plateau_policy();
        if let Some(adapted) = &state.policy {
            policy.branch_count = adapted.branch_count;
            policy.explore_budget = adapted.explore_budget;
        }
        policy
    }

    /// Run exactly one round against `executor`.
    pub fn run_round<E>(&self, task: &str, executor: &mut E) -> Result<RoundReport>
    where
        E: TaskExecutor + ?Sized,
    {
        let started = Instant::now();
        let run_id = new_run_id();
        let mut state = self.store.load();
        let mut policy = self.current_policy(&state);

        let mut selectors = Vec::with_capacity(self.config.arm_sets.len());
        let mut selected = Vec::with_capacity(self.config.arm_sets.len());
        for set in &self.config.arm_sets {
            let seed = state.dimensions.get(&set.dimension);
            let mut selector = UcbSelector::new(set.arms.iter().map(|a| a.id.clone()), seed)?;
            let index = selector.pick();
            debug!("[{}] {} -> {}", run_id, set.dimension, set.arms[index].id);
            selected.push(SelectedArm {
                dimension: set.dimension.clone(),
                index,
                arm: set.arms[index].clone(),
            });
            selectors.push(selector);
        }

        let request = ExecutionRequest {
            task,
            arms: &selected,
            policy: &policy,
        };
        let mut output = executor.execute(&request).map_err(MetaLoopError::Executor)?;
        let dropped = retain_finite(&mut output.telemetry);
        if !dropped.is_empty() {
            warn!(
                "[{}] Dropping non-finite telemetry: {}",
                run_id,
                dropped.join(", ")
            );
        }

        let score = self.scorer.score(&output.telemetry);
        for (selector, choice) in selectors.iter_mut().zip(&selected) {
            selector.update(choice.index, score.value);
        }

        let mut aggregator =
            StatisticsAggregator::new(self.config.telemetry.clone(), std::mem::take(&mut state.stats));
        aggregator.record_round(&selected, score.value, &output.telemetry);
        let feedback = aggregator.feedback(&selected);

        let ts = now();
        let outcome = outcome_of(&output.telemetry);
        let mut adaptation = None;
        if self.config.tracks_pass() {
            state.outcomes.push(outcome);
            let detector = PlateauDetector::from_policy(&policy);
            if let Some((earlier, later)) = detector.window_means(&state.outcomes) {
                if detector.check(&state.outcomes) {
                    let proposal = executor.propose_adaptation(&policy, &state.outcomes);
                    let next = PolicyAdapter::adapt(&policy, proposal);
                    let changed = next != policy;
                    info!(
                        "Plateau detected ({:.3} -> {:.3}); branches {} -> {}, explore {} -> {}",
                        earlier,
                        later,
                        policy.branch_count,
                        next.branch_count,
                        policy.explore_budget,
                        next.explore_budget
                    );
                    adaptation = Some(AdaptationReceipt {
                        run_id: run_id.clone(),
                        ts,
                        adapt: AdaptationRecord {
                            proposal,
                            previous: policy.clone(),
                            policy: next.clone(),
                            earlier_mean: earlier,
                            later_mean: later,
                            changed,
                        },
                    });
                    policy = next;
                    state.last_adapt = Some(ts);
                }
            }
            detector.retain_recent(&mut state.outcomes);
        }

        state.dimensions = self
            .config
            .arm_sets
            .iter()
            .zip(&selectors)
            .map(|(set, selector)| (set.dimension.clone(), selector.snapshot()))
            .collect();
        state.stats = aggregator.into_state();
        state.policy = Some(policy.clone());
        state.rounds += 1;
        state.rubric = Some(self.config.rubric.clone());
        state.ts = Some(ts);
        self.store.save(&state);

        let receipt = RoundReceipt {
            run_id,
            ts,
            task: task.to_string(),
            selected: selected
                .iter()
                .map(|s| (s.dimension.clone(), s.id().to_string()))
                .collect::<BTreeMap<_, _>>(),
            arms: selected,
            telemetry: output.telemetry,
            score: score.value,
            score_source: score.source,
            outcome,
            artifact: output.artifact,
            policy,
            state: state.dimensions,
            feedback,
            latency_s: started.elapsed().as_secs_f64(),
        };
        self.receipts.append_or_warn(&receipt);
        if let Some(adapt) = &adaptation {
            self.receipts.append_or_warn(adapt);
        }

        info!(
            "[{}] round {} scored {:.3} ({})",
            receipt.run_id,
            state.rounds,
            receipt.score,
            receipt
                .arms
                .iter()
                .map(SelectedArm::id)
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(RoundReport {
            receipt,
            adaptation,
        })
    }
}

/// First eight hex digits of a v4 UUID
fn new_run_id() -> String {
    Uuid::new_v4().simple().to_string().chars().take(8).collect()
}
