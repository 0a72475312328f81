//! UCB1 arm selection for one selection dimension.
//!
//! Notes:
//! - Selection is **deterministic**: the same snapshot and the same rewards
//!   always produce the same picks.
//! - Every arm is tried once (lowest index first) before the confidence bound
//!   is used, which also sidesteps `ln(0)` and division by zero.
//! - Rewards are unclamped; negative rubric scores are fine.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One arm's running estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arm {
    pub id: String,
    pub trial_count: u64,
    pub value_estimate: f64,
}

impl Arm {
    fn cold(id: String) -> Self {
        Self {
            id,
            trial_count: 0,
            value_estimate: 0.0,
        }
    }
}

/// Persisted arm entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(alias = "c")]
    pub count: u64,
    #[serde(alias = "v")]
    pub value: f64,
}

/// Persisted selector state for one dimension
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DimensionState {
    #[serde(default)]
    pub t: u64,
    #[serde(default)]
    pub arms: Vec<ArmState>,
}

/// UCB1 selector over an ordered arm set
#[derive(Debug, Clone)]
pub struct UcbSelector {
    arms: Vec<Arm>,
    t: u64,
}

impl UcbSelector {
    /// Build a selector for `arm_ids`, optionally seeded from a snapshot.
    ///
    /// Persisted arms are matched by id when the snapshot carries ids and by
    /// position otherwise. Persisted arms that no longer exist are dropped;
    /// new arms start cold.
    pub fn new<I, S>(arm_ids: I, seed: Option<&DimensionState>) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut arms: Vec<Arm> = arm_ids.into_iter().map(|id| Arm::cold(id.into())).collect();
        if arms.is_empty() {
            return Err(ConfigError::Invalid(
                "a selector needs at least one arm".to_string(),
            ));
        }

        let mut t = 0;
        if let Some(seed) = seed {
            for (i, persisted) in seed.arms.iter().enumerate() {
                let target = match &persisted.id {
                    Some(id) => arms.iter_mut().find(|a| &a.id == id),
                    None => arms.get_mut(i),
                };
                if let Some(arm) = target {
                    arm.trial_count = persisted.count;
                    arm.value_estimate = persisted.value;
                }
            }
            let total: u64 = arms.iter().map(|a| a.trial_count).sum();
            t = seed.t.max(total);
        }

        Ok(Self { arms, t })
    }

    /// Selector over `n` anonymous arms named `arm_0..arm_{n-1}`.
    pub fn with_arm_count(n: usize) -> Result<Self, ConfigError> {
        Self::new((0..n).map(|i| format!("arm_{i}")), None)
    }

    pub fn arms(&self) -> &[Arm] {
        &self.arms
    }

    pub fn t(&self) -> u64 {
        self.t
    }

    /// Choose the next arm index and count the pick.
    pub fn pick(&mut self) -> usize {
        self.t += 1;

        if let Some(cold) = self.arms.iter().position(|a| a.trial_count == 0) {
            return cold;
        }

        let ln_t = (self.t as f64).ln();
        let mut best = 0;
        let mut best_score = f64::NEG_INFINITY;
        for (i, arm) in self.arms.iter().enumerate() {
            let score = ucb_score(arm, ln_t);
            // strict comparison keeps ties on the lowest index
            if score > best_score {
                best = i;
                best_score = score;
            }
        }
        best
    }

    /// Fold `reward` into the chosen arm's incremental mean.
    pub fn update(&mut self, index: usize, reward: f64) {
        let Some(arm) = self.arms.get_mut(index) else {
            warn!(
                "Ignoring update for arm index {} (selector has {} arms)",
                index,
                self.arms.len()
            );
            return;
        };
        arm.trial_count += 1;
        arm.value_estimate += (reward - arm.value_estimate) / arm.trial_count as f64;
    }

    /// Current confidence bounds; untried arms report `+inf`.
    pub fn ucb_scores(&self) -> Vec<f64> {
        let ln_t = (self.t.max(1) as f64).ln();
        self.arms
            .iter()
            .map(|arm| {
                if arm.trial_count == 0 {
                    f64::INFINITY
                } else {
                    ucb_score(arm, ln_t)
                }
            })
            .collect()
    }

    pub fn snapshot(&self) -> DimensionState {
        DimensionState {
            t: self.t,
            arms: self
                .arms
                .iter()
                .map(|a| ArmState {
                    id: Some(a.id.clone()),
                    count: a.trial_count,
                    value: a.value_estimate,
                })
                .collect(),
        }
    }
}

fn ucb_score(arm: &Arm, ln_t: f64) -> f64 {
    arm.value_estimate + (2.0 * ln_t / arm.trial_count as f64).sqrt()
}
