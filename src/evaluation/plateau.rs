//! Plateau detection and bounded policy adaptation.
//!
//! The detector compares the pass rate of the most recent `window` rounds
//! with the `window` rounds before them. When improvement falls below
//! `delta` the adapter moves `branch_count` by one and `explore_budget` by
//! 0.05, in the directions proposed by the executor, and clamps both to
//! their bounds. One bounded step per trigger keeps the loop from
//! oscillating.

use serde::{Deserialize, Serialize};

pub const EXPLORE_STEP: f64 = 0.05;
pub const EXPLORE_MIN: f64 = 0.05;
pub const EXPLORE_MAX: f64 = 0.5;

/// Exploration parameters handed to the executor each round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateauPolicy {
    pub explore_budget: f64,
    pub branch_count: u32,
    pub plateau_window: usize,
    pub plateau_delta: f64,
    pub min_branches: u32,
    pub max_branches: u32,
}

impl Default for PlateauPolicy {
    fn default() -> Self {
        Self {
            explore_budget: 0.15,
            branch_count: 3,
            plateau_window: 50,
            plateau_delta: 0.01,
            min_branches: 2,
            max_branches: 6,
        }
    }
}

/// Sign of a proposed nudge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Hold,
}

impl Direction {
    fn sign(self) -> i64 {
        match self {
            Direction::Up => 1,
            Direction::Down => -1,
            Direction::Hold => 0,
        }
    }
}

/// Directions supplied by the executor's meta-reasoning step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdaptationProposal {
    pub branches: Direction,
    pub explore: Direction,
}

impl Default for AdaptationProposal {
    /// Stalled progress widens the search.
    fn default() -> Self {
        Self {
            branches: Direction::Up,
            explore: Direction::Up,
        }
    }
}

/// Windowed stall detector over 0/1 outcomes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlateauDetector {
    window: usize,
    delta: f64,
}

impl PlateauDetector {
    pub fn new(window: usize, delta: f64) -> Self {
        Self { window, delta }
    }

    pub fn from_policy(policy: &PlateauPolicy) -> Self {
        Self::new(policy.plateau_window, policy.plateau_delta)
    }

    /// Means of the earlier and later windows, once enough history exists.
    pub fn window_means(&self, outcomes: &[u8]) -> Option<(f64, f64)> {
        let w = self.window;
        let span = w.checked_mul(2)?;
        if w == 0 || outcomes.len() < span {
            return None;
        }
        let tail = &outcomes[outcomes.len() - span..];
        let mean = |xs: &[u8]| xs.iter().map(|&x| f64::from(x)).sum::<f64>() / w as f64;
        Some((mean(&tail[..w]), mean(&tail[w..])))
    }

    /// True when the later window improved on the earlier one by less than `delta`.
    pub fn check(&self, outcomes: &[u8]) -> bool {
        match self.window_means(outcomes) {
            Some((earlier, later)) => later - earlier < self.delta,
            None => false,
        }
    }

    /// Drop history the detector can no longer look at.
    pub fn retain_recent(&self, outcomes: &mut Vec<u8>) {
        let keep = self.window.max(1).saturating_mul(2);
        if outcomes.len() > keep {
            outcomes.drain(..outcomes.len() - keep);
        }
    }
}

pub struct PolicyAdapter;

impl PolicyAdapter {
    /// Apply one bounded step.
    ///
    /// Each parameter is nudged first and clamped second, so a policy that
    /// starts outside its bounds is pulled back inside regardless of the
    /// proposed direction.
    pub fn adapt(policy: &PlateauPolicy, proposal: AdaptationProposal) -> PlateauPolicy {
        let lo = i64::from(policy.min_branches);
        let hi = i64::from(policy.max_branches).max(lo);
        let branches = (i64::from(policy.branch_count) + proposal.branches.sign()).clamp(lo, hi);

        let nudged = policy.explore_budget + proposal.explore.sign() as f64 * EXPLORE_STEP;
        // two decimals keeps repeated nudges from drifting (0.15 + 0.05 = 0.2)
        let explore = ((nudged * 100.0).round() / 100.0).clamp(EXPLORE_MIN, EXPLORE_MAX);

        PlateauPolicy {
            branch_count: u32::try_from(branches).unwrap_or(policy.min_branches),
            explore_budget: explore,
            ..policy.clone()
        }
    }
}
