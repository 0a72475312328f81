//! Executor boundary.
//!
//! The loop never runs a task itself. It hands the chosen arms to a
//! [`TaskExecutor`] and gets back telemetry plus an opaque artifact. Errors
//! cross this boundary as `anyhow::Error` and abort the round untouched.
//!
//! [`SimulatedExecutor`] is the placeholder used by the CLI: it fabricates
//! plausible telemetry from arm parameters so the loop can be exercised end
//! to end without a real backend.

use crate::evaluation::{AdaptationProposal, Direction, PlateauPolicy};
use crate::types::{SelectedArm, Telemetry, PASS_KEY};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Everything an executor needs for one round
#[derive(Debug, Clone, Copy)]
pub struct ExecutionRequest<'a> {
    pub task: &'a str,
    pub arms: &'a [SelectedArm],
    pub policy: &'a PlateauPolicy,
}

impl<'a> ExecutionRequest<'a> {
    /// The arm chosen for `dimension`, if that dimension exists
    pub fn arm(&self, dimension: &str) -> Option<&'a SelectedArm> {
        self.arms.iter().find(|a| a.dimension == dimension)
    }
}

/// Result of one successful execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    pub telemetry: Telemetry,
    pub artifact: Value,
}

/// Pluggable task backend
pub trait TaskExecutor {
    fn execute(&mut self, request: &ExecutionRequest<'_>) -> anyhow::Result<ExecutionOutput>;

    /// Directions for the next policy step, asked only when a plateau fires.
    ///
    /// The default widens the search on both axes.
    fn propose_adaptation(&mut self, _policy: &PlateauPolicy, _outcomes: &[u8]) -> AdaptationProposal {
        AdaptationProposal::default()
    }
}

impl<F> TaskExecutor for F
where
    F: FnMut(&ExecutionRequest<'_>) -> anyhow::Result<ExecutionOutput>,
{
    fn execute(&mut self, request: &ExecutionRequest<'_>) -> anyhow::Result<ExecutionOutput> {
        self(request)
    }
}

const BASE_PASS_P: f64 = 0.55;
const LARGE_CHUNK: f64 = 600.0;
const LARGE_CHUNK_BONUS: f64 = 0.05;
const MAX_PASS_P: f64 = 0.95;
const DEFAULT_CHUNK: f64 = 300.0;

/// Stand-in executor with synthetic telemetry.
///
/// Pass probability is `0.55 + Σ pass_bias + 0.05·[chunk ≥ 600]`, capped at
/// 0.95. Time grows with `chunk`, cost with the `base` model, and `mdl` with
/// artifact length. Adaptation proposals are coin flips per knob.
#[derive(Debug)]
pub struct SimulatedExecutor {
    rng: StdRng,
}

impl SimulatedExecutor {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Pass probability for a set of chosen arms
    pub fn pass_probability(arms: &[SelectedArm]) -> f64 {
        let bias: f64 = arms
            .iter()
            .filter_map(|a| a.arm.param_f64("pass_bias"))
            .sum();
        let chunk_bonus = if chunk_of(arms) >= LARGE_CHUNK {
            LARGE_CHUNK_BONUS
        } else {
            0.0
        };
        (BASE_PASS_P + bias + chunk_bonus).clamp(0.0, MAX_PASS_P)
    }
}

fn chunk_of(arms: &[SelectedArm]) -> f64 {
    arms.iter()
        .find_map(|a| a.arm.param_f64("chunk"))
        .unwrap_or(DEFAULT_CHUNK)
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

impl TaskExecutor for SimulatedExecutor {
    fn execute(&mut self, request: &ExecutionRequest<'_>) -> anyhow::Result<ExecutionOutput> {
        let mut artifact = String::new();
        for a in request.arms {
            artifact.push_str(&format!("{}[{}] ", a.dimension.to_uppercase(), a.id()));
        }
        artifact.push_str(&format!("TASK[{}]", request.task));

        let p = Self::pass_probability(request.arms);
        let pass = self.rng.gen::<f64>() < p;

        let chunk = chunk_of(request.arms);
        let uses_base = request
            .arms
            .iter()
            .any(|a| a.arm.param_str("model") == Some("base"));

        let mut telemetry = Telemetry::new();
        telemetry.insert(PASS_KEY.to_string(), if pass { 1.0 } else { 0.0 });
        telemetry.insert("time".to_string(), round3(0.05 + chunk / 3000.0));
        telemetry.insert(
            "cost".to_string(),
            round3(if uses_base { 0.15 } else { 0.1 }),
        );
        telemetry.insert(
            "mdl".to_string(),
            round3(artifact.chars().count() as f64 / 1000.0),
        );

        Ok(ExecutionOutput {
            telemetry,
            artifact: Value::String(artifact),
        })
    }

    fn propose_adaptation(&mut self, _policy: &PlateauPolicy, _outcomes: &[u8]) -> AdaptationProposal {
        AdaptationProposal {
            branches: self.coin_direction(),
            explore: self.coin_direction(),
        }
    }
}

impl SimulatedExecutor {
    fn coin_direction(&mut self) -> Direction {
        if self.rng.gen::<bool>() {
            Direction::Up
        } else {
            Direction::Down
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ArmSpec;

    fn arms() -> Vec<SelectedArm> {
        vec![
            SelectedArm {
                dimension: "plan".to_string(),
                index: 2,
                arm: ArmSpec::new("two_step").with_param("pass_bias", 0.1),
            },
            SelectedArm {
                dimension: "config".to_string(),
                index: 1,
                arm: ArmSpec::new("base600")
                    .with_param("model", "base")
                    .with_param("chunk", 600),
            },
        ]
    }

    #[test]
    fn test_pass_probability() {
        let p = SimulatedExecutor::pass_probability(&arms());
        assert!((p - 0.7).abs() < 1e-12);
        assert_eq!(SimulatedExecutor::pass_probability(&[]), BASE_PASS_P);
    }

    #[test]
    fn test_pass_probability_is_capped() {
        let greedy = vec![SelectedArm {
            dimension: "plan".to_string(),
            index: 0,
            arm: ArmSpec::new("cheat").with_param("pass_bias", 5.0),
        }];
        assert_eq!(SimulatedExecutor::pass_probability(&greedy), MAX_PASS_P);
    }

    #[test]
    fn test_simulated_telemetry() {
        let arms = arms();
        let policy = PlateauPolicy::default();
        let request = ExecutionRequest {
            task: "demo",
            arms: &arms,
            policy: &policy,
        };
        let out = SimulatedExecutor::seeded(7).execute(&request).unwrap();

        assert_eq!(out.artifact, Value::String("PLAN[two_step] CONFIG[base600] TASK[demo]".into()));
        assert_eq!(out.telemetry["time"], 0.25);
        assert_eq!(out.telemetry["cost"], 0.15);
        assert_eq!(out.telemetry["mdl"], 0.041);
        assert!(out.telemetry["pass"] == 0.0 || out.telemetry["pass"] == 1.0);
        assert_eq!(request.arm("config").map(SelectedArm::id), Some("base600"));
    }

    #[test]
    fn test_same_seed_same_outcomes() {
        let arms = arms();
        let policy = PlateauPolicy::default();
        let request = ExecutionRequest {
            task: "demo",
            arms: &arms,
            policy: &policy,
        };
        let mut a = SimulatedExecutor::seeded(42);
        let mut b = SimulatedExecutor::seeded(42);
        for _ in 0..20 {
            assert_eq!(a.execute(&request).unwrap(), b.execute(&request).unwrap());
        }
    }

    #[test]
    fn test_simulated_proposals_vary() {
        let policy = PlateauPolicy::default();
        let mut exec = SimulatedExecutor::seeded(3);
        let proposals: Vec<_> = (0..64)
            .map(|_| exec.propose_adaptation(&policy, &[0, 0, 0, 0]))
            .collect();

        for dir in [Direction::Up, Direction::Down] {
            assert!(proposals.iter().any(|p| p.branches == dir));
            assert!(proposals.iter().any(|p| p.explore == dir));
        }
        assert!(proposals
            .iter()
            .all(|p| p.branches != Direction::Hold && p.explore != Direction::Hold));

        let mut again = SimulatedExecutor::seeded(3);
        let replay: Vec<_> = (0..64)
            .map(|_| again.propose_adaptation(&policy, &[]))
            .collect();
        assert_eq!(proposals, replay);
    }

    #[test]
    fn test_closure_executor() {
        let mut exec = |_req: &ExecutionRequest<'_>| -> anyhow::Result<ExecutionOutput> {
            anyhow::bail!("backend unavailable")
        };
        let policy = PlateauPolicy::default();
        let request = ExecutionRequest {
            task: "demo",
            arms: &[],
            policy: &policy,
        };
        assert!(exec.execute(&request).is_err());
        assert_eq!(
            exec.propose_adaptation(&policy, &[]),
            AdaptationProposal::default()
        );
    }
}
