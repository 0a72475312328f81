//! Scoring and online learning for the tuning loop.
//!
//! # Architecture
//!
//! - **Rubric**: sandboxed arithmetic over telemetry producing the round reward
//! - **Bandit**: one UCB1 selector per selection dimension
//! - **Stats**: reporting-only running means per arm and per arm pair
//! - **Plateau**: stall detection over pass/fail history and bounded policy steps
//!
//! Every component is a plain value reconstructed from the persisted state at
//! the start of a round and snapshotted back at the end; nothing here keeps
//! process-wide state.
//!
//! # Usage
//!
//! ```rust
//! use metaloop_core::evaluation::{Scorer, UcbSelector};
//! use metaloop_core::types::Telemetry;
//!
//! let scorer = Scorer::new("2*pass - 0.1*time", ["pass", "time"]);
//! let mut selector = UcbSelector::new(["direct", "two_step"], None).unwrap();
//!
//! let arm = selector.pick();
//! let mut telemetry = Telemetry::new();
//! telemetry.insert("pass".to_string(), 1.0);
//! telemetry.insert("time".to_string(), 0.5);
//! selector.update(arm, scorer.score(&telemetry).value);
//! ```

pub mod bandit;
pub mod plateau;
pub mod rubric;
pub mod stats;

pub use bandit::{Arm, ArmState, DimensionState, UcbSelector};
pub use plateau::{AdaptationProposal, Direction, PlateauDetector, PlateauPolicy, PolicyAdapter};
pub use rubric::{
    fallback_score, RubricExpression, Score, ScoreSource, Scorer, FALLBACK_RUBRIC,
};
pub use stats::{
    BucketKey, FeedbackEntry, FeedbackSummary, RunningStat, Section, StatisticsAggregator,
    StatsState,
};
