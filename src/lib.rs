//! Metaloop - adaptive plan/config tuning for a repeated external task
//!
//! Each invocation runs one round of an online-learning control loop:
//! - **UCB1 selection**: one independent bandit per selection dimension
//! - **Rubric scoring**: a sandboxed arithmetic formula over telemetry
//! - **Running statistics**: per-arm and per-pair means for reporting
//! - **Plateau adaptation**: bounded nudges to the exploration policy
//!
//! # Architecture
//!
//! - **Types**: telemetry, arm specs, selections
//! - **Evaluation**: rubric, bandit, statistics, plateau detection
//! - **Storage**: the persisted state document and the receipt log
//! - **Orchestration**: the executor boundary and the round engine
//!
//! # Example
//!
//! ```no_run
//! use metaloop_core::{LoopConfig, MetaLoop, SimulatedExecutor, TracePaths};
//!
//! fn main() -> anyhow::Result<()> {
//!     let paths = TracePaths::from_env();
//!     let engine = MetaLoop::new(LoopConfig::load(&paths.config)?, &paths)?;
//!
//!     let mut executor = SimulatedExecutor::seeded(7);
//!     let report = engine.run_round("summarize the changelog", &mut executor)?;
//!     println!("{}", serde_json::to_string(&report.receipt)?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod evaluation;
pub mod orchestration;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use config::{LoopConfig, TracePaths};
pub use error::{MetaLoopError, Result};
pub use evaluation::{PlateauPolicy, Scorer, UcbSelector};
pub use orchestration::{MetaLoop, RoundReport, SimulatedExecutor, TaskExecutor};
pub use storage::{PersistedState, ReceiptLog, StateStore};
pub use types::{ArmSpec, SelectedArm, Telemetry};
