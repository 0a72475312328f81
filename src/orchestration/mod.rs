//! Round orchestration
//!
//! - **Executor**: the pluggable task backend and its simulated stand-in
//! - **Engine**: the per-invocation [`MetaLoop`] context that runs one round
//! - **Report**: status and receipt rollups for the CLI

pub mod engine;
pub mod executor;
pub mod report;

pub use engine::{MetaLoop, RoundReport};
pub use executor::{ExecutionOutput, ExecutionRequest, SimulatedExecutor, TaskExecutor};
pub use report::{
    ArmRollup, ArmStatus, DimensionStatus, GuardrailViolation, Guardrails, ReceiptRollup,
    StatusReport,
};
