//! Error types for the metaloop tuning engine
//!
//! This module provides structured error definitions using thiserror. Only
//! [`MetaLoopError::Config`] and [`MetaLoopError::Executor`] abort a round;
//! the component errors below are degraded into fallbacks by their callers.

use thiserror::Error;

/// Main error type for metaloop operations
#[derive(Error, Debug)]
pub enum MetaLoopError {
    /// Configuration document could not be loaded or failed validation
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Rubric expression rejected at construction
    #[error("Rubric error: {0}")]
    Rubric(#[from] RubricError),

    /// Rubric evaluation failed at runtime
    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    /// Persisted state could not be read or written
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// The external task executor failed; carried through unmodified
    #[error("Executor error: {0}")]
    Executor(anyhow::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Malformed configuration document
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The document could not be read or deserialized
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    /// The document parsed but violates a structural rule
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Rubric expression rejected at construction time
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RubricError {
    /// Syntax outside the literal/variable/arithmetic grammar
    #[error("unsupported construct in rubric: {0}")]
    UnsupportedConstruct(String),

    /// Variable is not one of the configured telemetry keys
    #[error("unknown variable '{0}' in rubric")]
    UnknownVariable(String),

    /// Expression is empty, truncated, or unbalanced
    #[error("malformed rubric: {0}")]
    Syntax(String),
}

/// Rubric evaluation failure for a single round
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("rubric produced a non-finite value ({0})")]
    NonFinite(f64),
}

/// Persisted state could not be read or written
#[derive(Error, Debug)]
pub enum StateError {
    #[error("state file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("state document is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Result type alias for metaloop operations
pub type Result<T> = std::result::Result<T, MetaLoopError>;
