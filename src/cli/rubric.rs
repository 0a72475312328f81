//! Rubric validation command

use metaloop_core::evaluation::RubricExpression;
use metaloop_core::{LoopConfig, Result, TracePaths};
use serde_json::{json, Value};

use super::helpers::{parse_telemetry, print_json};

/// Validate `expression` against the configured telemetry keys and, when
/// values are given, evaluate it.
pub fn handle(paths: &TracePaths, expression: &str, assignments: &[String]) -> anyhow::Result<()> {
    let config = LoopConfig::load(&paths.config)?;
    let summary = check(expression, &config.telemetry, assignments)?;
    print_json(&summary, false)
}

fn check(expression: &str, allowed: &[String], assignments: &[String]) -> Result<Value> {
    let rubric = RubricExpression::validate(expression, allowed)?;

    let value = if assignments.is_empty() {
        None
    } else {
        let telemetry = parse_telemetry(assignments)?;
        Some(rubric.evaluate(&telemetry)?)
    };

    Ok(json!({
        "rubric": rubric.source(),
        "variables": rubric.variables(),
        "value": value,
    }))
}
