//! Core data types shared across the tuning loop
//!
//! - **Telemetry**: metric name → numeric value reported by the executor
//! - **ArmSpec**: one selectable option with free-form parameters
//! - **SelectedArm**: the arm a selector picked for one dimension in a round

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Telemetry mapping returned by the executor.
///
/// Ordered so receipts and persisted snapshots serialize deterministically.
pub type Telemetry = BTreeMap<String, f64>;

/// Telemetry key carrying the pass/fail outcome of a round.
pub const PASS_KEY: &str = "pass";

/// Separator between arm ids in a pair key (`two_step::base600`).
pub const PAIR_SEPARATOR: &str = "::";

/// One selectable option within a dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmSpec {
    pub id: String,

    /// Everything besides `id` is handed to the executor untouched
    #[serde(flatten)]
    pub parameters: Map<String, Value>,
}

impl ArmSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parameters: Map::new(),
        }
    }

    /// Builder-style parameter insertion
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Numeric parameter, if present and numeric
    pub fn param_f64(&self, key: &str) -> Option<f64> {
        self.parameters.get(key).and_then(Value::as_f64)
    }

    /// String parameter, if present and a string
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }
}

/// The arm chosen for one dimension in a round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedArm {
    pub dimension: String,
    pub index: usize,
    pub arm: ArmSpec,
}

impl SelectedArm {
    pub fn id(&self) -> &str {
        &self.arm.id
    }
}

/// Joint statistics key for the arms chosen in one round
pub fn pair_key<S: AsRef<str>>(ids: &[S]) -> String {
    ids.iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(PAIR_SEPARATOR)
}

/// Binary outcome of a round: 1 when the `pass` metric is at least 0.5
pub fn outcome_of(telemetry: &Telemetry) -> u8 {
    match telemetry.get(PASS_KEY) {
        Some(v) if *v >= 0.5 => 1,
        _ => 0,
    }
}

/// Remove non-finite values, returning the keys that were dropped.
///
/// JSON has no representation for NaN or infinities, so they must never
/// reach the selectors, the statistics, or the state document.
pub fn retain_finite(telemetry: &mut Telemetry) -> Vec<String> {
    let dropped: Vec<String> = telemetry
        .iter()
        .filter(|(_, v)| !v.is_finite())
        .map(|(k, _)| k.clone())
        .collect();
    for key in &dropped {
        telemetry.remove(key);
    }
    dropped
}

/// Current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arm_spec_flattens_parameters() {
        let arm = ArmSpec::new("base600")
            .with_param("model", "base")
            .with_param("chunk", 600);

        let json = serde_json::to_value(&arm).unwrap();
        assert_eq!(json["id"], "base600");
        assert_eq!(json["chunk"], 600);

        let back: ArmSpec = serde_json::from_value(json).unwrap();
        assert_eq!(back, arm);
        assert_eq!(back.param_f64("chunk"), Some(600.0));
        assert_eq!(back.param_str("model"), Some("base"));
        assert_eq!(back.param_str("chunk"), None);
    }

    #[test]
    fn test_pair_key() {
        assert_eq!(pair_key(&["two_step", "base600"]), "two_step::base600");
        assert_eq!(pair_key(&["solo"]), "solo");
    }

    #[test]
    fn test_outcome_of() {
        let mut t = Telemetry::new();
        assert_eq!(outcome_of(&t), 0);
        t.insert("pass".to_string(), 1.0);
        assert_eq!(outcome_of(&t), 1);
        t.insert("pass".to_string(), 0.0);
        assert_eq!(outcome_of(&t), 0);
    }

    #[test]
    fn test_retain_finite() {
        let mut t = Telemetry::new();
        t.insert("pass".to_string(), 1.0);
        t.insert("time".to_string(), f64::INFINITY);
        t.insert("cost".to_string(), f64::NAN);
        t.insert("mdl".to_string(), f64::NEG_INFINITY);

        let dropped = retain_finite(&mut t);
        assert_eq!(dropped, vec!["cost", "mdl", "time"]);
        assert_eq!(t.len(), 1);
        assert_eq!(t["pass"], 1.0);
    }
}
