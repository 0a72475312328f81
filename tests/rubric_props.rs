//! Property tests for the rubric sandbox.

use metaloop_core::error::RubricError;
use metaloop_core::evaluation::{RubricExpression, Scorer, ScoreSource};
use metaloop_core::Telemetry;
use proptest::prelude::*;

const KEYS: [&str; 4] = ["pass", "cost", "time", "mdl"];

fn telemetry(pass: f64, cost: f64, time: f64, mdl: f64) -> Telemetry {
    KEYS.iter()
        .zip([pass, cost, time, mdl])
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

proptest! {
    /// Linear rubrics evaluate to the same value as direct arithmetic.
    #[test]
    fn linear_rubric_matches_arithmetic(
        a in -10.0f64..10.0,
        b in -10.0f64..10.0,
        pass in 0.0f64..1.0,
        time in 0.0f64..100.0,
    ) {
        let expr = format!("{a:.3}*pass - ({b:.3})*time");
        let rubric = RubricExpression::validate(&expr, KEYS).unwrap();
        let got = rubric.evaluate(&telemetry(pass, 0.0, time, 0.0)).unwrap();
        let a: f64 = format!("{a:.3}").parse().unwrap();
        let b: f64 = format!("{b:.3}").parse().unwrap();
        prop_assert!((got - (a * pass - b * time)).abs() < 1e-9);
    }

    /// Any identifier applied as a function is rejected before evaluation.
    #[test]
    fn calls_are_always_rejected(name in "[a-z_][a-z0-9_]{0,8}") {
        let expr = format!("{name}(pass)");
        let err = RubricExpression::validate(&expr, KEYS).unwrap_err();
        prop_assert!(matches!(err, RubricError::UnsupportedConstruct(_)), "{} -> {:?}", expr, err);
    }

    /// Attribute access on an allowed variable is rejected.
    #[test]
    fn attribute_access_is_rejected(attr in "[a-z_]{1,10}") {
        let expr = format!("pass.{attr}");
        prop_assert!(RubricExpression::validate(&expr, KEYS).is_err());
    }

    /// Arbitrary input never panics the parser, and scoring always yields a
    /// finite value.
    #[test]
    fn arbitrary_input_is_total(src in "[ -~]{0,40}", pass in 0.0f64..1.0) {
        let _ = RubricExpression::validate(&src, KEYS);
        let score = Scorer::new(&src, KEYS).score(&telemetry(pass, 0.1, 0.2, 0.3));
        prop_assert!(score.value.is_finite());
    }

    /// Infinite, NaN, and extreme telemetry still scores finite, whether the
    /// rubric or the fallback produces the value.
    #[test]
    fn non_finite_telemetry_scores_finite(
        rubric in prop::sample::select(vec!["2*pass - 0.1*time - 0.05*cost - 0.01*mdl", "pass / cost", "time ** mdl", ""]),
        values in prop::array::uniform4(prop_oneof![
            Just(f64::INFINITY),
            Just(f64::NEG_INFINITY),
            Just(f64::NAN),
            Just(f64::MAX),
            Just(-f64::MAX),
            any::<f64>(),
        ]),
    ) {
        let [pass, cost, time, mdl] = values;
        let score = Scorer::new(rubric, KEYS).score(&telemetry(pass, cost, time, mdl));
        prop_assert!(score.value.is_finite(), "{} -> {:?}", rubric, score);
    }
}

#[test]
fn test_unknown_variable_is_reported_at_construction() {
    let err = RubricExpression::validate("2*pass - latency", KEYS).unwrap_err();
    assert_eq!(err, RubricError::UnknownVariable("latency".to_string()));

    let scorer = Scorer::new("2*pass - latency", KEYS);
    assert!(scorer.rubric().is_none());
    let score = scorer.score(&telemetry(1.0, 1.0, 2.0, 5.0));
    assert!(matches!(score.source, ScoreSource::Fallback { .. }));
    assert!((score.value - 1.45).abs() < 1e-12);
}
