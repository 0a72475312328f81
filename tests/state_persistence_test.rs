//! Persistence behavior of the state document

mod common;

use common::{default_engine, plan_oracle, temp_paths};
use metaloop_core::evaluation::{ArmState, DimensionState};
use metaloop_core::{PersistedState, StateStore};
use proptest::prelude::*;
use serial_test::serial;
use std::collections::BTreeMap;
use std::fs;
use tempfile::TempDir;

fn arm_state() -> impl Strategy<Value = ArmState> {
    ("[a-z]{1,6}", 0u64..1000, any::<f64>().prop_filter("finite", |v| v.is_finite()))
        .prop_map(|(id, count, value)| ArmState {
            id: Some(id),
            count,
            value,
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Saved selector state loads back bit-for-bit.
    #[test]
    fn selector_state_round_trips(
        t in 0u64..10_000,
        arms in prop::collection::vec(arm_state(), 0..6),
        outcomes in prop::collection::vec(0u8..=1, 0..20),
    ) {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));

        let mut dimensions = BTreeMap::new();
        dimensions.insert("plan".to_string(), DimensionState { t, arms });
        let state = PersistedState {
            dimensions,
            outcomes,
            ..PersistedState::default()
        };

        store.save(&state);
        prop_assert_eq!(store.load(), state);
    }
}

#[test]
fn test_state_written_by_rounds_round_trips() {
    let dir = TempDir::new().unwrap();
    let engine = default_engine(&dir);
    let mut exec = plan_oracle("two_step");
    for _ in 0..7 {
        engine.run_round("task", &mut exec).unwrap();
    }

    let loaded = engine.store().load();
    let again = TempDir::new().unwrap();
    let copy = StateStore::new(again.path().join("copy.json"));
    copy.save(&loaded);
    assert_eq!(copy.load(), loaded);
    assert_eq!(loaded.stats.pairs.len(), loaded.stats.pairs.iter().map(|p| &p.id).collect::<std::collections::BTreeSet<_>>().len());
}

#[test]
fn test_truncated_and_missing_match_fresh_default() {
    let dir = TempDir::new().unwrap();
    let paths = temp_paths(&dir);
    let engine = default_engine(&dir);
    engine.run_round("task", &mut plan_oracle("direct")).unwrap();

    let full = fs::read_to_string(&paths.state).unwrap();
    for cut in [0, 1, full.len() / 3, full.len() - 1] {
        fs::write(&paths.state, &full[..cut]).unwrap();
        assert_eq!(engine.store().load(), PersistedState::default(), "cut at {cut}");
    }

    fs::remove_file(&paths.state).unwrap();
    assert_eq!(engine.store().load(), PersistedState::default());
}

#[test]
fn test_legacy_short_keys_are_accepted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    fs::write(
        &path,
        r#"{"dimensions": {"plan": {"t": 4, "arms": [{"c": 3, "v": 1.5}, {"c": 1, "v": -0.5}]}}}"#,
    )
    .unwrap();

    let state = StateStore::new(&path).load();
    let plan = &state.dimensions["plan"];
    assert_eq!(plan.t, 4);
    assert_eq!(plan.arms[0].count, 3);
    assert_eq!(plan.arms[1].value, -0.5);
    assert_eq!(plan.arms[0].id, None);
}

#[test]
#[serial]
fn test_env_paths_are_honored() {
    let dir = TempDir::new().unwrap();
    let state = dir.path().join("custom").join("state.json");
    std::env::set_var("METALOOP_STATE", &state);
    std::env::set_var("METALOOP_RECEIPTS", dir.path().join("custom").join("r.jsonl"));
    std::env::set_var("METALOOP_CFG", dir.path().join("absent.json"));

    let paths = metaloop_core::TracePaths::from_env();
    let result = metaloop_core::MetaLoop::from_paths(&paths)
        .and_then(|engine| engine.run_round("task", &mut plan_oracle("direct")));

    std::env::remove_var("METALOOP_STATE");
    std::env::remove_var("METALOOP_RECEIPTS");
    std::env::remove_var("METALOOP_CFG");

    result.unwrap();
    assert!(state.exists());
    assert!(dir.path().join("custom").join("r.jsonl").exists());
}
