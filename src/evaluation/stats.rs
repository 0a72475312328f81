//! Running statistics per arm and per arm pair.
//!
//! These buckets are reporting-only: they feed receipts and the `status`
//! command and never influence which arm is picked.

use crate::types::{now, pair_key, SelectedArm, Telemetry, PASS_KEY};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Online aggregate for one bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningStat {
    pub id: String,
    pub count: u64,
    pub avg_score: f64,
    pub pass_rate: f64,
    #[serde(default)]
    pub last_score: f64,
    #[serde(default)]
    pub last_telemetry: Telemetry,
    #[serde(default)]
    pub last_timestamp: Option<DateTime<Utc>>,

    /// `avg_<metric>` means for every tracked metric other than `pass`
    #[serde(flatten)]
    pub metric_means: BTreeMap<String, f64>,
}

impl RunningStat {
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            count: 0,
            avg_score: 0.0,
            pass_rate: 0.0,
            last_score: 0.0,
            last_telemetry: Telemetry::new(),
            last_timestamp: None,
            metric_means: BTreeMap::new(),
        }
    }

    pub fn metric_mean(&self, metric: &str) -> Option<f64> {
        self.metric_means.get(&format!("avg_{metric}")).copied()
    }

    fn bump(
        &mut self,
        score: f64,
        telemetry: &Telemetry,
        tracked: &[String],
        at: DateTime<Utc>,
    ) {
        self.count += 1;
        let n = self.count as f64;
        self.avg_score += (score - self.avg_score) / n;

        for key in tracked {
            if key == PASS_KEY {
                let pass = telemetry.get(PASS_KEY).copied().unwrap_or(0.0);
                self.pass_rate += (pass - self.pass_rate) / n;
            } else if let Some(v) = telemetry.get(key) {
                let mean = self.metric_means.entry(format!("avg_{key}")).or_insert(0.0);
                *mean += (v - *mean) / n;
            }
        }

        self.last_score = score;
        self.last_telemetry = telemetry.clone();
        self.last_timestamp = Some(at);
    }
}

/// Persisted statistics: per-dimension arm buckets and pair buckets.
///
/// Buckets are kept in insertion order so ranking ties stay stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsState {
    #[serde(default)]
    pub arms: BTreeMap<String, Vec<RunningStat>>,
    #[serde(default)]
    pub pairs: Vec<RunningStat>,
}

/// Identifies a statistics bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketKey {
    Arm { dimension: String, id: String },
    Pair(String),
}

/// A ranked section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section<'a> {
    Dimension(&'a str),
    Pairs,
}

/// Compact ranking row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub id: String,
    pub count: u64,
    pub avg_score: f64,
    pub pass_rate: f64,
}

impl From<&RunningStat> for FeedbackEntry {
    fn from(stat: &RunningStat) -> Self {
        Self {
            id: stat.id.clone(),
            count: stat.count,
            avg_score: stat.avg_score,
            pass_rate: stat.pass_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedFeedback {
    pub pair: String,
    pub snapshot: RunningStat,
}

/// Ranked view of all buckets attached to a round receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackSummary {
    pub dimensions: BTreeMap<String, Vec<FeedbackEntry>>,
    pub pairs: Vec<FeedbackEntry>,
    pub selected: SelectedFeedback,
}

/// Maintains the arm and pair buckets for one round
#[derive(Debug, Clone)]
pub struct StatisticsAggregator {
    state: StatsState,
    tracked: Vec<String>,
}

impl StatisticsAggregator {
    pub fn new(tracked: Vec<String>, seed: StatsState) -> Self {
        Self {
            state: seed,
            tracked,
        }
    }

    pub fn state(&self) -> &StatsState {
        &self.state
    }

    pub fn into_state(self) -> StatsState {
        self.state
    }

    /// Fold one sample into a bucket, creating the bucket if needed.
    pub fn record(&mut self, key: &BucketKey, score: f64, telemetry: &Telemetry) {
        self.record_at(key, score, telemetry, now());
    }

    fn record_at(&mut self, key: &BucketKey, score: f64, telemetry: &Telemetry, at: DateTime<Utc>) {
        let (bucket, id) = match key {
            BucketKey::Arm { dimension, id } => {
                (self.state.arms.entry(dimension.clone()).or_default(), id)
            }
            BucketKey::Pair(id) => (&mut self.state.pairs, id),
        };

        let idx = match bucket.iter().position(|s| &s.id == id) {
            Some(i) => i,
            None => {
                bucket.push(RunningStat::empty(id.clone()));
                bucket.len() - 1
            }
        };
        bucket[idx].bump(score, telemetry, &self.tracked, at);
    }

    /// Record one round: every selected arm plus, with two or more
    /// dimensions, the joint pair bucket.
    pub fn record_round(&mut self, selected: &[SelectedArm], score: f64, telemetry: &Telemetry) {
        let at = now();
        for s in selected {
            let key = BucketKey::Arm {
                dimension: s.dimension.clone(),
                id: s.id().to_string(),
            };
            self.record_at(&key, score, telemetry, at);
        }
        if selected.len() >= 2 {
            let ids: Vec<&str> = selected.iter().map(SelectedArm::id).collect();
            self.record_at(&BucketKey::Pair(pair_key(&ids)), score, telemetry, at);
        }
    }

    /// Bucket contents, or an empty stat if the bucket was never recorded.
    pub fn snapshot(&self, key: &BucketKey) -> RunningStat {
        let (bucket, id) = match key {
            BucketKey::Arm { dimension, id } => (self.state.arms.get(dimension), id),
            BucketKey::Pair(id) => (Some(&self.state.pairs), id),
        };
        bucket
            .and_then(|b| b.iter().find(|s| &s.id == id))
            .cloned()
            .unwrap_or_else(|| RunningStat::empty(id.clone()))
    }

    /// Top `n` buckets of a section by `avg_score`, ties in insertion order.
    pub fn top(&self, section: Section<'_>, n: usize) -> Vec<FeedbackEntry> {
        let bucket = match section {
            Section::Dimension(dim) => self.state.arms.get(dim).map(Vec::as_slice),
            Section::Pairs => Some(self.state.pairs.as_slice()),
        };
        let mut ranked: Vec<&RunningStat> = bucket.unwrap_or_default().iter().collect();
        ranked.sort_by(|a, b| b.avg_score.total_cmp(&a.avg_score));
        ranked.into_iter().take(n).map(FeedbackEntry::from).collect()
    }

    /// Full ranking of every section plus the selected pair's bucket.
    pub fn feedback(&self, selected: &[SelectedArm]) -> FeedbackSummary {
        let dimensions = self
            .state
            .arms
            .keys()
            .map(|dim| (dim.clone(), self.top(Section::Dimension(dim), usize::MAX)))
            .collect();

        let ids: Vec<&str> = selected.iter().map(SelectedArm::id).collect();
        let pair = pair_key(&ids);
        let snapshot = self.snapshot(&BucketKey::Pair(pair.clone()));

        FeedbackSummary {
            dimensions,
            pairs: self.top(Section::Pairs, usize::MAX),
            selected: SelectedFeedback { pair, snapshot },
        }
    }
}
