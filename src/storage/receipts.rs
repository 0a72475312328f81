//! Append-only JSONL receipt log.
//!
//! One JSON object per line. Round receipts and adaptation receipts share
//! the file; readers tell them apart by shape (adaptation receipts carry an
//! `adapt` object and no `task`).

use crate::error::{MetaLoopError, Result};
use crate::evaluation::{
    AdaptationProposal, DimensionState, FeedbackSummary, PlateauPolicy, ScoreSource,
};
use crate::types::{SelectedArm, Telemetry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Audit record of one completed round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundReceipt {
    pub run_id: String,
    pub ts: DateTime<Utc>,
    pub task: String,

    /// dimension → chosen arm id
    pub selected: BTreeMap<String, String>,
    pub arms: Vec<SelectedArm>,
    pub telemetry: Telemetry,
    pub score: f64,
    pub score_source: ScoreSource,
    pub outcome: u8,
    pub artifact: Value,
    pub policy: PlateauPolicy,

    /// Selector snapshot after the update
    pub state: BTreeMap<String, DimensionState>,
    pub feedback: FeedbackSummary,
    pub latency_s: f64,
}

/// What a plateau trigger did to the policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptationRecord {
    pub proposal: AdaptationProposal,
    pub previous: PlateauPolicy,
    pub policy: PlateauPolicy,
    pub earlier_mean: f64,
    pub later_mean: f64,
    pub changed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptationReceipt {
    pub run_id: String,
    pub ts: DateTime<Utc>,
    pub adapt: AdaptationRecord,
}

/// Any line of the receipt log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReceiptRecord {
    Adaptation(AdaptationReceipt),
    Round(Box<RoundReceipt>),
}

/// Handle on a receipt file
#[derive(Debug, Clone)]
pub struct ReceiptLog {
    path: PathBuf,
}

impl ReceiptLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single line, creating the file and its parent
    /// directory on first use.
    pub fn append<T: Serialize>(&self, record: &T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        debug!("Appended receipt to {}", self.path.display());
        Ok(())
    }

    /// Append, logging instead of failing. The round already happened and
    /// its state is persisted, so a lost receipt only costs auditability.
    pub fn append_or_warn<T: Serialize>(&self, record: &T) -> bool {
        match self.append(record) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Failed to append receipt to {}: {}",
                    self.path.display(),
                    e
                );
                false
            }
        }
    }

    /// Read every well-formed record. Lines that do not parse are skipped
    /// with a warning; a missing file reads as empty.
    pub fn read_all(&self) -> Result<Vec<ReceiptRecord>> {
        let file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(MetaLoopError::Io(e)),
        };

        let mut records = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ReceiptRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    "Skipping malformed receipt at {}:{}: {}",
                    self.path.display(),
                    lineno + 1,
                    e
                ),
            }
        }
        Ok(records)
    }
}
