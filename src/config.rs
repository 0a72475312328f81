//! Configuration document and trace path resolution
//!
//! The configuration document is JSON, loaded through the `config` crate and
//! layered with `METALOOP_*` environment overrides for scalar keys:
//!
//! ```text
//! METALOOP_RUBRIC="3*pass - cost"
//! METALOOP_POLICY__PLATEAU_WINDOW=20
//! ```
//!
//! Two layouts are accepted. The general one lists `arm_sets`; the compact
//! two-dimension one lists `beta_plans` and `gamma_configs`, which become the
//! `plan` and `config` dimensions. Keys are case-insensitive.

use crate::error::ConfigError;
use crate::evaluation::plateau::PlateauPolicy;
use crate::evaluation::rubric::FALLBACK_RUBRIC;
use crate::types::{ArmSpec, PASS_KEY};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable overriding the configuration path
pub const CONFIG_PATH_ENV: &str = "METALOOP_CFG";
/// Environment variable overriding the persisted state path
pub const STATE_PATH_ENV: &str = "METALOOP_STATE";
/// Environment variable overriding the receipt log path
pub const RECEIPTS_PATH_ENV: &str = "METALOOP_RECEIPTS";

pub const DEFAULT_CONFIG_PATH: &str = "policies/meta_loop.json";
pub const DEFAULT_STATE_PATH: &str = "trace/meta_ucb_state.json";
pub const DEFAULT_RECEIPTS_PATH: &str = "trace/meta_receipts.jsonl";

const ENV_PREFIX: &str = "METALOOP";

/// Bucket section name reserved for pair statistics
const PAIRS_SECTION: &str = "pairs";

/// One selection dimension and its arms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmSetConfig {
    pub dimension: String,
    pub arms: Vec<ArmSpec>,
}

/// Selector and plateau settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub selector: String,
    pub plateau_window: usize,
    pub plateau_delta: f64,
    pub min_branches: u32,
    pub max_branches: u32,
    pub explore_budget: f64,
    pub branch_count: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        let p = PlateauPolicy::default();
        Self {
            selector: "UCB".to_string(),
            plateau_window: p.plateau_window,
            plateau_delta: p.plateau_delta,
            min_branches: p.min_branches,
            max_branches: p.max_branches,
            explore_budget: p.explore_budget,
            branch_count: p.branch_count,
        }
    }
}

/// On-disk shape, before layout normalization
#[derive(Debug, Default, Serialize, Deserialize)]
struct RawConfig {
    #[serde(default)]
    telemetry: Vec<String>,
    #[serde(default)]
    rubric: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    arm_sets: Vec<ArmSetConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    beta_plans: Vec<ArmSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    gamma_configs: Vec<ArmSpec>,
    #[serde(default)]
    policy: PolicyConfig,
}

/// Validated loop configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopConfig {
    pub telemetry: Vec<String>,
    pub rubric: String,
    pub arm_sets: Vec<ArmSetConfig>,
    pub policy: PolicyConfig,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            telemetry: default_telemetry(),
            rubric: FALLBACK_RUBRIC.to_string(),
            arm_sets: vec![
                ArmSetConfig {
                    dimension: "plan".to_string(),
                    arms: vec![
                        ArmSpec::new("direct").with_param("pass_bias", 0.0),
                        ArmSpec::new("single_tool").with_param("pass_bias", 0.05),
                        ArmSpec::new("two_step").with_param("pass_bias", 0.1),
                    ],
                },
                ArmSetConfig {
                    dimension: "config".to_string(),
                    arms: vec![
                        ArmSpec::new("small350")
                            .with_param("model", "small")
                            .with_param("chunk", 350),
                        ArmSpec::new("base600")
                            .with_param("model", "base")
                            .with_param("chunk", 600),
                    ],
                },
            ],
            policy: PolicyConfig::default(),
        }
    }
}

fn default_telemetry() -> Vec<String> {
    ["pass", "cost", "time", "mdl"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl LoopConfig {
    /// Load the document at `path` with environment overrides.
    ///
    /// A missing file yields the built-in default configuration (still
    /// subject to overrides); a malformed one is a [`ConfigError`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder();

        if path.exists() {
            debug!("Loading configuration from {}", path.display());
            builder = builder.add_source(
                ::config::File::from(path.to_path_buf()).format(::config::FileFormat::Json),
            );
        } else {
            info!(
                "No configuration at {}; using built-in defaults",
                path.display()
            );
            let defaults = RawConfig::from(LoopConfig::default());
            builder = builder.add_source(::config::Config::try_from(&defaults)?);
        }

        let raw: RawConfig = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Self::from_raw(raw)
    }

    /// Parse a configuration document from a JSON string (no overrides).
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = ::config::Config::builder()
            .add_source(::config::File::from_str(json, ::config::FileFormat::Json))
            .build()?
            .try_deserialize()?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let mut arm_sets = raw.arm_sets;
        if !raw.beta_plans.is_empty() {
            arm_sets.push(ArmSetConfig {
                dimension: "plan".to_string(),
                arms: raw.beta_plans,
            });
        }
        if !raw.gamma_configs.is_empty() {
            arm_sets.push(ArmSetConfig {
                dimension: "config".to_string(),
                arms: raw.gamma_configs,
            });
        }

        let mut seen = HashSet::new();
        let mut telemetry: Vec<String> = raw
            .telemetry
            .into_iter()
            .filter(|k| seen.insert(k.clone()))
            .collect();
        if telemetry.is_empty() {
            telemetry = default_telemetry();
        }

        let cfg = Self {
            telemetry,
            rubric: raw.rubric.unwrap_or_else(|| FALLBACK_RUBRIC.to_string()),
            arm_sets,
            policy: raw.policy,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Structural checks; run once before any round executes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.arm_sets.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one arm set is required".to_string(),
            ));
        }

        let mut dimensions = HashSet::new();
        for set in &self.arm_sets {
            if set.dimension.trim().is_empty() {
                return Err(ConfigError::Invalid("arm set without a dimension name".to_string()));
            }
            if set.dimension == PAIRS_SECTION {
                return Err(ConfigError::Invalid(format!(
                    "dimension name '{}' is reserved",
                    PAIRS_SECTION
                )));
            }
            if !dimensions.insert(set.dimension.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate dimension '{}'",
                    set.dimension
                )));
            }
            if set.arms.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "dimension '{}' has no arms",
                    set.dimension
                )));
            }
            let mut ids = HashSet::new();
            for arm in &set.arms {
                if arm.id.trim().is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "dimension '{}' has an arm without an id",
                        set.dimension
                    )));
                }
                if !ids.insert(arm.id.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "duplicate arm '{}' in dimension '{}'",
                        arm.id, set.dimension
                    )));
                }
            }
        }

        if self.telemetry.iter().any(|k| k == "score") {
            return Err(ConfigError::Invalid(
                "telemetry key 'score' is reserved".to_string(),
            ));
        }

        let p = &self.policy;
        if !matches!(p.selector.to_ascii_uppercase().as_str(), "UCB" | "UCB1") {
            return Err(ConfigError::Invalid(format!(
                "unsupported selector '{}' (expected UCB)",
                p.selector
            )));
        }
        if p.plateau_window == 0 {
            return Err(ConfigError::Invalid("plateau_window must be at least 1".to_string()));
        }
        if !p.plateau_delta.is_finite() || !p.explore_budget.is_finite() {
            return Err(ConfigError::Invalid(
                "plateau_delta and explore_budget must be finite".to_string(),
            ));
        }
        if p.min_branches == 0 || p.min_branches > p.max_branches {
            return Err(ConfigError::Invalid(format!(
                "branch bounds [{}, {}] are invalid",
                p.min_branches, p.max_branches
            )));
        }

        Ok(())
    }

    /// Whether `pass` is tracked, i.e. whether plateau detection has a signal
    pub fn tracks_pass(&self) -> bool {
        self.telemetry.iter().any(|k| k == PASS_KEY)
    }

    /// Initial exploration policy from the `policy` section
    pub fn plateau_policy(&self) -> PlateauPolicy {
        let p = &self.policy;
        PlateauPolicy {
            explore_budget: p.explore_budget,
            branch_count: p.branch_count,
            plateau_window: p.plateau_window,
            plateau_delta: p.plateau_delta,
            min_branches: p.min_branches,
            max_branches: p.max_branches,
        }
    }
}

impl From<LoopConfig> for RawConfig {
    fn from(cfg: LoopConfig) -> Self {
        Self {
            telemetry: cfg.telemetry,
            rubric: Some(cfg.rubric),
            arm_sets: cfg.arm_sets,
            beta_plans: Vec::new(),
            gamma_configs: Vec::new(),
            policy: cfg.policy,
        }
    }
}

/// Locations of the configuration, state, and receipt files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracePaths {
    pub config: PathBuf,
    pub state: PathBuf,
    pub receipts: PathBuf,
}

impl Default for TracePaths {
    fn default() -> Self {
        Self {
            config: PathBuf::from(DEFAULT_CONFIG_PATH),
            state: PathBuf::from(DEFAULT_STATE_PATH),
            receipts: PathBuf::from(DEFAULT_RECEIPTS_PATH),
        }
    }
}

impl TracePaths {
    /// Defaults, overridden by `METALOOP_CFG`, `METALOOP_STATE`, and
    /// `METALOOP_RECEIPTS` when set and non-empty.
    pub fn from_env() -> Self {
        let pick = |var: &str, default: &str| {
            env::var(var)
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(default))
        };
        Self {
            config: pick(CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH),
            state: pick(STATE_PATH_ENV, DEFAULT_STATE_PATH),
            receipts: pick(RECEIPTS_PATH_ENV, DEFAULT_RECEIPTS_PATH),
        }
    }
}
