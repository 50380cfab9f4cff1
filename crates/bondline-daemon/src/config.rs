//! Configuration file management.

use std::path::{Path, PathBuf};

use bondline_bonding::{BondingConfig, SnapshotCutoverPolicy};
use bondline_types::{Address, Amount, Round};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::events::EventFilter;

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Accounting engine settings.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Governor address (hex, `0x` prefix optional).
    #[serde(default)]
    pub governor: Address,
    #[serde(default = "default_max_legacy_rounds")]
    pub max_legacy_rounds_per_claim: u64,
    #[serde(default = "default_unbonding_period")]
    pub unbonding_period: Round,
    /// "reference" | "exclude-covered-rounds" | "forbid-post-cutover".
    #[serde(default)]
    pub snapshot_cutover_policy: SnapshotCutoverPolicy,
    /// First cumulative round, set by the governor at startup when present.
    #[serde(default)]
    pub regime_boundary: Option<Round>,
    /// Round the engine starts in.
    #[serde(default = "default_start_round")]
    pub start_round: Round,
    /// Amount minted per `call_reward`, in base units (decimal string).
    #[serde_as(as = "serde_with::DisplayFromStr")]
    #[serde(default = "default_reward_per_round")]
    pub reward_per_round: Amount,
}

/// Replay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// JSON command script. Empty = `$data_dir/replay.json`.
    #[serde(default)]
    pub script: String,
    /// Event bus buffer per subscriber.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Abort the replay on the first rejected command.
    #[serde(default)]
    pub stop_on_error: bool,
    /// Which events are printed to stdout.
    #[serde(default)]
    pub output: EventFilter,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace" | "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

const CONFIG_FILE: &str = "config.toml";
const DEFAULT_SCRIPT: &str = "replay.json";

// Default value functions

fn default_max_legacy_rounds() -> u64 {
    100
}

fn default_unbonding_period() -> Round {
    7
}

fn default_start_round() -> Round {
    1
}

fn default_reward_per_round() -> Amount {
    1_000 * bondline_types::BASE_UNITS_PER_TOKEN
}

fn default_event_buffer() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            governor: Address::ZERO,
            max_legacy_rounds_per_claim: default_max_legacy_rounds(),
            unbonding_period: default_unbonding_period(),
            snapshot_cutover_policy: SnapshotCutoverPolicy::default(),
            regime_boundary: None,
            start_round: default_start_round(),
            reward_per_round: default_reward_per_round(),
        }
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            script: String::new(),
            event_buffer: default_event_buffer(),
            stop_on_error: false,
            output: EventFilter::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl EngineConfig {
    /// Settings handed to the bonding manager.
    pub fn bonding(&self) -> BondingConfig {
        BondingConfig {
            governor: self.governor,
            max_legacy_rounds_per_claim: self.max_legacy_rounds_per_claim,
            unbonding_period: self.unbonding_period,
            snapshot_cutover_policy: self.snapshot_cutover_policy,
        }
    }
}

impl DaemonConfig {
    /// Read `config.toml` from `data_dir`, or defaults when there is none.
    pub fn load(data_dir: &Path) -> anyhow::Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Replay script location; relative paths resolve against `data_dir`.
    pub fn script_path(&self, data_dir: &Path) -> PathBuf {
        if self.replay.script.is_empty() {
            data_dir.join(DEFAULT_SCRIPT)
        } else {
            data_dir.join(&self.replay.script)
        }
    }
}

/// `$BONDLINE_DATA_DIR`, else a per-user directory.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("BONDLINE_DATA_DIR") {
        return PathBuf::from(dir);
    }
    match std::env::var_os("HOME").map(PathBuf::from) {
        Some(home) if cfg!(target_os = "macos") => home.join("Library/Application Support/Bondline"),
        Some(home) => home.join(".bondline"),
        None => std::env::temp_dir().join("bondline"),
    }
}
