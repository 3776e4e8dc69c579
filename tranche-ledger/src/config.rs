use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tranche_core::error::{LedgerError, Result, ValidationError};
use tranche_core::partition::Partition;
use tranche_core::Amount;

pub const DEFAULT_DECIMALS: u8 = 18;
pub const DEFAULT_GRANULARITY: Amount = 1;

/// Static parameters of a security token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub name: String,
    pub symbol: String,

    #[serde(default = "TokenConfig::default_decimals")]
    pub decimals: u8,

    /// Every amount moved must be a multiple of this
    #[serde(default = "TokenConfig::default_granularity")]
    pub granularity: Amount,

    /// Initial ordered default partitions
    #[serde(default)]
    pub default_partitions: Vec<Partition>,

    /// Whether controllers may force transfers and redemptions
    #[serde(default = "TokenConfig::enabled")]
    pub controllable: bool,

    /// Whether new tokens may still be issued
    #[serde(default = "TokenConfig::enabled")]
    pub issuable: bool,

    /// Whether controller transfers skip the eligibility gate
    #[serde(default)]
    pub controller_bypasses_gate: bool,
}

impl TokenConfig {
    fn default_decimals() -> u8 {
        DEFAULT_DECIMALS
    }

    fn default_granularity() -> Amount {
        DEFAULT_GRANULARITY
    }

    fn enabled() -> bool {
        true
    }

    pub fn new(name: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            decimals: DEFAULT_DECIMALS,
            granularity: DEFAULT_GRANULARITY,
            default_partitions: Vec::new(),
            controllable: true,
            issuable: true,
            controller_bypasses_gate: false,
        }
    }

    pub fn with_granularity(mut self, granularity: Amount) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn with_default_partitions(mut self, partitions: Vec<Partition>) -> Self {
        self.default_partitions = partitions;
        self
    }

    pub fn with_controllable(mut self, controllable: bool) -> Self {
        self.controllable = controllable;
        self
    }

    pub fn with_issuable(mut self, issuable: bool) -> Self {
        self.issuable = issuable;
        self
    }

    pub fn with_controller_bypasses_gate(mut self, bypass: bool) -> Self {
        self.controller_bypasses_gate = bypass;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.granularity < 1 {
            return Err(ValidationError::InvalidGranularity.into());
        }
        for (i, partition) in self.default_partitions.iter().enumerate() {
            if self.default_partitions[..i].contains(partition) {
                return Err(ValidationError::DuplicateDefaultPartition(*partition).into());
            }
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: TokenConfig =
            serde_json::from_str(json).map_err(|e| LedgerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading token config {}", path.display()))?;
        let config = Self::from_json_str(&raw)
            .with_context(|| format!("parsing token config {}", path.display()))?;
        Ok(config)
    }
}
