//! Node configuration (read once from TOML) and the network configuration
//! produced by genesis. Both are plain values passed by reference.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use thiserror::Error;

use crate::{
    primitives::{Address, Amount, GWEI},
    protocol::serialization::TollSerialize,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("cannot write config: {0}")]
    Write(#[from] toml::ser::Error),
}

/// Gas parameters the operation builder fills in. Fees are configured in
/// gwei so every value fits a TOML integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasDefaults {
    pub call_gas_limit: u64,
    pub verification_gas_limit: u64,
    pub pre_verification_gas: u64,
    pub max_fee_per_gas_gwei: u64,
    pub max_priority_fee_per_gas_gwei: u64,
}

impl Default for GasDefaults {
    fn default() -> Self {
        GasDefaults {
            call_gas_limit: 2_000_000,
            verification_gas_limit: 500_000,
            pre_verification_gas: 100_000,
            max_fee_per_gas_gwei: 80,
            max_priority_fee_per_gas_gwei: 80,
        }
    }
}

impl GasDefaults {
    pub fn max_fee_per_gas(&self) -> Amount {
        self.max_fee_per_gas_gwei as Amount * GWEI
    }

    pub fn max_priority_fee_per_gas(&self) -> Amount {
        self.max_priority_fee_per_gas_gwei as Amount * GWEI
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub chain_id: u64,
    /// Unix time of the genesis block; 0 takes the current time.
    pub genesis_timestamp: u64,
    pub block_interval_secs: u64,
    pub base_fee_gwei: u64,
    /// Native deposit the paymaster starts with, in gwei.
    pub paymaster_deposit_gwei: u64,
    pub token_symbol: String,
    pub account_abstraction_supported: bool,
    pub receipt_timeout_ms: u64,
    pub poll_interval_ms: u64,
    // tables go last in TOML
    pub gas: GasDefaults,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            chain_id: 31337,
            genesis_timestamp: 0,
            block_interval_secs: 12,
            base_fee_gwei: 1,
            paymaster_deposit_gwei: 1_000_000_000_000,
            token_symbol: "TOLL".to_string(),
            account_abstraction_supported: true,
            receipt_timeout_ms: 30_000,
            poll_interval_ms: 25,
            gas: GasDefaults::default(),
        }
    }
}

impl NodeConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Load `path`, writing the defaults there first if it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Self::load(path);
        }
        let config = Self::default();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(&config)?)?;
        tracing::info!("wrote default config to {}", path.display());
        Ok(config)
    }

    pub fn base_fee(&self) -> Amount {
        self.base_fee_gwei as Amount * GWEI
    }

    pub fn paymaster_deposit(&self) -> Amount {
        self.paymaster_deposit_gwei as Amount * GWEI
    }
}

#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractAddresses {
    #[serde_as(as = "Hex")]
    pub ledger: Address,
    #[serde_as(as = "Hex")]
    pub token: Address,
    #[serde_as(as = "Hex")]
    pub entry_point: Address,
    #[serde_as(as = "Hex")]
    pub factory: Address,
    #[serde_as(as = "Hex")]
    pub paymaster: Address,
}

/// Everything a client needs to talk to a deployed network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub chain_id: u64,
    /// When false, privileged writes are sent directly by the owner key.
    pub account_abstraction_supported: bool,
    pub receipt_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub contracts: ContractAddresses,
    pub gas: GasDefaults,
}

impl NetworkConfig {
    pub fn receipt_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.receipt_timeout_ms)
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }
}

impl TollSerialize for NetworkConfig {}
