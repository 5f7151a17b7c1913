use alloy::primitives::Address;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::indexer::fetcher::{ExhaustionPolicy, FetcherSettings};
use crate::indexer::retry::RetryPolicy;
use crate::ledger::{DuplicatePolicy, Sentinels};

const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub rpc_endpoint: String,
    pub contract_address: String,
    pub decimals: u8,
    pub start_block: u64,
    /// Inclusive. Defaults to the chain head at startup.
    pub end_block: Option<u64>,
    #[serde(default = "default_max_chunk_width")]
    pub max_chunk_width: u64,
    #[serde(default = "default_min_chunk_width")]
    pub min_chunk_width: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub on_exhausted: ExhaustionPolicy,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

fn default_max_chunk_width() -> u64 {
    2000
}

fn default_min_chunk_width() -> u64 {
    1
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_concurrency() -> usize {
    4
}

// ============================================================
// Ledger Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    #[serde(default = "default_mint_sentinel")]
    pub mint_sentinel: String,
    #[serde(default = "default_burn_sentinels")]
    pub burn_sentinels: Vec<String>,
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
    /// Blocks between holder-history checkpoints. None records only the end.
    pub checkpoint_interval: Option<u64>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            mint_sentinel: default_mint_sentinel(),
            burn_sentinels: default_burn_sentinels(),
            duplicate_policy: DuplicatePolicy::Skip,
            checkpoint_interval: None,
        }
    }
}

fn default_mint_sentinel() -> String {
    ZERO_ADDRESS.to_string()
}

fn default_burn_sentinels() -> Vec<String> {
    vec![ZERO_ADDRESS.to_string()]
}

// ============================================================
// Output Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default)]
    pub dense_daily: bool,
    #[serde(default = "default_true")]
    pub export_events: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            top_n: 10,
            dense_daily: false,
            export_events: true,
        }
    }
}

// ============================================================
// Analysis Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    /// Liquidity pools of the token. Transfers out of one count as buys,
    /// transfers into one as sells.
    #[serde(default)]
    pub pool_addresses: Vec<String>,
    #[serde(default = "default_recent_hours")]
    pub recent_hours: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            pool_addresses: Vec::new(),
            recent_hours: 24,
        }
    }
}

fn default_recent_hours() -> u64 {
    24
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_top_n() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn parse_address(field: &str, value: &str) -> eyre::Result<Address> {
    if !value.starts_with("0x") || value.len() != 42 {
        return Err(eyre::eyre!("Invalid address '{}' for {}", value, field));
    }
    value
        .parse::<Address>()
        .map_err(|e| eyre::eyre!("Invalid address '{}' for {}: {}", value, field, e))
}

impl Config {
    pub fn load(path: &str) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("Failed to read config file '{}': {}", path, e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| eyre::eyre!("Failed to parse config file '{}': {}", path, e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> eyre::Result<()> {
        if self.rpc_endpoint.trim().is_empty() {
            return Err(eyre::eyre!("rpc_endpoint must not be empty"));
        }
        parse_address("contract_address", &self.contract_address)?;
        parse_address("ledger.mint_sentinel", &self.ledger.mint_sentinel)?;
        for burn in &self.ledger.burn_sentinels {
            parse_address("ledger.burn_sentinels", burn)?;
        }

        if self.max_chunk_width == 0 || self.min_chunk_width == 0 {
            return Err(eyre::eyre!("Chunk widths must be at least 1 block"));
        }
        if self.min_chunk_width > self.max_chunk_width {
            return Err(eyre::eyre!(
                "min_chunk_width ({}) exceeds max_chunk_width ({})",
                self.min_chunk_width,
                self.max_chunk_width
            ));
        }
        if self.concurrency == 0 {
            return Err(eyre::eyre!("concurrency must be at least 1"));
        }
        if let Some(end) = self.end_block {
            if end < self.start_block {
                return Err(eyre::eyre!(
                    "end_block ({}) is before start_block ({})",
                    end,
                    self.start_block
                ));
            }
        }
        if self.ledger.checkpoint_interval == Some(0) {
            return Err(eyre::eyre!("ledger.checkpoint_interval must be at least 1"));
        }
        for pool in &self.analysis.pool_addresses {
            parse_address("analysis.pool_addresses", pool)?;
        }
        if self.analysis.recent_hours == 0 {
            return Err(eyre::eyre!("analysis.recent_hours must be at least 1"));
        }
        Ok(())
    }

    pub fn contract(&self) -> eyre::Result<Address> {
        parse_address("contract_address", &self.contract_address)
    }

    pub fn sentinels(&self) -> eyre::Result<Sentinels> {
        let mint = parse_address("ledger.mint_sentinel", &self.ledger.mint_sentinel)?;
        let burn = self
            .ledger
            .burn_sentinels
            .iter()
            .map(|b| parse_address("ledger.burn_sentinels", b))
            .collect::<eyre::Result<Vec<_>>>()?;
        Ok(Sentinels { mint, burn })
    }

    pub fn pool_addresses(&self) -> eyre::Result<Vec<Address>> {
        self.analysis
            .pool_addresses
            .iter()
            .map(|p| parse_address("analysis.pool_addresses", p))
            .collect()
    }

    pub fn fetcher_settings(&self) -> FetcherSettings {
        FetcherSettings {
            max_chunk_width: self.max_chunk_width,
            min_chunk_width: self.min_chunk_width,
            concurrency: self.concurrency,
            on_exhausted: self.on_exhausted,
            retry: RetryPolicy {
                max_retries: self.max_retries,
                initial_backoff: Duration::from_millis(self.retry_backoff_ms),
                max_backoff: Duration::from_millis(self.max_backoff_ms),
            },
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_config() -> Config {
        Config {
            rpc_endpoint: "http://localhost:8545".to_string(),
            contract_address: "0xcccccccccccccccccccccccccccccccccccccccc".to_string(),
            decimals: 6,
            start_block: 0,
            end_block: None,
            max_chunk_width: 2000,
            min_chunk_width: 1,
            max_retries: 3,
            retry_backoff_ms: 1,
            max_backoff_ms: 2,
            request_timeout_ms: 5_000,
            concurrency: 4,
            on_exhausted: ExhaustionPolicy::Abort,
            ledger: LedgerConfig::default(),
            output: OutputConfig::default(),
            analysis: AnalysisConfig::default(),
        }
    }

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
rpc_endpoint = "http://localhost:8545"
contract_address = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"
decimals = 6
start_block = 6082465
end_block = 6090000
concurrency = 8
on_exhausted = "narrow"

[ledger]
duplicate_policy = "reject"
checkpoint_interval = 1000

[output]
dir = "out"
dense_daily = true

[analysis]
pool_addresses = ["0x88e6A0c2dDD26FEEb64F039a2c41296FcB3f5640"]
recent_hours = 6
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.decimals, 6);
        assert_eq!(config.start_block, 6_082_465);
        assert_eq!(config.end_block, Some(6_090_000));
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.on_exhausted, ExhaustionPolicy::Narrow);
        assert_eq!(config.ledger.duplicate_policy, DuplicatePolicy::Reject);
        assert_eq!(config.ledger.checkpoint_interval, Some(1000));
        assert_eq!(config.output.dir, PathBuf::from("out"));
        assert!(config.output.dense_daily);
        assert_eq!(config.max_chunk_width, 2000); // default
        assert_eq!(config.output.top_n, 10); // default
        assert_eq!(config.analysis.recent_hours, 6);
        assert_eq!(config.pool_addresses().unwrap().len(), 1);
    }

    #[test]
    fn test_defaults() {
        let toml_str = r#"
rpc_endpoint = "http://localhost:8545"
contract_address = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"
decimals = 18
start_block = 0
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.end_block, None);
        assert_eq!(config.min_chunk_width, 1);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_backoff_ms, 500);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.on_exhausted, ExhaustionPolicy::Abort);
        assert_eq!(config.ledger.duplicate_policy, DuplicatePolicy::Skip);
        assert!(config.output.export_events);
        assert!(config.analysis.pool_addresses.is_empty());
        assert_eq!(config.analysis.recent_hours, 24);

        let sentinels = config.sentinels().unwrap();
        assert_eq!(sentinels, Sentinels::default());

        let settings = config.fetcher_settings();
        assert_eq!(settings.retry.initial_backoff, Duration::from_millis(500));
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_validate_bad_address() {
        let mut config = test_config();
        config.contract_address = "not-an-address".to_string();
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.ledger.burn_sentinels.push("0x1234".to_string());
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.analysis.pool_addresses.push("pool".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_recent_window() {
        let mut config = test_config();
        config.analysis.recent_hours = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_chunk_widths() {
        let mut config = test_config();
        config.max_chunk_width = 0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.min_chunk_width = 3000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_ranges_and_concurrency() {
        let mut config = test_config();
        config.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.start_block = 100;
        config.end_block = Some(99);
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.end_block = Some(config.start_block);
        assert!(config.validate().is_ok());
    }
}
