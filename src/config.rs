//! Application configuration.
//!
//! Loaded from a TOML file; every section is optional except `[broker]`.
//! Secrets never live in the file itself: the broker section names the
//! environment variables to read keys from, and `.env` files are loaded
//! before config resolution for local runs.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use secrecy::SecretString;
use serde::Deserialize;

use crate::pricing::SolverParams;
use crate::marketdata::RetryPolicy;
use crate::types::{ScreeningCriteria, StrategyParams};

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub screening: ScreeningConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub data: DataConfig,
    pub broker: BrokerConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// TP/SL parameters keyed by strategy name.
    #[serde(default)]
    pub strategies: HashMap<String, StrategyParams>,
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: AppConfig = toml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    pub fn strategy_params(&self, strategy: &str) -> Option<StrategyParams> {
        self.strategies.get(strategy).copied()
    }
}

// ---- screening ----

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScreeningConfig {
    pub dte_min: i64,
    pub dte_max: i64,
    pub delta_min: f64,
    pub delta_max: f64,
    pub min_volume: u32,
    pub min_open_interest: u32,
    pub max_spread_pct: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub risk_free_rate: f64,
    pub solver: SolverConfig,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        let c = ScreeningCriteria::default();
        Self {
            dte_min: c.dte_min,
            dte_max: c.dte_max,
            delta_min: c.delta_min,
            delta_max: c.delta_max,
            min_volume: c.min_volume,
            min_open_interest: c.min_open_interest,
            max_spread_pct: c.max_spread_pct,
            min_price: c.min_price,
            max_price: c.max_price,
            risk_free_rate: 0.05,
            solver: SolverConfig::default(),
        }
    }
}

impl ScreeningConfig {
    pub fn criteria(&self) -> ScreeningCriteria {
        ScreeningCriteria {
            dte_min: self.dte_min,
            dte_max: self.dte_max,
            delta_min: self.delta_min,
            delta_max: self.delta_max,
            min_volume: self.min_volume,
            min_open_interest: self.min_open_interest,
            max_spread_pct: self.max_spread_pct,
            min_price: self.min_price,
            max_price: self.max_price,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub vol_lo: f64,
    pub vol_hi: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        let p = SolverParams::default();
        Self {
            vol_lo: p.lo,
            vol_hi: p.hi,
            tolerance: p.tolerance,
            max_iterations: p.max_iterations,
        }
    }
}

impl SolverConfig {
    pub fn params(&self) -> SolverParams {
        SolverParams {
            lo: self.vol_lo,
            hi: self.vol_hi,
            tolerance: self.tolerance,
            max_iterations: self.max_iterations,
        }
    }
}

// ---- risk ----

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Maximum dollar loss accepted per trade if stopped out.
    pub max_dollar_risk: f64,
    /// Shares per contract; 100 for standard US equity options.
    pub contract_multiplier: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_dollar_risk: 50.0,
            contract_multiplier: crate::risk::DEFAULT_CONTRACT_MULTIPLIER,
        }
    }
}

// ---- data ----

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Base URL of the secondary venue feed; no fallback when unset.
    pub venue_base_url: Option<String>,
    pub retry_max_attempts: u32,
    pub retry_backoff_base_secs: f64,
}

impl Default for DataConfig {
    fn default() -> Self {
        let p = RetryPolicy::default();
        Self {
            venue_base_url: None,
            retry_max_attempts: p.max_attempts,
            retry_backoff_base_secs: p.backoff_base_secs,
        }
    }
}

impl DataConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            backoff_base_secs: self.retry_backoff_base_secs,
        }
    }
}

// ---- broker ----

#[derive(Debug, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_true")]
    pub paper: bool,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_api_secret_env")]
    pub api_secret_env: String,
}

fn default_true() -> bool {
    true
}

fn default_api_key_env() -> String {
    "ALPACA_API_KEY".to_string()
}

fn default_api_secret_env() -> String {
    "ALPACA_API_SECRET".to_string()
}

impl BrokerConfig {
    pub fn api_key(&self) -> anyhow::Result<SecretString> {
        resolve_secret(&self.api_key_env)
    }

    pub fn api_secret(&self) -> anyhow::Result<SecretString> {
        resolve_secret(&self.api_secret_env)
    }
}

fn resolve_secret(env_name: &str) -> anyhow::Result<SecretString> {
    let value = std::env::var(env_name)
        .with_context(|| format!("environment variable {env_name} not set"))?;
    Ok(SecretString::new(value))
}

// ---- monitor ----

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub interval_secs: u64,
    pub store_path: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            store_path: "targets.json".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
