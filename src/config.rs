use ::config::{ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::execution::BackoffSchedule;
use crate::risk::CircuitBreakers;

const DEFAULT_CONFIG_FILE: &str = "scalper.toml";
const ENV_PREFIX: &str = "SCALPER";

/// Effective settings: `scalper.toml` (optional) overlaid with `SCALPER__*` env vars
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub trading: TradingSettings,
    pub confirmer: ConfirmerSettings,
    pub risk: CircuitBreakers,
    pub oracle: OracleSettings,
    pub paper: PaperSettings,
    pub notify: NotifySettings,
    pub audit: AuditSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingSettings {
    pub symbols: Vec<String>,
    pub quote_currency: String,
    pub poll_interval_secs: u64,
    pub max_watch_minutes: u64,
    pub monitor_interval_secs: u64,
    /// Consecutive oracle failures tolerated while holding
    pub max_monitor_oracle_errors: u32,
    /// Share of free quote balance spent per entry
    pub entry_fraction: f64,
    pub max_active_rounds: usize,
    pub history_capacity: usize,
    /// Pause between finished rounds of the same symbol
    pub round_cooldown_secs: u64,
}

impl Default for TradingSettings {
    fn default() -> Self {
        Self {
            symbols: vec!["BTC".to_string()],
            quote_currency: "KRW".to_string(),
            poll_interval_secs: 30,
            max_watch_minutes: 120,
            monitor_interval_secs: 1,
            max_monitor_oracle_errors: 5,
            entry_fraction: 0.2,
            max_active_rounds: 1,
            history_capacity: 50,
            round_cooldown_secs: 15,
        }
    }
}

impl TradingSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn max_watch(&self) -> Duration {
        Duration::from_secs(self.max_watch_minutes * 60)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    pub fn round_cooldown(&self) -> Duration {
        Duration::from_secs(self.round_cooldown_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmerSettings {
    pub backoff_ms: Vec<u64>,
}

impl Default for ConfirmerSettings {
    fn default() -> Self {
        Self {
            backoff_ms: vec![500, 500, 500, 1000, 1000, 1000, 2000, 2000, 2000, 2000],
        }
    }
}

impl ConfirmerSettings {
    pub fn schedule(&self) -> BackoffSchedule {
        BackoffSchedule::from_millis(&self.backoff_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleSettings {
    /// Registered strategy name
    pub strategy: String,
    /// Strategy version, latest registered when absent
    pub version: Option<u32>,
    pub profit_rate: f64,
    pub loss_rate: f64,
    pub max_holding_minutes: f64,
    pub openai_model: String,
    pub openai_base_url: String,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            strategy: "target-stop".to_string(),
            version: None,
            profit_rate: 0.005,  // +0.5% target
            loss_rate: 0.0025,   // -0.25% stop
            max_holding_minutes: 10.0,
            openai_model: "gpt-4o-mini".to_string(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperSettings {
    pub initial_quote_balance: f64,
    pub start_price: f64,
    pub fee_rate: f64,
    /// Order queries answered `wait` before an order fills
    pub fill_delay_polls: u32,
    /// Per-tick standard deviation of the random walk
    pub volatility: f64,
    pub seed: Option<u64>,
}

impl Default for PaperSettings {
    fn default() -> Self {
        Self {
            initial_quote_balance: 1_000_000.0,
            start_price: 100_000_000.0,
            fee_rate: 0.0004,
            fill_delay_polls: 1,
            volatility: 0.0008,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifySettings {
    pub discord_webhook_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    /// JSON-lines audit file; audit goes to the log when unset
    pub path: Option<PathBuf>,
}

impl Settings {
    /// Load settings from `path` (or `scalper.toml` if present) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings: Settings = ::config::Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("trading.symbols")
                    .with_list_parse_key("confirmer.backoff_ms"),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(Error::Config(ConfigError::Message(msg.to_string())));

        if self.trading.symbols.is_empty() {
            return invalid("trading.symbols must not be empty");
        }
        if !(self.trading.entry_fraction > 0.0 && self.trading.entry_fraction <= 1.0) {
            return invalid("trading.entry_fraction must be in (0, 1]");
        }
        if self.trading.max_active_rounds == 0 {
            return invalid("trading.max_active_rounds must be at least 1");
        }
        if self.confirmer.backoff_ms.is_empty() {
            return invalid("confirmer.backoff_ms must not be empty");
        }
        if self.oracle.profit_rate <= 0.0 || self.oracle.loss_rate <= 0.0 {
            return invalid("oracle.profit_rate and oracle.loss_rate must be positive");
        }
        Ok(())
    }
}
