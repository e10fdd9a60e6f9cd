// Decision oracles: pluggable entry/exit judgment sources
pub mod llm;
pub mod registry;
pub mod target_stop;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::MarketSnapshot;
use crate::round::RoundMetrics;

pub use llm::LlmOracle;
pub use registry::StrategyRegistry;
pub use target_stop::TargetStopOracle;

/// Answer to "should we open a position now?"
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntryJudgment {
    pub should_enter: bool,
    pub target_price: f64,
    pub stop_price: f64,
    #[serde(default)]
    pub reasons: Vec<String>,
}

impl EntryJudgment {
    pub fn decline(reasons: Vec<String>) -> Self {
        Self {
            should_enter: false,
            target_price: 0.0,
            stop_price: 0.0,
            reasons,
        }
    }

    /// Target must sit above and stop below the price the judgment was made at
    pub fn validate(&self, current_price: f64) -> Result<()> {
        if !current_price.is_finite() || current_price <= 0.0 {
            return Err(Error::InvalidJudgment(format!(
                "no usable market price ({})",
                current_price
            )));
        }
        if !self.target_price.is_finite() || !self.stop_price.is_finite() {
            return Err(Error::InvalidJudgment(
                "target or stop is not a finite number".to_string(),
            ));
        }
        if self.target_price <= current_price {
            return Err(Error::InvalidJudgment(format!(
                "target {} not above current price {}",
                self.target_price, current_price
            )));
        }
        if self.stop_price >= current_price {
            return Err(Error::InvalidJudgment(format!(
                "stop {} not below current price {}",
                self.stop_price, current_price
            )));
        }
        if self.stop_price <= 0.0 {
            return Err(Error::InvalidJudgment(format!(
                "stop {} must be positive",
                self.stop_price
            )));
        }
        Ok(())
    }
}

/// Answer to "should we close the open position now?"
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExitJudgment {
    pub should_exit: bool,
    #[serde(default)]
    pub reasons: Vec<String>,
}

impl ExitJudgment {
    pub fn hold(reasons: Vec<String>) -> Self {
        Self {
            should_exit: false,
            reasons,
        }
    }

    pub fn exit(reasons: Vec<String>) -> Self {
        Self {
            should_exit: true,
            reasons,
        }
    }
}

/// Any judgment recorded in a round's decision history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Judgment {
    Entry(EntryJudgment),
    Exit(ExitJudgment),
}

impl Judgment {
    pub fn reasons(&self) -> &[String] {
        match self {
            Judgment::Entry(j) => &j.reasons,
            Judgment::Exit(j) => &j.reasons,
        }
    }
}

/// The open position as presented to an exit decision
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionView {
    pub symbol: String,
    pub entry_price: f64,
    pub volume: f64,
    pub take_profit: Option<f64>,
    pub stop_loss: Option<f64>,
    pub holding_minutes: f64,
    pub metrics: Option<RoundMetrics>,
}

/// Source of entry and exit judgments.
///
/// Implementations are opaque to the round engine; every numeric output is
/// validated by the caller before it is acted on.
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    /// Registry name, e.g. `target-stop`
    fn name(&self) -> &str;

    fn version(&self) -> u32 {
        1
    }

    async fn entry(&self, snapshot: &MarketSnapshot) -> Result<EntryJudgment>;

    async fn exit(&self, position: &PositionView, snapshot: &MarketSnapshot)
        -> Result<ExitJudgment>;
}

/// Render rationale lines as a bulleted block for logs and notifications
pub fn format_reasons(reasons: &[String]) -> String {
    reasons
        .iter()
        .map(|r| format!("- {}", r))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn judgment(target: f64, stop: f64) -> EntryJudgment {
        EntryJudgment {
            should_enter: true,
            target_price: target,
            stop_price: stop,
            reasons: vec!["momentum".to_string()],
        }
    }

    #[test]
    fn test_validate_accepts_bracketing_prices() {
        assert!(judgment(101_000_000.0, 98_500_000.0)
            .validate(100_000_000.0)
            .is_ok());
    }

    #[test]
    fn test_validate_rejects_target_at_price() {
        let err = judgment(100_000_000.0, 98_500_000.0)
            .validate(100_000_000.0)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidJudgment(_)));
    }

    #[test]
    fn test_validate_rejects_stop_above_price() {
        assert!(judgment(101.0, 100.5).validate(100.0).is_err());
        assert!(judgment(f64::NAN, 99.0).validate(100.0).is_err());
        assert!(judgment(101.0, -1.0).validate(100.0).is_err());
    }

    #[test]
    fn test_validate_rejects_unusable_market_price() {
        let judgment = judgment(101.0, 99.0);
        assert!(judgment.validate(f64::NAN).is_err());
        assert!(judgment.validate(f64::INFINITY).is_err());
        assert!(judgment.validate(0.0).is_err());
    }

    #[test]
    fn test_format_reasons() {
        let text = format_reasons(&["a".to_string(), "b".to_string()]);
        assert_eq!(text, "- a\n- b");
    }
}
