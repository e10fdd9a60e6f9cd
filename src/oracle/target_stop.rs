use async_trait::async_trait;

use super::{DecisionOracle, EntryJudgment, ExitJudgment, PositionView};
use crate::config::OracleSettings;
use crate::error::Result;
use crate::models::MarketSnapshot;

/// Rule-based scalping oracle
///
/// Entry: price above the mean close of the last `lookback` candles, with
/// bids outweighing asks when an order book is available. Target and stop
/// sit at fixed rates around the entry price.
///
/// Exit: target reached, stop reached, or held for too long.
#[derive(Debug, Clone)]
pub struct TargetStopOracle {
    profit_rate: f64,
    loss_rate: f64,
    max_holding_minutes: f64,
    lookback: usize,
    min_bid_ask_ratio: f64,
}

impl TargetStopOracle {
    pub fn new(profit_rate: f64, loss_rate: f64, max_holding_minutes: f64) -> Self {
        Self {
            profit_rate,
            loss_rate,
            max_holding_minutes,
            lookback: 5,
            min_bid_ask_ratio: 1.0,
        }
    }

    pub fn from_settings(settings: &OracleSettings) -> Self {
        Self::new(
            settings.profit_rate,
            settings.loss_rate,
            settings.max_holding_minutes,
        )
    }

    pub fn with_lookback(mut self, lookback: usize) -> Self {
        self.lookback = lookback.max(1);
        self
    }

    /// Take-profit and stop-loss prices around `price`
    pub fn targets(&self, price: f64) -> (f64, f64) {
        (price * (1.0 + self.profit_rate), price * (1.0 - self.loss_rate))
    }
}

impl Default for TargetStopOracle {
    fn default() -> Self {
        Self::from_settings(&OracleSettings::default())
    }
}

#[async_trait]
impl DecisionOracle for TargetStopOracle {
    fn name(&self) -> &str {
        "target-stop"
    }

    async fn entry(&self, snapshot: &MarketSnapshot) -> Result<EntryJudgment> {
        let candles = &snapshot.candles;
        if candles.len() < self.lookback {
            return Ok(EntryJudgment::decline(vec![format!(
                "Insufficient data: {} candles, need {}",
                candles.len(),
                self.lookback
            )]));
        }

        let recent = &candles[candles.len() - self.lookback..];
        let mean_close = recent.iter().map(|c| c.close).sum::<f64>() / recent.len() as f64;
        let mut reasons = Vec::new();

        if snapshot.price <= mean_close {
            reasons.push(format!(
                "Price {:.0} not above {}-candle mean {:.0}",
                snapshot.price, self.lookback, mean_close
            ));
            return Ok(EntryJudgment::decline(reasons));
        }
        reasons.push(format!(
            "Price {:.0} above {}-candle mean {:.0}",
            snapshot.price, self.lookback, mean_close
        ));

        if let Some(ratio) = snapshot.order_book.bid_ask_ratio() {
            if ratio < self.min_bid_ask_ratio {
                reasons.push(format!("Bid/ask volume ratio {:.2} too weak", ratio));
                return Ok(EntryJudgment::decline(reasons));
            }
            reasons.push(format!("Bid/ask volume ratio {:.2}", ratio));
        }

        let (target_price, stop_price) = self.targets(snapshot.price);
        reasons.push(format!(
            "Target +{:.2}%, stop -{:.2}%",
            self.profit_rate * 100.0,
            self.loss_rate * 100.0
        ));

        Ok(EntryJudgment {
            should_enter: true,
            target_price,
            stop_price,
            reasons,
        })
    }

    async fn exit(&self, position: &PositionView, snapshot: &MarketSnapshot) -> Result<ExitJudgment> {
        let price = snapshot.price;
        let (default_target, default_stop) = self.targets(position.entry_price);
        let target = position.take_profit.unwrap_or(default_target);
        let stop = position.stop_loss.unwrap_or(default_stop);

        if price >= target {
            return Ok(ExitJudgment::exit(vec![format!(
                "Target reached: {:.0} >= {:.0}",
                price, target
            )]));
        }
        if price <= stop {
            return Ok(ExitJudgment::exit(vec![format!(
                "Stop reached: {:.0} <= {:.0}",
                price, stop
            )]));
        }
        if position.holding_minutes >= self.max_holding_minutes {
            return Ok(ExitJudgment::exit(vec![format!(
                "Max holding time: {:.1} min",
                position.holding_minutes
            )]));
        }

        let pnl_pct = (price - position.entry_price) / position.entry_price * 100.0;
        Ok(ExitJudgment::hold(vec![format!("Holding at {:+.2}%", pnl_pct)]))
    }
}
