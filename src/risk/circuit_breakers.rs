use serde::{Deserialize, Serialize};
use std::fmt;

use crate::risk::PerformanceState;

/// Win rate at or below `max_win_rate` after `min_trades` trades halts trading
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WinRateFloor {
    pub min_trades: u32,
    pub max_win_rate: f64,
}

/// Circuit breakers to stop trading after sustained losses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakers {
    pub max_consecutive_losses: u32,
    /// Cumulative profit rate at or below which trading halts (e.g. -0.02)
    pub max_drawdown: f64,
    pub win_rate_floors: Vec<WinRateFloor>,
    pub min_activity_hours: f64,
    pub min_activity_trades: u32,
}

impl Default for CircuitBreakers {
    fn default() -> Self {
        Self {
            max_consecutive_losses: 3, // 3 losses in a row
            max_drawdown: -0.02,       // -2% cumulative
            win_rate_floors: vec![
                WinRateFloor { min_trades: 5, max_win_rate: 0.10 },
                WinRateFloor { min_trades: 10, max_win_rate: 0.25 },
                WinRateFloor { min_trades: 15, max_win_rate: 0.40 },
                WinRateFloor { min_trades: 20, max_win_rate: 0.50 },
            ],
            min_activity_hours: 1.0,
            min_activity_trades: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    ConsecutiveLosses,
    DrawdownExceeded,
    WinRateFloor,
    InsufficientActivity,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::ConsecutiveLosses => "consecutive losses",
            StopReason::DrawdownExceeded => "drawdown exceeded",
            StopReason::WinRateFloor => "win rate floor",
            StopReason::InsufficientActivity => "insufficient activity",
        };
        f.write_str(s)
    }
}

impl CircuitBreakers {
    /// First tripped condition, if any
    pub fn check(&self, state: &PerformanceState) -> Result<(), StopReason> {
        // Check consecutive losses
        if state.consecutive_losses >= self.max_consecutive_losses {
            return Err(StopReason::ConsecutiveLosses);
        }

        // Check cumulative drawdown
        if state.trade_count > 0 && state.profit_rate() <= self.max_drawdown {
            return Err(StopReason::DrawdownExceeded);
        }

        // Check win rate floors
        let win_rate = state.win_rate();
        if self
            .win_rate_floors
            .iter()
            .any(|floor| state.trade_count >= floor.min_trades && win_rate <= floor.max_win_rate)
        {
            return Err(StopReason::WinRateFloor);
        }

        // Check activity
        let elapsed_hours = state.cumulative_elapsed_seconds / 3600.0;
        if elapsed_hours >= self.min_activity_hours && state.trade_count <= self.min_activity_trades {
            return Err(StopReason::InsufficientActivity);
        }

        Ok(())
    }
}
