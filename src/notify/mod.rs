// Operator notifications (Discord webhook or log output)
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::risk::{PerformanceState, StopReason};
use crate::round::RoundSummary;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Entry filled, position open
    RoundStarted {
        round_id: Uuid,
        symbol: String,
        entry_price: f64,
        volume: f64,
        take_profit: Option<f64>,
        stop_loss: Option<f64>,
        reasons: Vec<String>,
    },
    RoundFinished {
        summary: RoundSummary,
        pnl: Option<f64>,
    },
    /// An exit order failed and the position is still open
    ExitRolledBack {
        round_id: Uuid,
        symbol: String,
        error: String,
    },
    RoundFailed {
        round_id: Uuid,
        symbol: String,
        error: String,
        position_open: bool,
    },
    /// Exit monitoring gave up; the position is open and unwatched
    MonitorFailed {
        round_id: Uuid,
        symbol: String,
        error: String,
    },
    TradingHalted {
        reason: StopReason,
        state: PerformanceState,
    },
}

impl Notification {
    /// Plain-text message body
    pub fn message(&self) -> String {
        match self {
            Notification::RoundStarted {
                symbol,
                entry_price,
                volume,
                take_profit,
                stop_loss,
                reasons,
                ..
            } => {
                let mut msg = format!(
                    "🟢 **{} entry**\nPrice: {}\nVolume: {:.8}\nTarget: {}\nStop: {}",
                    symbol,
                    format_price(*entry_price),
                    volume,
                    take_profit.map(format_price).unwrap_or_else(|| "-".to_string()),
                    stop_loss.map(format_price).unwrap_or_else(|| "-".to_string()),
                );
                if !reasons.is_empty() {
                    msg.push_str("\nReasons:\n");
                    msg.push_str(&crate::oracle::format_reasons(reasons));
                }
                msg
            }
            Notification::RoundFinished { summary, pnl } => {
                let rate = summary
                    .metrics
                    .as_ref()
                    .map(|m| format!("{:+.2}%", m.profit_loss_rate))
                    .unwrap_or_else(|| "-".to_string());
                format!(
                    "{} **{} round {}**\nP&L: {} ({})\nDuration: {:.1} min\nReason: {}",
                    if pnl.unwrap_or_default() > 0.0 { "💰" } else { "🔻" },
                    summary.symbol,
                    summary.status,
                    pnl.map(format_price).unwrap_or_else(|| "-".to_string()),
                    rate,
                    summary.duration_minutes,
                    summary.exit_reason.as_deref().unwrap_or("-"),
                )
            }
            Notification::ExitRolledBack { symbol, error, .. } => {
                format!("⚠️ **{} exit failed**, position still open\n{}", symbol, error)
            }
            Notification::RoundFailed {
                symbol,
                error,
                position_open,
                ..
            } => {
                let mut msg = format!("❌ **{} round failed**\n{}", symbol, error);
                if *position_open {
                    msg.push_str("\nPosition may still be open, check the exchange");
                }
                msg
            }
            Notification::MonitorFailed { symbol, error, .. } => {
                format!("🚨 **{} monitoring stopped**, position open\n{}", symbol, error)
            }
            Notification::TradingHalted { reason, state } => format!(
                "🛑 **Trading halted: {}**\nTrades: {} (W {} / L {})\nP&L: {}",
                reason,
                state.trade_count,
                state.win_count,
                state.loss_count,
                format_price(state.cumulative_pnl)
            ),
        }
    }
}

/// Thousands-separated whole number, e.g. `101,150,000`
pub fn format_price(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{}", rounded.abs() as u64);
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if rounded < 0.0 {
        format!("-{}", out)
    } else {
        out
    }
}

/// Best-effort delivery; callers log and ignore failures
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Posts `{"content": ...}` to a Discord webhook
pub struct DiscordNotifier {
    client: Client,
    webhook_url: String,
}

impl DiscordNotifier {
    pub fn new(webhook_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Notification(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            webhook_url,
        })
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&serde_json::json!({ "content": notification.message() }))
            .send()
            .await
            .map_err(|e| Error::Notification(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Notification(format!(
                "webhook returned {}: {}",
                status, body
            )));
        }

        Ok(())
    }
}

/// Writes notifications to the log
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        tracing::info!("📣 {}", notification.message().replace('\n', " | "));
        Ok(())
    }
}
