//! LLM-backed decision oracle using the OpenAI chat completions API
//!
//! The model sees a compact text rendering of the market snapshot (and the
//! open position for exits) and must answer with a JSON object.
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use super::{DecisionOracle, EntryJudgment, ExitJudgment, PositionView};
use crate::config::OracleSettings;
use crate::error::{Error, Result};
use crate::models::MarketSnapshot;

const MAX_TOKENS: u32 = 512;
const TEMPERATURE: f32 = 0.1;
const REQUESTS_PER_MINUTE: u32 = 20;
const RETRY_DELAY_MS: u64 = 1000; // doubled per retry
const MAX_RETRIES: u32 = 3;
const PROMPT_CANDLES: usize = 20;

const SYSTEM_PROMPT: &str = "You are a disciplined short-term cryptocurrency scalper. \
Judge only from the data given. Always respond with a single JSON object, no markdown.";

type OracleRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    content: String,
}

#[derive(Debug, Deserialize)]
struct EntryReply {
    should_enter: bool,
    target_price: Option<f64>,
    stop_price: Option<f64>,
    #[serde(default)]
    reasons: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ExitReply {
    should_exit: bool,
    #[serde(default)]
    reasons: Vec<String>,
}

pub struct LlmOracle {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
    rate_limiter: Arc<OracleRateLimiter>,
    retry_delay: Duration,
}

impl LlmOracle {
    pub fn new(api_key: String, model: String, base_url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Oracle(format!("failed to build HTTP client: {}", e)))?;

        let quota = Quota::per_minute(NonZeroU32::new(REQUESTS_PER_MINUTE).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            client,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
        })
    }

    pub fn from_settings(api_key: String, settings: &OracleSettings) -> Result<Self> {
        Self::new(
            api_key,
            settings.openai_model.clone(),
            settings.openai_base_url.clone(),
        )
    }

    /// Base delay before the first retry
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Send one prompt and return the model's JSON text, retrying transient failures
    async fn complete(&self, prompt: String) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut retry_count = 0;

        loop {
            if retry_count > 0 {
                let delay = self.retry_delay * 2_u32.pow(retry_count - 1); // Exponential backoff
                tokio::time::sleep(delay).await;
            }
            self.rate_limiter.until_ready().await;

            let request = OpenAIRequest {
                model: self.model.clone(),
                max_tokens: MAX_TOKENS,
                temperature: TEMPERATURE,
                messages: vec![
                    Message {
                        role: "system".to_string(),
                        content: SYSTEM_PROMPT.to_string(),
                    },
                    Message {
                        role: "user".to_string(),
                        content: prompt.clone(),
                    },
                ],
                response_format: ResponseFormat {
                    kind: "json_object".to_string(),
                },
            };

            let last_error = match self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await
            {
                Err(e) => format!("Network error: {}", e),
                Ok(response) if !response.status().is_success() => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    let error = format!("OpenAI API error {}: {}", status, body);

                    // Only rate limits and server errors are worth retrying
                    if status.as_u16() != 429 && !status.is_server_error() {
                        return Err(Error::Oracle(error));
                    }
                    error
                }
                Ok(response) => match response.json::<OpenAIResponse>().await {
                    Ok(parsed) => match parsed.choices.into_iter().next() {
                        Some(choice) => return Ok(strip_code_fence(&choice.message.content)),
                        None => "OpenAI response had no choices".to_string(),
                    },
                    Err(e) => format!("JSON decode error: {}", e),
                },
            };

            retry_count += 1;
            tracing::warn!(attempt = retry_count, "LLM request failed: {}", last_error);
            if retry_count >= MAX_RETRIES {
                return Err(Error::Oracle(last_error));
            }
        }
    }

    fn entry_prompt(snapshot: &MarketSnapshot) -> String {
        format!(
            "{}\n\
             Decide whether to open a long position now.\n\
             Respond as {{\"should_enter\": bool, \"target_price\": number, \"stop_price\": number, \"reasons\": [string, string, string]}}.\n\
             target_price must be above the current price and stop_price below it.",
            describe_market(snapshot)
        )
    }

    fn exit_prompt(position: &PositionView, snapshot: &MarketSnapshot) -> String {
        let mut text = describe_market(snapshot);
        text.push_str(&format!(
            "\nOpen position: entry {:.0}, volume {:.8}, held {:.1} min",
            position.entry_price, position.volume, position.holding_minutes
        ));
        if let Some(tp) = position.take_profit {
            text.push_str(&format!(", target {:.0}", tp));
        }
        if let Some(sl) = position.stop_loss {
            text.push_str(&format!(", stop {:.0}", sl));
        }
        if let Some(metrics) = &position.metrics {
            text.push_str(&format!(
                ", P&L {:+.2}% (best {:+.2}%, worst {:+.2}%)",
                metrics.profit_loss_rate, metrics.max_profit_rate, metrics.max_loss_rate
            ));
        }
        text.push_str(
            "\nDecide whether to close the position now.\n\
             Respond as {\"should_exit\": bool, \"reasons\": [string]}.",
        );
        text
    }
}

/// Plain-text market summary shared by entry and exit prompts
fn describe_market(snapshot: &MarketSnapshot) -> String {
    let mut text = format!(
        "Market: {}\nTime: {}\nCurrent price: {:.0}",
        snapshot.symbol,
        snapshot.timestamp.to_rfc3339(),
        snapshot.price
    );

    if !snapshot.indicators.is_empty() {
        text.push_str("\nIndicators:");
        for (name, value) in &snapshot.indicators {
            text.push_str(&format!("\n  {}: {:.4}", name, value));
        }
    }

    if let (Some(bid), Some(ask)) = (snapshot.order_book.best_bid(), snapshot.order_book.best_ask()) {
        text.push_str(&format!("\nOrder book: best bid {:.0}, best ask {:.0}", bid, ask));
        if let Some(ratio) = snapshot.order_book.bid_ask_ratio() {
            text.push_str(&format!(", bid/ask volume ratio {:.2}", ratio));
        }
    }

    let start = snapshot.candles.len().saturating_sub(PROMPT_CANDLES);
    if start < snapshot.candles.len() {
        text.push_str("\nRecent candles (open, high, low, close, volume):");
        for c in &snapshot.candles[start..] {
            text.push_str(&format!(
                "\n  {:.0}, {:.0}, {:.0}, {:.0}, {:.4}",
                c.open, c.high, c.low, c.close, c.volume
            ));
        }
    }

    if !snapshot.recent_trades.is_empty() {
        let buy_volume: f64 = snapshot
            .recent_trades
            .iter()
            .filter(|t| t.side == crate::models::OrderSide::Bid)
            .map(|t| t.volume)
            .sum();
        let total_volume: f64 = snapshot.recent_trades.iter().map(|t| t.volume).sum();
        text.push_str(&format!(
            "\nRecent trades: {} ({:.0}% buy volume)",
            snapshot.recent_trades.len(),
            if total_volume > 0.0 { buy_volume / total_volume * 100.0 } else { 0.0 }
        ));
    }

    text
}

/// Strip markdown code fences (```json ... ``` or ``` ... ```)
pub fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
            .to_string()
    } else {
        trimmed.to_string()
    }
}

fn parse_reply<T: serde::de::DeserializeOwned>(text: &str) -> Result<T> {
    serde_json::from_str(text)
        .map_err(|e| Error::Oracle(format!("JSON parse error: {} (text: {})", e, text)))
}

#[async_trait]
impl DecisionOracle for LlmOracle {
    fn name(&self) -> &str {
        "llm"
    }

    async fn entry(&self, snapshot: &MarketSnapshot) -> Result<EntryJudgment> {
        let text = self.complete(Self::entry_prompt(snapshot)).await?;
        let reply: EntryReply = parse_reply(&text)?;

        Ok(EntryJudgment {
            should_enter: reply.should_enter,
            target_price: reply.target_price.unwrap_or(0.0),
            stop_price: reply.stop_price.unwrap_or(0.0),
            reasons: reply.reasons,
        })
    }

    async fn exit(&self, position: &PositionView, snapshot: &MarketSnapshot) -> Result<ExitJudgment> {
        let text = self.complete(Self::exit_prompt(position, snapshot)).await?;
        let reply: ExitReply = parse_reply(&text)?;

        Ok(ExitJudgment {
            should_exit: reply.should_exit,
            reasons: reply.reasons,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion(content: &str) -> String {
        serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        })
        .to_string()
    }

    fn oracle(server: &mockito::Server) -> LlmOracle {
        LlmOracle::new("test-key".to_string(), "gpt-4o-mini".to_string(), server.url())
            .unwrap()
            .with_retry_delay(Duration::ZERO)
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
    }

    #[tokio::test]
    async fn test_entry_reply_parsed() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_body(completion(
                "```json\n{\"should_enter\": true, \"target_price\": 101000000, \"stop_price\": 98500000, \"reasons\": [\"a\", \"b\", \"c\"]}\n```",
            ))
            .create_async()
            .await;

        let judgment = oracle(&server)
            .entry(&MarketSnapshot::at_price("BTC", 100_000_000.0))
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(judgment.should_enter);
        assert_eq!(judgment.target_price, 101_000_000.0);
        assert_eq!(judgment.reasons.len(), 3);
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let mut server = mockito::Server::new_async().await;
        let limited = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .expect(1)
            .create_async()
            .await;
        let ok = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(completion("{\"should_exit\": true, \"reasons\": [\"target\"]}"))
            .create_async()
            .await;

        let position = PositionView {
            symbol: "BTC".to_string(),
            entry_price: 100.0,
            volume: 1.0,
            take_profit: Some(101.0),
            stop_loss: Some(99.0),
            holding_minutes: 3.0,
            metrics: None,
        };
        let judgment = oracle(&server)
            .exit(&position, &MarketSnapshot::at_price("BTC", 101.2))
            .await
            .unwrap();

        limited.assert_async().await;
        ok.assert_async().await;
        assert!(judgment.should_exit);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body("invalid key")
            .expect(1)
            .create_async()
            .await;

        let err = oracle(&server)
            .entry(&MarketSnapshot::at_price("BTC", 100.0))
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, Error::Oracle(_)));
    }

    #[tokio::test]
    async fn test_unparseable_reply_is_oracle_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(completion("I think you should buy"))
            .create_async()
            .await;

        let err = oracle(&server)
            .entry(&MarketSnapshot::at_price("BTC", 100.0))
            .await
            .unwrap_err();

        assert!(err.is_transient());
    }
}
