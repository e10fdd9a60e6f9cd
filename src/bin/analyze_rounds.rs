use anyhow::Context;
use scalper::audit::{read_events, AuditEvent};
use scalper::risk::RoundResult;
use scalper::round::{RoundStatus, RoundSummary};
use std::collections::HashMap;
use std::path::PathBuf;

/// Per-round report and totals from a JSON-lines audit file
///
/// Usage: analyze_rounds [AUDIT_FILE]   (default: $SCALPER__AUDIT__PATH or audit.jsonl)
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("scalper=warn")
        .init();

    let path: PathBuf = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SCALPER__AUDIT__PATH").ok())
        .unwrap_or_else(|| "audit.jsonl".to_string())
        .into();

    let events = read_events(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;

    println!("\n═══════════════════════════════════════════════════════");
    println!("                ROUND ANALYSIS");
    println!("═══════════════════════════════════════════════════════\n");
    println!("Source: {} ({} events)\n", path.display(), events.len());

    let mut rounds: Vec<(RoundSummary, Option<RoundResult>)> = Vec::new();
    let mut rollbacks: HashMap<String, usize> = HashMap::new();
    let mut halts = Vec::new();

    for event in events {
        match event {
            AuditEvent::RoundFinished { summary, result } => rounds.push((summary, result)),
            AuditEvent::PhaseFailed { phase, step, .. } => {
                *rollbacks.entry(format!("{}/{}", phase, step)).or_insert(0) += 1;
            }
            AuditEvent::TradingHalted { reason, at, .. } => halts.push((reason, at)),
            _ => {}
        }
    }

    if rounds.is_empty() {
        println!("No finished rounds.");
        return Ok(());
    }

    println!(
        "{:<5} {:<8} {:<10} {:<17} {:>14} {:>14} {:>8} {:>8}  {}",
        "#", "Symbol", "Status", "Start", "Entry", "Exit", "P&L%", "Min", "Reason"
    );
    println!("{}", "─".repeat(110));

    for (i, (summary, _)) in rounds.iter().enumerate() {
        let rate = summary
            .metrics
            .as_ref()
            .map(|m| format!("{:+.2}", m.profit_loss_rate))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<5} {:<8} {:<10} {:<17} {:>14} {:>14} {:>8} {:>8.1}  {}",
            i + 1,
            summary.symbol,
            summary.status.as_str(),
            summary.start_time.format("%Y-%m-%d %H:%M"),
            summary.entry_price.map(|p| format!("{:.0}", p)).unwrap_or_else(|| "-".into()),
            summary.exit_price.map(|p| format!("{:.0}", p)).unwrap_or_else(|| "-".into()),
            rate,
            summary.duration_minutes,
            summary.exit_reason.as_deref().unwrap_or("-")
        );
    }

    let results: Vec<&RoundResult> = rounds.iter().filter_map(|(_, r)| r.as_ref()).collect();
    let failed = rounds
        .iter()
        .filter(|(s, _)| s.status == RoundStatus::Failed)
        .count();
    let wins = results.iter().filter(|r| r.is_win).count();
    let total_pnl: f64 = results.iter().map(|r| r.pnl).sum();
    let total_fees: f64 = results.iter().map(|r| r.fee).sum();

    println!("\n═══════════════════════════════════════════════════════");
    println!("                    SUMMARY");
    println!("═══════════════════════════════════════════════════════\n");
    println!("Rounds:              {} ({} completed, {} failed)", rounds.len(), results.len(), failed);
    if !results.is_empty() {
        println!(
            "Win Rate:            {:.1}% ({} W / {} L)",
            wins as f64 / results.len() as f64 * 100.0,
            wins,
            results.len() - wins
        );
        println!("Total P&L:           {:+.0}", total_pnl);
        println!("Average P&L:         {:+.0}", total_pnl / results.len() as f64);
        println!("Fees Paid:           {:.0}", total_fees);
    }

    if !rollbacks.is_empty() {
        println!("\nPhase failures:");
        let mut steps: Vec<_> = rollbacks.into_iter().collect();
        steps.sort_by(|a, b| b.1.cmp(&a.1));
        for (step, count) in steps {
            println!("  {:<28} {:>4}", step, count);
        }
    }

    for (reason, at) in halts {
        println!("\n🛑 Trading halted at {}: {}", at.format("%Y-%m-%d %H:%M:%S"), reason);
    }

    Ok(())
}
