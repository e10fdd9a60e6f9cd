use anyhow::Context;
use clap::{Parser, Subcommand};
use scalper::audit::{AuditLog, JsonLinesAuditLog, TracingAuditLog};
use scalper::exchange::{ExchangeClient, PaperExchange, SyntheticFeed};
use scalper::execution::shutdown_signalled;
use scalper::notify::{DiscordNotifier, LogNotifier, Notifier};
use scalper::oracle::registry::StrategyRegistry;
use scalper::risk::PerformanceAccumulator;
use scalper::round::{Collaborators, RoundManager, RoundRegistry};
use scalper::{Error, Settings};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "scalper", about = "Scalping round engine (paper trading)")]
struct Cli {
    /// Settings file (defaults to ./scalper.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Trade the configured symbols until Ctrl+C or a circuit breaker trips
    Run,
    /// Print the effective settings as JSON
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("loading settings")?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
        Command::Run => {
            setup_logging();
            run(settings).await
        }
    }
}

// ============================================================================
// Initialization Functions
// ============================================================================

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("scalper=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn create_notifier(settings: &Settings) -> anyhow::Result<Arc<dyn Notifier>> {
    let webhook = settings
        .notify
        .discord_webhook_url
        .clone()
        .or_else(|| std::env::var("DISCORD_WEBHOOK_URL").ok());

    match webhook {
        Some(url) => {
            tracing::info!("Discord notifications enabled");
            Ok(Arc::new(DiscordNotifier::new(url)?))
        }
        None => Ok(Arc::new(LogNotifier)),
    }
}

fn create_audit_log(settings: &Settings) -> Arc<dyn AuditLog> {
    match &settings.audit.path {
        Some(path) => {
            tracing::info!("Audit log: {}", path.display());
            Arc::new(JsonLinesAuditLog::new(path.clone()))
        }
        None => Arc::new(TracingAuditLog),
    }
}

// ============================================================================
// Trading
// ============================================================================

async fn run(settings: Settings) -> anyhow::Result<()> {
    tracing::info!("🚀 Scalper starting (paper trading)");

    let feed = Arc::new(SyntheticFeed::new(
        settings.paper.start_price,
        settings.paper.volatility,
        settings.paper.seed,
    ));
    let paper = Arc::new(PaperExchange::from_settings(
        feed.clone(),
        settings.trading.quote_currency.clone(),
        &settings.paper,
    ));
    let exchange: Arc<dyn ExchangeClient> = paper.clone();

    let strategies =
        StrategyRegistry::with_builtins(&settings.oracle, std::env::var("OPENAI_API_KEY").ok())?;
    let oracle = strategies.get(&settings.oracle.strategy, settings.oracle.version)?;

    let registry = Arc::new(RoundRegistry::new(
        settings.trading.max_active_rounds,
        settings.trading.history_capacity,
    ));
    let performance = Arc::new(PerformanceAccumulator::new(settings.risk.clone()));

    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Strategy: {} v{}", oracle.name(), oracle.version());
    tracing::info!("  Symbols: {}", settings.trading.symbols.join(", "));
    tracing::info!(
        "  Entry size: {:.0}% of free {}",
        settings.trading.entry_fraction * 100.0,
        settings.trading.quote_currency
    );
    tracing::info!("  Max active rounds: {}", settings.trading.max_active_rounds);
    tracing::info!(
        "  Breakers: {} losses in a row, drawdown {:.1}%",
        settings.risk.max_consecutive_losses,
        settings.risk.max_drawdown * 100.0
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let manager = Arc::new(RoundManager::new(
        registry,
        performance.clone(),
        Collaborators {
            exchange,
            snapshots: feed.clone(),
            oracle,
            audit: create_audit_log(&settings),
            notifier: create_notifier(&settings)?,
        },
        settings.trading.clone(),
        settings.confirmer.schedule(),
        shutdown_rx.clone(),
    ));

    tracing::info!("\n🔄 Spawning symbol loops...");
    let mut tasks = Vec::new();
    for symbol in settings.trading.symbols.clone() {
        let manager = manager.clone();
        let shutdown = shutdown_rx.clone();
        let cooldown = settings.trading.round_cooldown();
        tasks.push(tokio::spawn(async move {
            symbol_loop(manager, symbol, cooldown, shutdown).await;
        }));
    }
    tracing::info!("\nPress Ctrl+C to stop...\n");

    let all_done = join_symbol_loops(tasks);
    tokio::pin!(all_done);
    let interrupted = tokio::select! {
        _ = tokio::signal::ctrl_c() => true,
        _ = &mut all_done => false,
    };
    if interrupted {
        tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
        shutdown_tx.send_replace(true);
        all_done.await;
    } else {
        tracing::info!("All symbol loops stopped");
    }

    let state = performance.snapshot();
    tracing::info!("\n📊 Session summary:");
    tracing::info!(
        "  Trades: {} (W {} / L {}, win rate {:.1}%)",
        state.trade_count,
        state.win_count,
        state.loss_count,
        state.win_rate() * 100.0
    );
    tracing::info!("  P&L: {:.0} ({:+.2}%)", state.cumulative_pnl, state.profit_rate() * 100.0);
    tracing::info!(
        "  Paper equity: {:.0} {}",
        paper.equity(),
        settings.trading.quote_currency
    );
    if let Some(reason) = performance.halted() {
        tracing::info!("  Halted: {}", reason);
    }

    tracing::info!("👋 Scalper stopped");
    Ok(())
}

async fn join_symbol_loops(tasks: Vec<tokio::task::JoinHandle<()>>) {
    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!("Symbol loop panicked: {}", e);
        }
    }
}

/// One round at a time for `symbol`, with a pause between rounds.
///
/// A round still open from an earlier pass (e.g. after a monitor failure)
/// is resumed before a new one is created.
async fn symbol_loop(
    manager: Arc<RoundManager>,
    symbol: String,
    cooldown: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!("💹 [{}] Loop starting", symbol);

    loop {
        if *shutdown.borrow() {
            break;
        }

        let result = match manager.registry().active_for_symbol(&symbol) {
            Some(id) => manager.resume(id).await,
            None => manager.run_round(&symbol).await,
        };

        match result {
            Ok(outcome) => {
                let pnl = outcome.result.as_ref().map(|r| r.pnl).unwrap_or_default();
                tracing::info!(
                    "💹 [{}] Round {} {} (P&L {:.0})",
                    symbol,
                    outcome.summary.round_id,
                    outcome.summary.status,
                    pnl
                );
            }
            Err(Error::Cancelled) => break,
            Err(Error::StopReasonTripped(reason)) => {
                tracing::warn!("🛑 [{}] Trading halted: {}", symbol, reason);
                break;
            }
            Err(Error::RegistryFull(_)) | Err(Error::SymbolActive(_)) => {
                tracing::debug!("[{}] No round slot available", symbol);
            }
            Err(e) => {
                tracing::warn!("[{}] Round ended with error: {}", symbol, e);
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(cooldown) => {}
            _ = shutdown_signalled(&mut shutdown) => break,
        }
    }

    tracing::info!("💹 [{}] Loop stopped", symbol);
}
