use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use ro_market_analyzer::analyzer::PriceAnalyzer;
use ro_market_analyzer::config::EngineConfig;
use ro_market_analyzer::intel::IntelligenceLayer;
use ro_market_analyzer::loader::{load_snapshot, save_snapshot};
use ro_market_analyzer::model::ListingRecord;
use ro_market_analyzer::store::MarketStore;
use ro_market_analyzer::trading::TradingEngine;
use ro_market_analyzer::Result;

#[derive(Parser)]
#[command(name = "ro_market_analyzer", about = "Market intelligence over observed shop listings")]
struct Cli {
    /// Snapshot database.
    #[arg(long, default_value = "ro_market.db")]
    db: PathBuf,

    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Append listings from a JSON array file to the snapshot.
    Ingest { file: PathBuf },
    /// Print market health, alerts and opportunities.
    Report {
        #[arg(long, default_value_t = 10_000_000)]
        budget: i64,
        #[arg(long, default_value_t = 0.5)]
        risk: f64,
    },
    /// Drop data older than the retention window.
    Cleanup,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match EngineConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("failed to load config: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => EngineConfig::default(),
    };
    config.logging.init();

    match run(cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, config: EngineConfig) -> Result<()> {
    let snapshot = load_snapshot(&cli.db)?;
    let store = Arc::new(MarketStore::from_snapshot(snapshot, &config.market));

    match cli.command {
        Command::Ingest { file } => {
            let content = std::fs::read_to_string(&file)?;
            let records: Vec<ListingRecord> = serde_json::from_str(&content)?;
            let report = store.ingest_batch(records);
            save_snapshot(&cli.db, &store.snapshot())?;
            info!(accepted = report.accepted, rejected = report.rejected, "ingest finished");
        }
        Command::Cleanup => {
            let removed = store.cleanup_expired();
            save_snapshot(&cli.db, &store.snapshot())?;
            println!("removed {removed} records");
        }
        Command::Report { budget, risk } => {
            let analyzer = Arc::new(PriceAnalyzer::new(store.clone(), config.analyzer.clone()));
            let trading = Arc::new(TradingEngine::new(
                store.clone(),
                analyzer.clone(),
                config.trading.clone(),
            ));
            let intel = IntelligenceLayer::new(
                store.clone(),
                analyzer,
                trading.clone(),
                config.intelligence.clone(),
            );
            print_report(&store, &trading, &intel, budget, risk);
        }
    }
    Ok(())
}

fn print_report(
    store: &MarketStore,
    trading: &TradingEngine,
    intel: &IntelligenceLayer,
    budget: i64,
    risk: f64,
) {
    let health = intel.analyze_market_health();
    println!(
        "Market: {} ({} items, {} rising, {} falling, {} volatile)",
        health.health, health.total_items, health.rising, health.falling, health.volatile
    );

    for item_id in store.item_ids() {
        intel.detect_manipulation(item_id);
    }
    let alerts = intel.recent_alerts(None);
    if !alerts.is_empty() {
        println!("\nAlerts:");
        for a in &alerts {
            println!("  [{}] {}", a.severity, a.description);
        }
    }

    let trades = trading.recommended_trades(budget, risk);
    if !trades.is_empty() {
        println!("\nRecommended trades (budget {budget}):");
        for t in &trades {
            println!(
                "  {:<24} buy {:>10} @ {:<12} sell {:>10} @ {:<12} profit {:>9} risk {:.2}",
                t.name, t.buy_price, t.buy_source, t.sell_price, t.sell_source, t.profit, t.risk
            );
        }
    }

    let hot = intel.hot_items(10);
    if !hot.is_empty() {
        println!("\nHot items:");
        for h in &hot {
            println!("  {:<24} volume {:>8} trend {}", h.name, h.volume, h.trend);
        }
    }

    let cheap = intel.undervalued_items(10);
    if !cheap.is_empty() {
        println!("\nUndervalued:");
        for u in &cheap {
            println!(
                "  {:<24} median {:>10.0} vs 30d mean {:>10.0} (-{:.1}%)",
                u.name, u.current_median, u.historical_mean, u.discount_percent
            );
        }
    }

    let events = intel.predict_market_events(7);
    if !events.is_empty() {
        println!("\nExpected moves (7d):");
        for e in &events {
            println!(
                "  {:<24} {:>10} -> {:>10} ({:+.1}%, confidence {:.2})",
                e.name, e.current_price, e.predicted_price, e.change_pct, e.confidence
            );
        }
    }
}
