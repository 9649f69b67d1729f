//! Intradar report binary
//!
//! Replays the paper-trading event log, prints the session dashboard and
//! writes the performance report. An optional first argument exports the
//! trade history to that path, as JSON for a `.json` extension and CSV
//! otherwise.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use intradar::config::AppConfig;
use intradar::paper_trading::PaperTradingEngine;
use intradar::persistence::{ExportFormat, TradeJournal};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("INTRADAR_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::load()?;
    info!(config = %config, "🚀 Intradar starting");

    let journal = TradeJournal::open(Path::new(&config.persistence.log_dir))?
        .with_json_snapshot(config.persistence.json_snapshot_enabled);
    let mut engine = PaperTradingEngine::new(config.to_engine_config()?).with_journal(journal);

    let restored = engine.load_history()?;
    info!(trades = restored, "{}", engine.summary_string());
    engine.print_dashboard();

    let report_path = engine
        .save_performance_report()
        .context("Failed to write performance report")?;
    info!(path = %report_path.display(), "✅ Performance report ready");

    if let Some(export) = std::env::args().nth(1).map(PathBuf::from) {
        engine.export_trade_history(&export, ExportFormat::from_path(&export))?;
    }

    Ok(())
}
