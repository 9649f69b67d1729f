//! Trade log persistence
//!
//! One append-only CSV event log is the source of truth: an OPEN row when a
//! trade is accepted and a CLOSE row when it is closed. The JSON snapshot and
//! the performance reports are derived views written for external tools.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

use crate::types::{Side, Trade};

pub const EVENT_LOG_FILE: &str = "trade_log.csv";
pub const SNAPSHOT_FILE: &str = "paper_trades.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeEvent {
    Open,
    Close,
}

impl fmt::Display for TradeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeEvent::Open => write!(f, "OPEN"),
            TradeEvent::Close => write!(f, "CLOSE"),
        }
    }
}

/// One row of the event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEventRecord {
    pub timestamp: DateTime<Utc>,
    pub trade_id: String,
    pub event: TradeEvent,
    pub symbol: String,
    /// Side of this leg: the trade side on OPEN, the flattening side on CLOSE
    pub side: Side,
    pub qty: i64,
    pub price: f64,
    pub order_value: f64,
    pub pnl: f64,
    pub cumulative_pnl: f64,
    pub strategy: String,
    /// Entry signal text on OPEN, exit reason on CLOSE
    pub reason: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Margin reserved (OPEN) or released (CLOSE)
    #[serde(default)]
    pub margin: f64,
}

impl TradeEventRecord {
    pub fn open(trade: &Trade, cumulative_pnl: f64) -> Self {
        Self {
            timestamp: trade.entry_timestamp,
            trade_id: trade.trade_id.clone(),
            event: TradeEvent::Open,
            symbol: trade.symbol.clone(),
            side: trade.side,
            qty: trade.quantity,
            price: trade.entry_price,
            order_value: trade.notional(),
            pnl: 0.0,
            cumulative_pnl,
            strategy: trade.strategy.clone(),
            reason: trade.strategy_signal.clone(),
            confidence: trade.confidence,
            margin: trade.margin_reserved,
        }
    }

    /// CLOSE row for a trade that has already been closed in memory
    pub fn close(trade: &Trade, cumulative_pnl: f64) -> Self {
        let price = trade.exit_price.unwrap_or(trade.entry_price);
        Self {
            timestamp: trade.exit_timestamp.unwrap_or_else(Utc::now),
            trade_id: trade.trade_id.clone(),
            event: TradeEvent::Close,
            symbol: trade.symbol.clone(),
            side: trade.side.opposite(),
            qty: trade.quantity,
            price,
            order_value: price * trade.quantity as f64,
            pnl: trade.pnl,
            cumulative_pnl,
            strategy: trade.strategy.clone(),
            reason: trade
                .exit_reason
                .map(|r| r.to_string())
                .unwrap_or_default(),
            confidence: trade.confidence,
            margin: trade.margin_reserved,
        }
    }
}

/// Event log writer plus derived JSON views, all under one directory
pub struct TradeJournal {
    dir: PathBuf,
    events_path: PathBuf,
    snapshot_path: PathBuf,
    writer: csv::Writer<File>,
    json_snapshot: bool,
}

impl TradeJournal {
    /// Open (or create) the journal in `dir`
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

        let events_path = dir.join(EVENT_LOG_FILE);
        let writer = Self::create_writer(&events_path)?;

        Ok(Self {
            dir: dir.to_path_buf(),
            snapshot_path: dir.join(SNAPSHOT_FILE),
            events_path,
            writer,
            json_snapshot: true,
        })
    }

    pub fn with_json_snapshot(mut self, enabled: bool) -> Self {
        self.json_snapshot = enabled;
        self
    }

    fn create_writer(path: &Path) -> Result<csv::Writer<File>> {
        let file_has_data =
            path.exists() && fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open event log {}", path.display()))?;

        Ok(WriterBuilder::new()
            .has_headers(!file_has_data)
            .from_writer(file))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn events_path(&self) -> &Path {
        &self.events_path
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Append one event and flush it to disk
    pub fn append(&mut self, record: &TradeEventRecord) -> Result<()> {
        self.writer
            .serialize(record)
            .context("Failed to write trade event")?;
        self.writer.flush().context("Failed to flush event log")?;
        Ok(())
    }

    /// Read every event in file order. Malformed rows are skipped.
    pub fn load_events(&self) -> Result<Vec<TradeEventRecord>> {
        if !self.events_path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.events_path)
            .with_context(|| format!("Failed to open {}", self.events_path.display()))?;
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);

        let mut records = Vec::new();
        let mut skipped = 0usize;
        for (row, result) in reader.deserialize::<TradeEventRecord>().enumerate() {
            match result {
                Ok(record) => records.push(record),
                Err(e) => {
                    skipped += 1;
                    warn!(row = row + 1, error = %e, "[PAPER] Skipping malformed event row");
                }
            }
        }
        if skipped > 0 {
            warn!(
                path = %self.events_path.display(),
                skipped,
                loaded = records.len(),
                "[PAPER] Event log contained unreadable rows"
            );
        }
        Ok(records)
    }

    /// Rewrite the JSON array of all trades (temp file + rename)
    pub fn write_snapshot(&self, trades: &[Trade]) -> Result<()> {
        if !self.json_snapshot {
            return Ok(());
        }
        write_json_atomic(&self.snapshot_path, trades)
    }

    /// Write a pretty-printed JSON document into the journal directory
    pub fn write_report<T: Serialize>(&self, filename: &str, report: &T) -> Result<PathBuf> {
        let path = self.dir.join(filename);
        write_json_atomic(&path, report)?;
        info!(path = %path.display(), "💾 [PAPER] Report saved");
        Ok(path)
    }
}

fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize JSON")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("Failed writing {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed moving {} to {}", tmp.display(), path.display()))?;
    Ok(())
}

/// File format for trade history exports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    /// Pick the format from the file extension, CSV unless it is `.json`
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ExportFormat::Json,
            _ => ExportFormat::Csv,
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Csv => write!(f, "csv"),
            ExportFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(anyhow!("Unknown export format: {}", other)),
        }
    }
}

/// Export trades, one record per trade in its current state. CSV is a flat
/// table; JSON is an array written atomically.
pub fn export_trades(trades: &[Trade], path: &Path, format: ExportFormat) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    match format {
        ExportFormat::Csv => {
            let mut writer = WriterBuilder::new()
                .has_headers(true)
                .from_path(path)
                .with_context(|| format!("Failed to create export {}", path.display()))?;
            for trade in trades {
                writer
                    .serialize(trade)
                    .context("Failed to write exported trade")?;
            }
            writer.flush().context("Failed to flush export")?;
        }
        ExportFormat::Json => write_json_atomic(path, trades)?,
    }
    info!(
        path = %path.display(),
        format = %format,
        trades = trades.len(),
        "📤 [PAPER] Trade history exported"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExitReason, TradeStatus};
    use chrono::TimeZone;

    fn temp_log_dir(test_name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "intradar_persistence_{}_{}",
            test_name,
            uuid::Uuid::new_v4()
        ))
    }

    fn sample_trade() -> Trade {
        Trade {
            trade_id: "PT_s_0001".to_string(),
            symbol: "RELIANCE.NS".to_string(),
            side: Side::Buy,
            entry_price: 2_500.0,
            quantity: 4,
            entry_timestamp: Utc.with_ymd_and_hms(2024, 5, 6, 9, 45, 0).unwrap(),
            exit_price: None,
            exit_timestamp: None,
            pnl: 0.0,
            status: TradeStatus::Open,
            strategy: "balanced".to_string(),
            strategy_signal: "BREAKOUT_LONG: R:2498.00".to_string(),
            confidence: Some(42.0),
            margin_reserved: 2_000.0,
            exit_reason: None,
        }
    }

    #[test]
    fn append_writes_header_once_across_reopen() {
        let dir = temp_log_dir("header_once");
        let trade = sample_trade();

        {
            let mut journal = TradeJournal::open(&dir).unwrap();
            journal
                .append(&TradeEventRecord::open(&trade, 0.0))
                .unwrap();
        }
        {
            let mut closed = trade.clone();
            closed.close(
                2_510.0,
                Utc.with_ymd_and_hms(2024, 5, 6, 9, 52, 0).unwrap(),
                ExitReason::TakeProfit,
            );
            let mut journal = TradeJournal::open(&dir).unwrap();
            journal
                .append(&TradeEventRecord::close(&closed, 40.0))
                .unwrap();
        }

        let content = fs::read_to_string(dir.join(EVENT_LOG_FILE)).unwrap();
        let mut lines = content.lines();
        let header = lines.next().unwrap_or_default();
        assert!(
            header.starts_with(concat!(
                "timestamp,trade_id,event,symbol,side,qty,price,order_value,",
                "pnl,cumulative_pnl,strategy,reason"
            )),
            "unexpected header line: {}",
            header
        );
        assert_eq!(lines.count(), 2, "expected exactly two event rows");

        let events = TradeJournal::open(&dir).unwrap().load_events().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, TradeEvent::Open);
        assert_eq!(events[1].event, TradeEvent::Close);
        assert_eq!(events[1].side, Side::Sell);
        assert_eq!(events[1].reason, "TAKE_PROFIT");
        assert_eq!(events[1].pnl, 40.0);
        assert_eq!(events[0].confidence, Some(42.0));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn load_events_skips_malformed_rows() {
        let dir = temp_log_dir("malformed");
        let trade = sample_trade();
        {
            let mut journal = TradeJournal::open(&dir).unwrap();
            journal
                .append(&TradeEventRecord::open(&trade, 0.0))
                .unwrap();
        }
        let mut content = fs::read_to_string(dir.join(EVENT_LOG_FILE)).unwrap();
        content.push_str("not-a-date,PT_s_0002,OPEN,X,BUY,abc,1,1,0,0,s,r,,0\n");
        fs::write(dir.join(EVENT_LOG_FILE), content).unwrap();

        let events = TradeJournal::open(&dir).unwrap().load_events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].trade_id, "PT_s_0001");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_log_loads_empty() {
        let dir = temp_log_dir("missing");
        let journal = TradeJournal::open(&dir).unwrap();
        fs::remove_file(journal.events_path()).unwrap();
        assert!(journal.load_events().unwrap().is_empty());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn snapshot_is_a_json_array_of_trades() {
        let dir = temp_log_dir("snapshot");
        let journal = TradeJournal::open(&dir).unwrap();
        journal.write_snapshot(&[sample_trade()]).unwrap();

        let raw = fs::read_to_string(journal.snapshot_path()).unwrap();
        let parsed: Vec<Trade> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, vec![sample_trade()]);
        assert!(raw.contains("\"status\": \"OPEN\""));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn export_writes_one_row_per_trade() {
        let dir = temp_log_dir("export");
        let path = dir.join("exports").join("history.csv");
        export_trades(&[sample_trade(), sample_trade()], &path, ExportFormat::Csv).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("trade_id,symbol,side,entry_price"));
        assert_eq!(content.lines().count(), 3);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn json_export_reads_back_as_trades() {
        let dir = temp_log_dir("export_json");
        let path = dir.join("exports").join("history.json");
        let mut closed = sample_trade();
        closed.close(
            2_490.0,
            Utc.with_ymd_and_hms(2024, 5, 6, 10, 5, 0).unwrap(),
            ExitReason::StopLoss,
        );
        let trades = vec![sample_trade(), closed];

        export_trades(&trades, &path, ExportFormat::from_path(&path)).unwrap();

        let parsed: Vec<Trade> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, trades);
        assert_eq!(parsed[1].status, TradeStatus::Closed);
        assert!(!path.with_extension("json.tmp").exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn export_format_from_path_and_str() {
        assert_eq!(ExportFormat::from_path(Path::new("out/h.JSON")), ExportFormat::Json);
        assert_eq!(ExportFormat::from_path(Path::new("out/h.csv")), ExportFormat::Csv);
        assert_eq!(ExportFormat::from_path(Path::new("history")), ExportFormat::Csv);
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("xml".parse::<ExportFormat>().is_err());
    }
}
