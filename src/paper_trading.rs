//! Paper Trading Engine
//!
//! Simulates intraday order execution from strategy signals.
//!
//! Key features:
//! - **Margin accounting**: opening reserves a side-specific share of the
//!   notional, closing releases it and credits realized P&L
//! - **Bar-driven exits**: take profit, stop loss and max hold bars per strategy
//! - **Append-only event log**: every OPEN/CLOSE is flushed to CSV, and the
//!   whole session can be rebuilt from it on restart
//! - **Session reports**: win rate, Sharpe, drawdown and market coverage

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::broker::{Broker, Order};
use crate::error::EngineError;
use crate::ledger::{CapitalAccount, MarginModel, PositionLedger};
use crate::performance::{classify_trade_result, win_rate, PerformanceReport};
use crate::persistence::{self, ExportFormat, TradeEvent, TradeEventRecord, TradeJournal};
use crate::risk::{ExitTable, PositionSizer};
use crate::types::{Bar, ExitReason, Signal, Trade, TradeStatus};

// ─────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PaperTradingConfig {
    pub initial_capital: f64,
    pub margin: MarginModel,
    pub sizer: PositionSizer,
    pub exits: ExitTable,
    /// Reject signals for symbols that already hold a position
    pub single_position_per_symbol: bool,
    /// Fixed session id; generated when `None`
    pub session_id: Option<String>,
    /// Write `performance_<session>.json` from `end_session`
    pub write_report_on_end: bool,
}

impl Default for PaperTradingConfig {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            margin: MarginModel::default(),
            sizer: PositionSizer::default(),
            exits: ExitTable::default(),
            single_position_per_symbol: false,
            session_id: None,
            write_report_on_end: true,
        }
    }
}

/// `YYYYMMDD_HHMMSS_<6 hex>` in UTC
pub fn new_session_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), &suffix[..6])
}

/// Ledger / broker disagreement found by [`PaperTradingEngine::reconcile_positions`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionMismatch {
    pub symbol: String,
    pub ledger_qty: i64,
    pub broker_qty: i64,
}

// ─────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────

pub struct PaperTradingEngine {
    config: PaperTradingConfig,
    session_id: String,
    trades: Vec<Trade>,
    /// trade_id → position in `trades`
    index: HashMap<String, usize>,
    ledger: PositionLedger,
    capital: CapitalAccount,
    next_trade_seq: u32,
    cumulative_pnl: f64,
    last_prices: HashMap<String, f64>,
    last_bar_times: HashMap<String, DateTime<Utc>>,
    /// Latest bar timestamp across all symbols
    last_bar_time: Option<DateTime<Utc>>,
    /// Bars seen per symbol
    bar_counts: HashMap<String, u64>,
    /// Bar count of the symbol when each open trade was entered
    entry_bars: HashMap<String, u64>,
    journal: Option<TradeJournal>,
    broker: Option<Box<dyn Broker>>,
}

impl PaperTradingEngine {
    pub fn new(config: PaperTradingConfig) -> Self {
        let session_id = config.session_id.clone().unwrap_or_else(new_session_id);
        info!(
            session_id = %session_id,
            initial_capital = config.initial_capital,
            long_margin_pct = config.margin.long_margin_pct,
            short_margin_pct = config.margin.short_margin_pct,
            "📋 [PAPER] Paper trading session started"
        );
        Self {
            capital: CapitalAccount::new(config.initial_capital),
            config,
            session_id,
            trades: Vec::new(),
            index: HashMap::new(),
            ledger: PositionLedger::new(),
            next_trade_seq: 1,
            cumulative_pnl: 0.0,
            last_prices: HashMap::new(),
            last_bar_times: HashMap::new(),
            last_bar_time: None,
            bar_counts: HashMap::new(),
            entry_bars: HashMap::new(),
            journal: None,
            broker: None,
        }
    }

    /// Attach the event log. A fixed session id that already has rows in
    /// the log continues numbering after them.
    pub fn with_journal(mut self, journal: TradeJournal) -> Self {
        if self.config.session_id.is_some() {
            match journal.load_events() {
                Ok(events) => {
                    let last = self.last_logged_seq(&events);
                    if last > 0 {
                        warn!(
                            session_id = %self.session_id,
                            last_seq = last,
                            "[PAPER] Session already has logged trades, ids continue after them"
                        );
                        self.next_trade_seq = self.next_trade_seq.max(last + 1);
                    }
                }
                Err(e) => warn!(error = %e, "[PAPER] Could not scan event log for trade ids"),
            }
        }
        self.journal = Some(journal);
        self
    }

    /// Mirror every open/close to `broker` and use it for live quotes
    pub fn with_broker(mut self, broker: Box<dyn Broker>) -> Self {
        self.broker = Some(broker);
        self
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn config(&self) -> &PaperTradingConfig {
        &self.config
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn trade(&self, trade_id: &str) -> Option<&Trade> {
        self.index.get(trade_id).map(|&i| &self.trades[i])
    }

    pub fn open_trades(&self) -> Vec<&Trade> {
        self.trades.iter().filter(|t| t.is_open()).collect()
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    pub fn capital(&self) -> &CapitalAccount {
        &self.capital
    }

    /// Realized P&L of all closed trades
    pub fn cumulative_pnl(&self) -> f64 {
        self.cumulative_pnl
    }

    pub fn last_price(&self, symbol: &str) -> Option<f64> {
        self.last_prices.get(symbol).copied()
    }

    fn trade_id_for(&self, seq: u32) -> String {
        format!("PT_{}_{:04}", self.session_id, seq)
    }

    // ── Open ─────────────────────────────────────────────────────

    /// Accept a signal and open a trade. Nothing changes on rejection.
    pub fn open_trade(&mut self, signal: &Signal) -> Result<String, EngineError> {
        let symbol = signal.symbol.as_str();
        let side = signal.action;
        let timestamp = signal.timestamp.unwrap_or_else(Utc::now);
        let price = self.resolve_price(symbol, signal.price)?;

        let quantity = signal
            .quantity
            .unwrap_or_else(|| self.config.sizer.size(price, self.capital.available()));
        if quantity <= 0 {
            return Err(EngineError::InvalidQuantity {
                symbol: symbol.to_string(),
                quantity,
            });
        }

        if self.config.single_position_per_symbol {
            let existing = self.ledger.quantity(symbol);
            if existing != 0 {
                return Err(EngineError::PositionAlreadyOpen {
                    symbol: symbol.to_string(),
                    quantity: existing,
                });
            }
        }

        let margin = self.config.margin.required(side, price, quantity);
        if !self.capital.can_reserve(margin) {
            return Err(EngineError::InsufficientFunds {
                required: margin,
                available: self.capital.available(),
            });
        }

        let trade_id = self.trade_id_for(self.next_trade_seq);
        if let Some(broker) = self.broker.as_mut() {
            let order = Order::limit(symbol, side, quantity, price, &trade_id);
            broker
                .place_order(&order)
                .map_err(|e| EngineError::OrderRejected {
                    symbol: symbol.to_string(),
                    side,
                    reason: e.to_string(),
                })?;
        }

        self.next_trade_seq += 1;
        let trade = Trade {
            trade_id: trade_id.clone(),
            symbol: symbol.to_string(),
            side,
            entry_price: price,
            quantity,
            entry_timestamp: timestamp,
            exit_price: None,
            exit_timestamp: None,
            pnl: 0.0,
            status: TradeStatus::Open,
            strategy: signal.strategy.clone(),
            strategy_signal: signal.strategy_signal.clone(),
            confidence: signal.confidence,
            margin_reserved: margin,
            exit_reason: None,
        };

        let net_qty = self.ledger.open(symbol, side, quantity);
        self.capital.reserve(margin);
        let bars_seen = self.bar_counts.get(symbol).copied().unwrap_or(0);
        self.entry_bars.insert(trade_id.clone(), bars_seen);
        self.index.insert(trade_id.clone(), self.trades.len());
        self.trades.push(trade);

        let record =
            TradeEventRecord::open(&self.trades[self.trades.len() - 1], self.cumulative_pnl);
        self.record_event(record);

        info!(
            trade_id = %trade_id,
            symbol = %symbol,
            side = %side,
            qty = quantity,
            price = %format!("₹{:.2}", price),
            order_value = %format!("₹{:.2}", price * quantity as f64),
            margin = %format!("₹{:.2}", margin),
            net_position = net_qty,
            strategy = %signal.strategy,
            signal = %signal.strategy_signal,
            capital = %format!("₹{:.2}", self.capital.available()),
            "📈 [PAPER] TRADE OPENED"
        );

        Ok(trade_id)
    }

    /// Sentinel form of [`open_trade`](Self::open_trade): `None` on rejection
    pub fn execute_signal(&mut self, signal: &Signal) -> Option<String> {
        match self.open_trade(signal) {
            Ok(trade_id) => Some(trade_id),
            Err(e) => {
                warn!(
                    symbol = %signal.symbol,
                    side = %signal.action,
                    price = signal.price,
                    error = %e,
                    "[PAPER] Signal rejected"
                );
                None
            }
        }
    }

    fn resolve_price(&self, symbol: &str, price: f64) -> Result<f64, EngineError> {
        if price > 0.0 && price.is_finite() {
            return Ok(price);
        }
        let invalid = || EngineError::InvalidPrice {
            symbol: symbol.to_string(),
            price,
        };
        let Some(broker) = self.broker.as_ref() else {
            return Err(invalid());
        };
        match broker.get_live_price(symbol) {
            Ok(live) if live > 0.0 && live.is_finite() => Ok(live),
            Ok(_) => Err(invalid()),
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "[PAPER] Live quote unavailable");
                Err(invalid())
            }
        }
    }

    // ── Close ────────────────────────────────────────────────────

    /// Close an OPEN trade at `exit_price`, stamped with the wall clock
    pub fn close_trade(
        &mut self,
        trade_id: &str,
        exit_price: f64,
        reason: ExitReason,
    ) -> Result<f64, EngineError> {
        self.close_trade_at(trade_id, exit_price, reason, Utc::now())
    }

    /// Close an OPEN trade and return its realized P&L. Nothing changes on error.
    pub fn close_trade_at(
        &mut self,
        trade_id: &str,
        exit_price: f64,
        reason: ExitReason,
        timestamp: DateTime<Utc>,
    ) -> Result<f64, EngineError> {
        let idx = *self
            .index
            .get(trade_id)
            .ok_or_else(|| EngineError::TradeNotFound(trade_id.to_string()))?;
        if !self.trades[idx].is_open() {
            return Err(EngineError::TradeAlreadyClosed(trade_id.to_string()));
        }

        let (symbol, side, quantity) = {
            let t = &self.trades[idx];
            (t.symbol.clone(), t.side, t.quantity)
        };
        let exit_price = self.resolve_price(&symbol, exit_price)?;

        if let Some(broker) = self.broker.as_mut() {
            let order = Order::limit(&symbol, side.opposite(), quantity, exit_price, trade_id);
            broker
                .place_order(&order)
                .map_err(|e| EngineError::OrderRejected {
                    symbol: symbol.clone(),
                    side: side.opposite(),
                    reason: e.to_string(),
                })?;
        }

        let trade = &mut self.trades[idx];
        let pnl = trade
            .close(exit_price, timestamp, reason)
            .ok_or_else(|| EngineError::TradeAlreadyClosed(trade_id.to_string()))?;
        let margin = trade.margin_reserved;
        let entry_price = trade.entry_price;

        let net_qty = self.ledger.close(&symbol, side, quantity);
        self.capital.settle(margin, pnl);
        self.cumulative_pnl += pnl;
        self.entry_bars.remove(trade_id);

        let record = TradeEventRecord::close(&self.trades[idx], self.cumulative_pnl);
        self.record_event(record);

        let result = classify_trade_result(pnl);
        let emoji = if pnl > 0.0 { "✅" } else { "❌" };
        info!(
            trade_id = %trade_id,
            symbol = %symbol,
            side = %side,
            qty = quantity,
            entry_price = %format!("₹{:.2}", entry_price),
            exit_price = %format!("₹{:.2}", exit_price),
            reason = %reason,
            net_position = net_qty,
            capital = %format!("₹{:.2}", self.capital.available()),
            cumulative_pnl = %format!("₹{:+.2}", self.cumulative_pnl),
            "[PAPER] {} {} | PnL ₹{:+.2}",
            emoji,
            result,
            pnl
        );

        Ok(pnl)
    }

    /// Sentinel form of [`close_trade`](Self::close_trade): 0 on failure
    pub fn close_paper_trade(
        &mut self,
        trade_id: &str,
        exit_price: f64,
        reason: ExitReason,
    ) -> f64 {
        match self.close_trade(trade_id, exit_price, reason) {
            Ok(pnl) => pnl,
            Err(e) => {
                warn!(trade_id = %trade_id, error = %e, "[PAPER] Close ignored");
                0.0
            }
        }
    }

    // ── Bars ─────────────────────────────────────────────────────

    /// Feed one bar: records the price and closes the symbol's open trades
    /// whose exit rules fire. Returns the ids closed.
    pub fn on_bar(&mut self, bar: &Bar) -> Vec<String> {
        if !(bar.close > 0.0 && bar.close.is_finite()) {
            warn!(
                symbol = %bar.symbol,
                price = bar.close,
                "[PAPER] Ignoring bar with invalid close"
            );
            return Vec::new();
        }
        self.last_prices.insert(bar.symbol.clone(), bar.close);
        self.last_bar_times.insert(bar.symbol.clone(), bar.timestamp);
        self.last_bar_time = self.last_bar_time.max(Some(bar.timestamp));
        let bars_seen = {
            let count = self.bar_counts.entry(bar.symbol.clone()).or_insert(0);
            *count += 1;
            *count
        };

        let exits: Vec<(String, ExitReason)> = self
            .trades
            .iter()
            .filter(|t| t.is_open() && t.symbol == bar.symbol)
            .filter_map(|t| {
                let entered = self.entry_bars.get(&t.trade_id).copied().unwrap_or(0);
                let hold_bars = bars_seen.saturating_sub(entered);
                self.config
                    .exits
                    .rules_for(&t.strategy)
                    .check(t, bar.close, hold_bars)
                    .map(|reason| (t.trade_id.clone(), reason))
            })
            .collect();

        let mut closed = Vec::with_capacity(exits.len());
        for (trade_id, reason) in exits {
            match self.close_trade_at(&trade_id, bar.close, reason, bar.timestamp) {
                Ok(_) => closed.push(trade_id),
                Err(e) => error!(
                    trade_id = %trade_id,
                    reason = %reason,
                    error = %e,
                    "[PAPER] Exit failed"
                ),
            }
        }
        closed
    }

    // ── Persistence ──────────────────────────────────────────────

    /// Append to the event log and refresh the JSON snapshot. I/O failures
    /// are logged; in-memory state has already advanced.
    fn record_event(&mut self, record: TradeEventRecord) {
        let Some(journal) = self.journal.as_mut() else {
            return;
        };
        if let Err(e) = journal.append(&record) {
            error!(
                trade_id = %record.trade_id,
                event = %record.event,
                error = %e,
                "[PAPER] Failed to append trade event"
            );
        }
        if let Err(e) = journal.write_snapshot(&self.trades) {
            error!(error = %e, "[PAPER] Failed to write trade snapshot");
        }
    }

    /// Rebuild trades, ledger and capital by replaying the event log.
    /// Returns the number of trades restored.
    pub fn load_history(&mut self) -> Result<usize> {
        if !self.trades.is_empty() {
            bail!("History can only be loaded into an empty session");
        }
        let Some(journal) = self.journal.as_ref() else {
            info!("💾 [PAPER] No journal configured, starting fresh");
            return Ok(0);
        };
        let events = journal.load_events().context("Failed to load trade history")?;
        let events_path = journal.events_path().to_path_buf();

        for event in &events {
            match event.event {
                TradeEvent::Open => self.replay_open(event),
                TradeEvent::Close => self.replay_close(event),
            }
        }
        let last = self.last_logged_seq(&events);
        self.next_trade_seq = self.next_trade_seq.max(last + 1);

        info!(
            path = %events_path.display(),
            events = events.len(),
            trades = self.trades.len(),
            open = self.open_trades().len(),
            capital = %format!("₹{:.2}", self.capital.available()),
            cumulative_pnl = %format!("₹{:+.2}", self.cumulative_pnl),
            "💾 [PAPER] Trade history restored"
        );
        Ok(self.trades.len())
    }

    /// Highest sequence number logged under the current session id
    fn last_logged_seq(&self, events: &[TradeEventRecord]) -> u32 {
        let prefix = format!("PT_{}_", self.session_id);
        events
            .iter()
            .filter_map(|e| e.trade_id.strip_prefix(&prefix))
            .filter_map(|seq| seq.parse::<u32>().ok())
            .max()
            .unwrap_or(0)
    }

    fn replay_open(&mut self, event: &TradeEventRecord) {
        if self.index.contains_key(&event.trade_id) {
            warn!(trade_id = %event.trade_id, "[PAPER] Duplicate OPEN event skipped");
            return;
        }
        if event.qty <= 0 || event.price <= 0.0 {
            warn!(trade_id = %event.trade_id, "[PAPER] OPEN event with invalid qty/price skipped");
            return;
        }
        let margin = if event.margin > 0.0 {
            event.margin
        } else {
            self.config.margin.required(event.side, event.price, event.qty)
        };
        let trade = Trade {
            trade_id: event.trade_id.clone(),
            symbol: event.symbol.clone(),
            side: event.side,
            entry_price: event.price,
            quantity: event.qty,
            entry_timestamp: event.timestamp,
            exit_price: None,
            exit_timestamp: None,
            pnl: 0.0,
            status: TradeStatus::Open,
            strategy: event.strategy.clone(),
            strategy_signal: event.reason.clone(),
            confidence: event.confidence,
            margin_reserved: margin,
            exit_reason: None,
        };
        self.ledger.open(&trade.symbol, trade.side, trade.quantity);
        self.capital.reserve(margin);
        self.entry_bars.insert(trade.trade_id.clone(), 0);
        self.index.insert(trade.trade_id.clone(), self.trades.len());
        self.trades.push(trade);
    }

    fn replay_close(&mut self, event: &TradeEventRecord) {
        let Some(&idx) = self.index.get(&event.trade_id) else {
            warn!(trade_id = %event.trade_id, "[PAPER] CLOSE event for unknown trade skipped");
            return;
        };
        let reason = event.reason.parse().unwrap_or(ExitReason::Manual);
        let trade = &mut self.trades[idx];
        let Some(pnl) = trade.close(event.price, event.timestamp, reason) else {
            warn!(trade_id = %event.trade_id, "[PAPER] Duplicate CLOSE event skipped");
            return;
        };
        let (symbol, side, quantity, margin) = (
            trade.symbol.clone(),
            trade.side,
            trade.quantity,
            trade.margin_reserved,
        );
        self.ledger.close(&symbol, side, quantity);
        self.capital.settle(margin, pnl);
        self.cumulative_pnl += pnl;
        self.entry_bars.remove(&event.trade_id);
    }

    pub fn export_trade_history(&self, path: &Path, format: ExportFormat) -> Result<()> {
        persistence::export_trades(&self.trades, path, format)
    }

    // ── Session ──────────────────────────────────────────────────

    pub fn performance_report(&self) -> PerformanceReport {
        PerformanceReport::build(&self.session_id, &self.trades, &self.capital, &self.ledger)
    }

    /// Write `performance_<session>.json` into the journal directory
    pub fn save_performance_report(&self) -> Result<PathBuf> {
        let Some(journal) = self.journal.as_ref() else {
            bail!("No journal configured for session {}", self.session_id);
        };
        let report = self.performance_report();
        journal.write_report(&report.filename(), &report)
    }

    /// Close every open trade at the last bar of its symbol and produce the
    /// session report. Symbols that never printed close at the entry price,
    /// stamped with the latest bar time seen (wall clock if no bar arrived).
    pub fn end_session(&mut self) -> PerformanceReport {
        let fallback_time = self.last_bar_time.unwrap_or_else(Utc::now);
        let open: Vec<(String, f64, DateTime<Utc>)> = self
            .trades
            .iter()
            .filter(|t| t.is_open())
            .map(|t| {
                let price = self
                    .last_prices
                    .get(&t.symbol)
                    .copied()
                    .unwrap_or(t.entry_price);
                let time = self
                    .last_bar_times
                    .get(&t.symbol)
                    .copied()
                    .unwrap_or(fallback_time)
                    .max(t.entry_timestamp);
                (t.trade_id.clone(), price, time)
            })
            .collect();

        for (trade_id, price, time) in open {
            if let Err(e) = self.close_trade_at(&trade_id, price, ExitReason::SessionEnd, time) {
                error!(
                    trade_id = %trade_id,
                    error = %e,
                    "[PAPER] Failed to close trade at session end"
                );
            }
        }

        self.print_dashboard();
        if self.config.write_report_on_end && self.journal.is_some() {
            if let Err(e) = self.save_performance_report() {
                error!(error = %e, "[PAPER] Failed to save performance report");
            }
        }
        self.performance_report()
    }

    /// Clear trades, positions and capital, and start a new session id.
    /// The event log on disk is left untouched.
    pub fn reset_session(&mut self) {
        let previous = std::mem::replace(&mut self.session_id, new_session_id());
        self.trades.clear();
        self.index.clear();
        self.ledger.clear();
        self.capital.reset();
        self.next_trade_seq = 1;
        self.cumulative_pnl = 0.0;
        self.last_prices.clear();
        self.last_bar_times.clear();
        self.last_bar_time = None;
        self.bar_counts.clear();
        self.entry_bars.clear();
        info!(
            previous_session = %previous,
            session_id = %self.session_id,
            capital = %format!("₹{:.2}", self.capital.available()),
            "🔄 [PAPER] Session reset"
        );
    }

    /// Compare the ledger's non-flat positions with the broker's view
    pub fn reconcile_positions(&self) -> Result<Vec<PositionMismatch>> {
        let Some(broker) = self.broker.as_ref() else {
            bail!("No broker configured for reconciliation");
        };
        let broker_positions: HashMap<String, i64> = broker
            .get_positions()
            .context("Failed to fetch broker positions")?
            .into_iter()
            .map(|p| (p.symbol, p.net_qty))
            .collect();

        match broker.get_funds() {
            Ok(funds) => info!(
                available = funds.available_balance,
                utilized = funds.utilized_amount,
                ledger_capital = self.capital.available(),
                ledger_margin = self.capital.reserved_margin(),
                "[PAPER] Broker funds"
            ),
            Err(e) => warn!(error = %e, "[PAPER] Broker funds unavailable"),
        }

        let mut symbols: Vec<&String> = self
            .ledger
            .all()
            .keys()
            .chain(broker_positions.keys())
            .collect();
        symbols.sort();
        symbols.dedup();

        let mismatches: Vec<PositionMismatch> = symbols
            .into_iter()
            .filter_map(|symbol| {
                let ledger_qty = self.ledger.quantity(symbol);
                let broker_qty = broker_positions.get(symbol).copied().unwrap_or(0);
                (ledger_qty != broker_qty).then(|| PositionMismatch {
                    symbol: symbol.clone(),
                    ledger_qty,
                    broker_qty,
                })
            })
            .collect();

        for m in &mismatches {
            warn!(
                symbol = %m.symbol,
                ledger_qty = m.ledger_qty,
                broker_qty = m.broker_qty,
                "⚠️ [PAPER] Position mismatch with broker"
            );
        }
        if mismatches.is_empty() {
            info!(
                positions = self.ledger.active().len(),
                "[PAPER] Positions reconciled with broker"
            );
        }
        Ok(mismatches)
    }

    // ── Dashboard ────────────────────────────────────────────────

    pub fn print_dashboard(&self) {
        let report = self.performance_report();
        let summary = &report.portfolio_summary;
        let metrics = &report.performance_metrics;
        let stats = &report.trade_statistics;
        let risk = &report.risk_metrics;

        info!("╔══════════════════════════════════════════════════════════════════════════╗");
        info!("║  📋 INTRADAY PAPER TRADING DASHBOARD                                     ║");
        info!("║  Session: {}", self.session_id);
        info!("╠══════════════════════════════════════════════════════════════════════════╣");
        info!(
            "║  💰 Capital: ₹{:.2} | Margin: ₹{:.2} | Equity: ₹{:.2} (initial: ₹{:.2})",
            summary.current_capital,
            summary.reserved_margin,
            summary.equity,
            summary.initial_capital
        );
        info!(
            "║  📈 P&L: ₹{:+.2} ({:+.2}%)",
            summary.total_pnl, summary.total_return_pct
        );
        info!(
            "║  🎯 WINRATE: {:.1}% ({} W / {} L / {} closed) | Avg/trade: ₹{:+.2}",
            metrics.win_rate,
            metrics.winning_trades,
            metrics.losing_trades,
            metrics.closed_trades,
            metrics.avg_pnl_per_trade
        );
        info!(
            "║  📊 Avg Win: ₹{:.2} | Avg Loss: ₹{:.2} | Profit Factor: {:.2}",
            stats.average_profit, stats.average_loss, metrics.profit_factor
        );
        info!(
            "║  📊 Best: ₹{:+.2} | Worst: ₹{:.2} | Max DD: {:.2}% | Sharpe: {:.2}",
            stats.max_profit, -stats.max_loss, risk.max_drawdown_pct, risk.sharpe_ratio
        );
        if !stats.exits_by_reason.is_empty() {
            let exits: Vec<String> = stats
                .exits_by_reason
                .iter()
                .map(|(reason, n)| format!("{}: {}", reason, n))
                .collect();
            info!("║  🚪 Exits → {}", exits.join(" | "));
        }

        let open = self.open_trades();
        if open.is_empty() {
            info!("║  📌 No open positions");
        } else {
            info!("║  ─── Open Positions ───");
            for trade in open {
                let unrealized = self
                    .last_price(&trade.symbol)
                    .map(|p| trade.pnl_at(p))
                    .unwrap_or(0.0);
                info!(
                    "║  {} {} {} x{} @ ₹{:.2} | uPnL ₹{:+.2}",
                    trade.trade_id,
                    trade.side,
                    trade.symbol,
                    trade.quantity,
                    trade.entry_price,
                    unrealized
                );
            }
        }
        info!("╚══════════════════════════════════════════════════════════════════════════╝");
    }

    pub fn summary_string(&self) -> String {
        let (wins, losses) = self
            .trades
            .iter()
            .filter(|t| !t.is_open())
            .fold((0u32, 0u32), |(w, l), t| if t.pnl > 0.0 { (w + 1, l) } else { (w, l + 1) });
        format!(
            "📋 Paper: ₹{:.2} cap | {}/{} ({:.0}% WR) | P&L: ₹{:+.2} | DD: {:.1}% | {} open",
            self.capital.available(),
            wins,
            wins + losses,
            win_rate(wins, losses),
            self.cumulative_pnl,
            self.capital.max_drawdown_pct(),
            self.open_trades().len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{BrokerPosition, Funds, MockBroker};
    use crate::risk::{ExitPreset, ExitRules};
    use crate::types::Side;
    use chrono::{Duration, TimeZone};

    fn engine() -> PaperTradingEngine {
        PaperTradingEngine::new(PaperTradingConfig {
            session_id: Some("test".to_string()),
            ..PaperTradingConfig::default()
        })
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 9, 15, 0).unwrap()
    }

    #[test]
    fn ids_are_sequential_per_session() {
        let mut engine = engine();
        let a = engine
            .open_trade(&Signal::new(Side::Buy, "ITC.NS", 400.0, 10, "x"))
            .unwrap();
        let b = engine
            .open_trade(&Signal::new(Side::Sell, "ITC.NS", 400.0, 10, "y"))
            .unwrap();
        assert_eq!(a, "PT_test_0001");
        assert_eq!(b, "PT_test_0002");
        assert_eq!(engine.ledger().quantity("ITC.NS"), 0);
    }

    #[test]
    fn generated_session_ids_are_unique() {
        let a = new_session_id();
        let b = new_session_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), "20240101_000000_abcdef".len());
    }

    #[test]
    fn rejected_signal_consumes_no_id() {
        let mut engine = engine();
        assert_eq!(
            engine.execute_signal(&Signal::new(Side::Buy, "ITC.NS", 400.0, 0, "x")),
            None
        );
        assert!(engine
            .execute_signal(&Signal::new(Side::Buy, "ITC.NS", -1.0, 5, "x"))
            .is_none());
        let id = engine
            .execute_signal(&Signal::new(Side::Buy, "ITC.NS", 400.0, 5, "x"))
            .unwrap();
        assert_eq!(id, "PT_test_0001");
    }

    #[test]
    fn insufficient_funds_is_rejected_before_mutation() {
        let mut engine = PaperTradingEngine::new(PaperTradingConfig {
            initial_capital: 1_000.0,
            session_id: Some("small".to_string()),
            ..PaperTradingConfig::default()
        });
        let err = engine
            .open_trade(&Signal::new(Side::Buy, "MARUTI.NS", 10_000.0, 1, "x"))
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientFunds { .. }));
        assert!(err.is_rejection());
        assert_eq!(engine.capital().available(), 1_000.0);
        assert!(engine.trades().is_empty());
        assert_eq!(engine.ledger().quantity("MARUTI.NS"), 0);
    }

    #[test]
    fn single_position_per_symbol_blocks_second_entry() {
        let mut engine = PaperTradingEngine::new(PaperTradingConfig {
            single_position_per_symbol: true,
            session_id: Some("single".to_string()),
            ..PaperTradingConfig::default()
        });
        engine
            .open_trade(&Signal::new(Side::Buy, "TCS.NS", 100.0, 10, "x"))
            .unwrap();
        let err = engine
            .open_trade(&Signal::new(Side::Sell, "TCS.NS", 100.0, 10, "y"))
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::PositionAlreadyOpen {
                symbol: "TCS.NS".to_string(),
                quantity: 10
            }
        );
    }

    #[test]
    fn unsized_signal_uses_position_sizer() {
        let mut engine = engine();
        let mut signal = Signal::new(Side::Buy, "INFY.NS", 1_500.0, 0, "x");
        signal.quantity = None;
        let id = engine.open_trade(&signal).unwrap();
        // floor(50_000 / 1_500)
        assert_eq!(engine.trade(&id).unwrap().quantity, 33);
    }

    #[test]
    fn bars_trigger_take_profit_and_time_exit() {
        let mut engine = PaperTradingEngine::new(PaperTradingConfig {
            exits: ExitTable::uniform(ExitPreset::Balanced.rules()).with_strategy(
                "slow",
                ExitRules {
                    take_profit_pct: 0.5,
                    stop_loss_pct: 0.5,
                    max_hold_bars: 3,
                },
            ),
            session_id: Some("bars".to_string()),
            ..PaperTradingConfig::default()
        });

        let fast = engine
            .open_trade(&Signal::new(Side::Buy, "SBIN.NS", 100.0, 10, "x").at(t0()))
            .unwrap();
        let slow = engine
            .open_trade(
                &Signal::new(Side::Buy, "LT.NS", 100.0, 10, "y")
                    .with_strategy("slow")
                    .at(t0()),
            )
            .unwrap();

        let closed = engine.on_bar(&Bar::new("SBIN.NS", t0() + Duration::minutes(1), 100.3));
        assert_eq!(closed, vec![fast.clone()]);
        let trade = engine.trade(&fast).unwrap();
        assert_eq!(trade.exit_reason, Some(ExitReason::TakeProfit));
        assert_eq!(trade.exit_timestamp, Some(t0() + Duration::minutes(1)));

        for minute in 1..3 {
            assert!(engine
                .on_bar(&Bar::new("LT.NS", t0() + Duration::minutes(minute), 100.0))
                .is_empty());
        }
        let closed = engine.on_bar(&Bar::new("LT.NS", t0() + Duration::minutes(3), 100.0));
        assert_eq!(closed, vec![slow.clone()]);
        assert_eq!(engine.trade(&slow).unwrap().exit_reason, Some(ExitReason::TimeExit));
    }

    #[test]
    fn end_session_closes_at_last_seen_price() {
        let mut engine = engine();
        let seen = engine
            .open_trade(&Signal::new(Side::Sell, "WIPRO.NS", 400.0, 10, "x"))
            .unwrap();
        let unseen = engine
            .open_trade(&Signal::new(Side::Buy, "ITC.NS", 450.0, 10, "y"))
            .unwrap();
        engine.on_bar(&Bar::new("WIPRO.NS", t0(), 399.9));

        let report = engine.end_session();
        assert!(engine.open_trades().is_empty());
        assert!((engine.trade(&seen).unwrap().pnl - 1.0).abs() < 1e-9);
        assert_eq!(engine.trade(&unseen).unwrap().pnl, 0.0);
        assert_eq!(
            engine.trade(&unseen).unwrap().exit_reason,
            Some(ExitReason::SessionEnd)
        );
        assert_eq!(report.performance_metrics.closed_trades, 2);
        assert_eq!(report.performance_metrics.winning_trades, 1);
    }

    #[test]
    fn reset_session_restores_initial_state() {
        let mut engine = engine();
        engine
            .open_trade(&Signal::new(Side::Buy, "ITC.NS", 400.0, 10, "x"))
            .unwrap();
        engine.reset_session();

        assert!(engine.trades().is_empty());
        assert!(engine.ledger().active().is_empty());
        assert_eq!(engine.capital().available(), 100_000.0);
        assert_ne!(engine.session_id(), "test");
        let id = engine
            .open_trade(&Signal::new(Side::Buy, "ITC.NS", 400.0, 10, "x"))
            .unwrap();
        assert!(id.ends_with("_0001"));
    }

    #[test]
    fn broker_rejection_leaves_state_untouched() {
        let mut broker = MockBroker::new();
        broker
            .expect_place_order()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("RMS: margin exceeded")));

        let mut engine = engine().with_broker(Box::new(broker));
        let err = engine
            .open_trade(&Signal::new(Side::Buy, "SBIN.NS", 600.0, 10, "x"))
            .unwrap_err();

        assert!(matches!(err, EngineError::OrderRejected { .. }));
        assert!(engine.trades().is_empty());
        assert_eq!(engine.capital().available(), 100_000.0);
        assert_eq!(engine.ledger().quantity("SBIN.NS"), 0);
    }

    #[test]
    fn zero_price_signal_uses_live_quote() {
        let mut broker = MockBroker::new();
        broker.expect_get_live_price().returning(|_| Ok(250.0));
        broker
            .expect_place_order()
            .returning(|order| Ok(format!("OID-{}", order.tag)));

        let mut engine = engine().with_broker(Box::new(broker));
        let id = engine
            .open_trade(&Signal::new(Side::Buy, "ONGC.NS", 0.0, 4, "x"))
            .unwrap();
        assert_eq!(engine.trade(&id).unwrap().entry_price, 250.0);
        assert!((engine.capital().reserved_margin() - 200.0).abs() < 1e-9);
    }

    #[test]
    fn failed_close_order_keeps_trade_open() {
        let mut broker = MockBroker::new();
        let mut calls = 0;
        broker.expect_place_order().returning(move |_| {
            calls += 1;
            if calls == 1 {
                Ok("OID-1".to_string())
            } else {
                Err(anyhow::anyhow!("exchange closed"))
            }
        });

        let mut engine = engine().with_broker(Box::new(broker));
        let id = engine
            .open_trade(&Signal::new(Side::Buy, "TCS.NS", 100.0, 10, "x"))
            .unwrap();
        assert_eq!(engine.close_paper_trade(&id, 101.0, ExitReason::Manual), 0.0);
        assert!(engine.trade(&id).unwrap().is_open());
        assert_eq!(engine.ledger().quantity("TCS.NS"), 10);
    }

    #[test]
    fn reconcile_reports_mismatches() {
        let mut broker = MockBroker::new();
        broker.expect_place_order().returning(|_| Ok("OID".to_string()));
        broker.expect_get_funds().returning(|| Ok(Funds::default()));
        broker.expect_get_positions().returning(|| {
            Ok(vec![
                BrokerPosition {
                    symbol: "TCS.NS".to_string(),
                    net_qty: 10,
                    avg_price: 100.0,
                },
                BrokerPosition {
                    symbol: "HDFCBANK.NS".to_string(),
                    net_qty: -5,
                    avg_price: 1_500.0,
                },
            ])
        });

        let mut engine = engine().with_broker(Box::new(broker));
        engine
            .open_trade(&Signal::new(Side::Buy, "TCS.NS", 100.0, 10, "x"))
            .unwrap();

        let mismatches = engine.reconcile_positions().unwrap();
        assert_eq!(
            mismatches,
            vec![PositionMismatch {
                symbol: "HDFCBANK.NS".to_string(),
                ledger_qty: 0,
                broker_qty: -5,
            }]
        );
    }

    #[test]
    fn reconcile_without_broker_is_an_error() {
        assert!(engine().reconcile_positions().is_err());
    }

    #[test]
    fn summary_mentions_capital_and_open_count() {
        let mut engine = engine();
        engine
            .open_trade(&Signal::new(Side::Buy, "ITC.NS", 10.0, 100, "x"))
            .unwrap();
        let summary = engine.summary_string();
        assert!(summary.contains("₹99800.00"), "{}", summary);
        assert!(summary.ends_with("1 open"));
    }
}
