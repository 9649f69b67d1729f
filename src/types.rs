//! Core types used throughout Intradar
//!
//! Defines the trade record, order sides, exit reasons and the signal
//! contract between strategies and the paper trading engine.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Order / trade side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Side of the leg that flattens a position opened with `self`
    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Signed ledger delta for `quantity` on this side
    pub fn signed(&self, quantity: i64) -> i64 {
        match self {
            Side::Buy => quantity,
            Side::Sell => -quantity,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

impl FromStr for Side {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" | "LONG" => Ok(Side::Buy),
            "SELL" | "SHORT" => Ok(Side::Sell),
            _ => anyhow::bail!("Unknown side: {}", s),
        }
    }
}

/// Lifecycle state of a paper trade. CLOSED is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Open,
    Closed,
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeStatus::Open => write!(f, "OPEN"),
            TradeStatus::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Why a trade was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TimeExit,
    SessionEnd,
    Signal,
    Manual,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::TakeProfit => write!(f, "TAKE_PROFIT"),
            ExitReason::StopLoss => write!(f, "STOP_LOSS"),
            ExitReason::TimeExit => write!(f, "TIME_EXIT"),
            ExitReason::SessionEnd => write!(f, "SESSION_END"),
            ExitReason::Signal => write!(f, "SIGNAL"),
            ExitReason::Manual => write!(f, "MANUAL"),
        }
    }
}

impl FromStr for ExitReason {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TAKE_PROFIT" => Ok(ExitReason::TakeProfit),
            "STOP_LOSS" => Ok(ExitReason::StopLoss),
            "TIME_EXIT" => Ok(ExitReason::TimeExit),
            "SESSION_END" => Ok(ExitReason::SessionEnd),
            "SIGNAL" => Ok(ExitReason::Signal),
            "MANUAL" => Ok(ExitReason::Manual),
            _ => anyhow::bail!("Unknown exit reason: {}", s),
        }
    }
}

/// Trading signal handed from a strategy to the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub action: Side,
    pub symbol: String,
    /// Entry price. Zero or negative asks the broker for a live quote.
    pub price: f64,
    /// `None` lets the engine size the position
    #[serde(default)]
    pub quantity: Option<i64>,
    /// Free-text reason, e.g. `BREAKOUT_LONG: R:101.20, Vol:1.4x`
    pub strategy_signal: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default = "default_strategy_name")]
    pub strategy: String,
    /// Bar time of the signal; wall clock when absent
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

fn default_strategy_name() -> String {
    "Unknown".to_string()
}

impl Signal {
    pub fn new(action: Side, symbol: &str, price: f64, quantity: i64, reason: &str) -> Self {
        Self {
            action,
            symbol: symbol.to_string(),
            price,
            quantity: Some(quantity),
            strategy_signal: reason.to_string(),
            confidence: None,
            strategy: default_strategy_name(),
            timestamp: None,
        }
    }

    pub fn with_strategy(mut self, strategy: &str) -> Self {
        self.strategy = strategy.to_string();
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// One price bar fed to the engine by the driving event loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub close: f64,
}

impl Bar {
    pub fn new(symbol: &str, timestamp: DateTime<Utc>, close: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            timestamp,
            close,
        }
    }
}

/// A simulated position. Exit fields are populated only once CLOSED.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: String,
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub quantity: i64,
    pub entry_timestamp: DateTime<Utc>,
    pub exit_price: Option<f64>,
    pub exit_timestamp: Option<DateTime<Utc>>,
    pub pnl: f64,
    pub status: TradeStatus,
    pub strategy: String,
    pub strategy_signal: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Capital reserved while the trade is open
    pub margin_reserved: f64,
    #[serde(default)]
    pub exit_reason: Option<ExitReason>,
}

impl Trade {
    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }

    pub fn notional(&self) -> f64 {
        self.entry_price * self.quantity as f64
    }

    /// Signed P&L of closing at `exit_price`
    pub fn pnl_at(&self, exit_price: f64) -> f64 {
        let qty = self.quantity as f64;
        match self.side {
            Side::Buy => (exit_price - self.entry_price) * qty,
            Side::Sell => (self.entry_price - exit_price) * qty,
        }
    }

    /// Side-aware return fraction at `price` (positive = in profit)
    pub fn return_at(&self, price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        match self.side {
            Side::Buy => (price - self.entry_price) / self.entry_price,
            Side::Sell => (self.entry_price - price) / self.entry_price,
        }
    }

    /// OPEN → CLOSED. Returns the realized P&L; no-op on a closed trade.
    pub fn close(
        &mut self,
        exit_price: f64,
        exit_timestamp: DateTime<Utc>,
        reason: ExitReason,
    ) -> Option<f64> {
        if !self.is_open() {
            return None;
        }
        self.pnl = self.pnl_at(exit_price);
        self.exit_price = Some(exit_price);
        self.exit_timestamp = Some(exit_timestamp);
        self.exit_reason = Some(reason);
        self.status = TradeStatus::Closed;
        Some(self.pnl)
    }

    pub fn hold_duration(&self) -> Option<Duration> {
        self.exit_timestamp.map(|exit| exit - self.entry_timestamp)
    }
}
