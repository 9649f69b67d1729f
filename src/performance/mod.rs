//! Performance Aggregator
//!
//! Derives trade statistics and risk metrics from the trade log:
//! - Win rate, average / largest win and loss, profit factor
//! - Daily returns on a running capital base
//! - Annualized Sharpe ratio and volatility
//!
//! Trade-level realized P&L is authoritative. Closed trades map one-to-one to
//! round trips; [`fifo`] derives round trips for fill streams that carry no
//! trade linkage.

pub mod fifo;
pub mod report;

pub use report::PerformanceReport;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::types::{Side, Trade};

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// A matched entry/exit pair with its realized P&L
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundTrip {
    pub symbol: String,
    /// Side of the opening leg
    pub side: Side,
    pub quantity: i64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_timestamp: DateTime<Utc>,
    pub exit_timestamp: DateTime<Utc>,
    pub pnl: f64,
}

impl RoundTrip {
    /// `None` while the trade is still open
    pub fn from_trade(trade: &Trade) -> Option<Self> {
        if trade.is_open() {
            return None;
        }
        Some(Self {
            symbol: trade.symbol.clone(),
            side: trade.side,
            quantity: trade.quantity,
            entry_price: trade.entry_price,
            exit_price: trade.exit_price?,
            entry_timestamp: trade.entry_timestamp,
            exit_timestamp: trade.exit_timestamp?,
            pnl: trade.pnl,
        })
    }

    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }

    pub fn hold_secs(&self) -> i64 {
        (self.exit_timestamp - self.entry_timestamp).num_seconds()
    }
}

/// Closed trades as round trips, in input order
pub fn round_trips(trades: &[Trade]) -> Vec<RoundTrip> {
    trades.iter().filter_map(RoundTrip::from_trade).collect()
}

/// Classify a realized P&L for logs and CSV rows
pub fn classify_trade_result(pnl: f64) -> &'static str {
    if pnl > 0.0 {
        "WIN"
    } else {
        "LOSS"
    }
}

/// Win/loss statistics over a set of round trips
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeStats {
    pub round_trips: usize,
    pub winning_trades: u32,
    pub losing_trades: u32,
    /// Percent, 0 when nothing has closed
    pub win_rate: f64,
    pub total_pnl: f64,
    pub gross_profit: f64,
    /// Positive magnitude
    pub gross_loss: f64,
    pub average_profit: f64,
    /// Positive magnitude
    pub average_loss: f64,
    pub max_profit: f64,
    /// Positive magnitude
    pub max_loss: f64,
    pub profit_factor: f64,
    /// Average P&L per round trip
    pub expectancy: f64,
    pub avg_hold_secs: Option<f64>,
}

impl TradeStats {
    pub fn from_round_trips(trips: &[RoundTrip]) -> Self {
        if trips.is_empty() {
            return Self::default();
        }

        let mut stats = Self {
            round_trips: trips.len(),
            ..Self::default()
        };
        for trip in trips {
            stats.total_pnl += trip.pnl;
            if trip.is_win() {
                stats.winning_trades += 1;
                stats.gross_profit += trip.pnl;
                stats.max_profit = stats.max_profit.max(trip.pnl);
            } else {
                stats.losing_trades += 1;
                stats.gross_loss += trip.pnl.abs();
                stats.max_loss = stats.max_loss.max(trip.pnl.abs());
            }
        }

        let decided = stats.winning_trades + stats.losing_trades;
        stats.win_rate = win_rate(stats.winning_trades, stats.losing_trades);
        if stats.winning_trades > 0 {
            stats.average_profit = stats.gross_profit / stats.winning_trades as f64;
        }
        if stats.losing_trades > 0 {
            stats.average_loss = stats.gross_loss / stats.losing_trades as f64;
        }
        stats.profit_factor = if stats.gross_loss > 0.0 {
            stats.gross_profit / stats.gross_loss
        } else {
            0.0
        };
        stats.expectancy = stats.total_pnl / decided as f64;
        stats.avg_hold_secs = Some(
            trips.iter().map(|t| t.hold_secs() as f64).sum::<f64>() / trips.len() as f64,
        );
        stats
    }
}

/// `wins / (wins + losses) * 100`, 0 when both are zero
pub fn win_rate(wins: u32, losses: u32) -> f64 {
    let total = wins + losses;
    if total > 0 {
        wins as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}

/// Realized P&L of one calendar day over the capital base at its start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyReturn {
    pub date: NaiveDate,
    pub pnl: f64,
    pub capital_base: f64,
    /// Fraction (0.01 = 1%)
    pub daily_return: f64,
}

/// Bucket round trips by the UTC date of entry. The capital base starts at
/// `initial_capital` and grows by each prior day's P&L.
pub fn daily_returns(trips: &[RoundTrip], initial_capital: f64) -> Vec<DailyReturn> {
    let mut by_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for trip in trips {
        *by_day.entry(trip.entry_timestamp.date_naive()).or_insert(0.0) += trip.pnl;
    }

    let mut base = initial_capital;
    by_day
        .into_iter()
        .map(|(date, pnl)| {
            let daily_return = if base > 0.0 { pnl / base } else { 0.0 };
            let row = DailyReturn {
                date,
                pnl,
                capital_base: base,
                daily_return,
            };
            base += pnl;
            row
        })
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1); `None` below two observations
fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let avg = mean(values);
    let var = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

/// Volatility below this is rounding noise from equal returns
const MIN_VOLATILITY: f64 = 1e-12;

/// Annualized volatility of daily returns; `None` when it is zero
pub fn annualized_volatility(returns: &[f64]) -> Option<f64> {
    sample_std(returns)
        .map(|std| std * TRADING_DAYS_PER_YEAR.sqrt())
        .filter(|vol| *vol > MIN_VOLATILITY)
}

/// `mean * 252 / (std * sqrt(252))`; 0 when undefined
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    match annualized_volatility(returns) {
        Some(vol) => mean(returns) * TRADING_DAYS_PER_YEAR / vol,
        None => 0.0,
    }
}

/// Everything the aggregator derives from one trade list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub stats: TradeStats,
    pub daily_returns: Vec<DailyReturn>,
    pub sharpe_ratio: f64,
    pub volatility: Option<f64>,
    pub exits_by_reason: BTreeMap<String, u32>,
    pub symbols_traded: Vec<String>,
    pub sectors_traded: Vec<String>,
}

pub fn analyze(trades: &[Trade], initial_capital: f64) -> Analysis {
    analyze_round_trips(&round_trips(trades), trades, initial_capital)
}

/// Same as [`analyze`] but with round trips supplied by the caller (e.g.
/// from [`fifo::match_fills`])
pub fn analyze_round_trips(
    trips: &[RoundTrip],
    trades: &[Trade],
    initial_capital: f64,
) -> Analysis {
    let daily = daily_returns(trips, initial_capital);
    let returns: Vec<f64> = daily.iter().map(|d| d.daily_return).collect();

    let mut exits_by_reason = BTreeMap::new();
    for reason in trades.iter().filter_map(|t| t.exit_reason) {
        *exits_by_reason.entry(reason.to_string()).or_insert(0) += 1;
    }

    let symbols: BTreeSet<String> = trades
        .iter()
        .map(|t| t.symbol.clone())
        .chain(trips.iter().map(|t| t.symbol.clone()))
        .collect();
    let sectors: BTreeSet<String> = symbols.iter().map(|s| sector_for(s).to_string()).collect();

    Analysis {
        stats: TradeStats::from_round_trips(trips),
        sharpe_ratio: sharpe_ratio(&returns),
        volatility: annualized_volatility(&returns),
        daily_returns: daily,
        exits_by_reason,
        symbols_traded: symbols.into_iter().collect(),
        sectors_traded: sectors.into_iter().collect(),
    }
}

/// Sector of a Nifty 50 symbol (`.NS` / `.BO` suffix optional)
pub fn sector_for(symbol: &str) -> &'static str {
    let upper = symbol.to_ascii_uppercase();
    let base = upper
        .strip_suffix(".NS")
        .or_else(|| upper.strip_suffix(".BO"))
        .unwrap_or(&upper);
    match base {
        "RELIANCE" | "ONGC" | "BPCL" | "IOC" | "NTPC" | "POWERGRID" | "COALINDIA" => "Energy",
        "TCS" | "INFY" | "HCLTECH" | "WIPRO" | "TECHM" => "IT Services",
        "HDFCBANK" | "ICICIBANK" | "SBIN" | "KOTAKBANK" | "AXISBANK" | "INDUSINDBK" => "Banking",
        "BAJFINANCE" | "BAJAJFINSV" | "HDFCLIFE" | "SBILIFE" => "Financial Services",
        "HINDUNILVR" | "ITC" | "NESTLEIND" | "BRITANNIA" | "TATACONSUM" => "FMCG",
        "BHARTIARTL" => "Telecom",
        "LT" => "Engineering",
        "ASIANPAINT" => "Paints",
        "MARUTI" | "TATAMOTORS" | "M&M" | "BAJAJ-AUTO" | "HEROMOTOCO" | "EICHERMOT" => "Automotive",
        "TITAN" => "Consumer Durables",
        "ULTRACEMCO" | "SHREECEM" | "GRASIM" => "Cement",
        "SUNPHARMA" | "DRREDDY" | "CIPLA" | "DIVISLAB" | "APOLLOHOSP" => "Healthcare",
        "TATASTEEL" | "JSWSTEEL" | "HINDALCO" => "Metals",
        _ => "Other",
    }
}
