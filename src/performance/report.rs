//! JSON performance report
//!
//! Written as `performance_<session>.json` next to the event log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{analyze, DailyReturn};
use crate::ledger::{CapitalAccount, PositionLedger};
use crate::types::Trade;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub generated_at: DateTime<Utc>,
    pub session_id: String,
    pub portfolio_summary: PortfolioSummary,
    pub performance_metrics: PerformanceMetrics,
    pub trade_statistics: TradeStatistics,
    pub risk_metrics: RiskMetrics,
    pub market_coverage: MarketCoverage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub initial_capital: f64,
    pub current_capital: f64,
    pub reserved_margin: f64,
    pub equity: f64,
    pub total_pnl: f64,
    pub total_return_pct: f64,
    pub open_positions: usize,
    /// Non-flat ledger entries
    pub active_positions: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_trades: usize,
    pub closed_trades: usize,
    pub open_trades: usize,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub avg_pnl_per_trade: f64,
    pub profit_factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeStatistics {
    pub average_profit: f64,
    pub average_loss: f64,
    pub max_profit: f64,
    pub max_loss: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub avg_hold_secs: Option<f64>,
    pub exits_by_reason: BTreeMap<String, u32>,
    pub pnl_by_symbol: BTreeMap<String, f64>,
    pub pnl_by_strategy: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub sharpe_ratio: f64,
    pub volatility: Option<f64>,
    pub max_drawdown_pct: f64,
    pub current_drawdown_pct: f64,
    pub peak_equity: f64,
    pub daily_returns: Vec<DailyReturn>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketCoverage {
    pub symbols_traded: Vec<String>,
    pub sectors_traded: Vec<String>,
    pub symbol_count: usize,
}

impl PerformanceReport {
    pub fn build(
        session_id: &str,
        trades: &[Trade],
        capital: &CapitalAccount,
        ledger: &PositionLedger,
    ) -> Self {
        let analysis = analyze(trades, capital.initial());
        let stats = &analysis.stats;

        let mut pnl_by_symbol = BTreeMap::new();
        let mut pnl_by_strategy = BTreeMap::new();
        for trade in trades.iter().filter(|t| !t.is_open()) {
            *pnl_by_symbol.entry(trade.symbol.clone()).or_insert(0.0) += trade.pnl;
            *pnl_by_strategy.entry(trade.strategy.clone()).or_insert(0.0) += trade.pnl;
        }

        let open_trades = trades.iter().filter(|t| t.is_open()).count();
        let initial = capital.initial();
        let total_return_pct = if initial > 0.0 {
            stats.total_pnl / initial * 100.0
        } else {
            0.0
        };

        Self {
            generated_at: Utc::now(),
            session_id: session_id.to_string(),
            portfolio_summary: PortfolioSummary {
                initial_capital: initial,
                current_capital: capital.available(),
                reserved_margin: capital.reserved_margin(),
                equity: capital.equity(),
                total_pnl: stats.total_pnl,
                total_return_pct,
                open_positions: open_trades,
                active_positions: ledger.active(),
            },
            performance_metrics: PerformanceMetrics {
                total_trades: trades.len(),
                closed_trades: stats.round_trips,
                open_trades,
                winning_trades: stats.winning_trades,
                losing_trades: stats.losing_trades,
                win_rate: stats.win_rate,
                total_pnl: stats.total_pnl,
                avg_pnl_per_trade: stats.expectancy,
                profit_factor: stats.profit_factor,
            },
            trade_statistics: TradeStatistics {
                average_profit: stats.average_profit,
                average_loss: stats.average_loss,
                max_profit: stats.max_profit,
                max_loss: stats.max_loss,
                gross_profit: stats.gross_profit,
                gross_loss: stats.gross_loss,
                avg_hold_secs: stats.avg_hold_secs,
                exits_by_reason: analysis.exits_by_reason.clone(),
                pnl_by_symbol,
                pnl_by_strategy,
            },
            risk_metrics: RiskMetrics {
                sharpe_ratio: analysis.sharpe_ratio,
                volatility: analysis.volatility,
                max_drawdown_pct: capital.max_drawdown_pct(),
                current_drawdown_pct: capital.current_drawdown_pct(),
                peak_equity: capital.peak_equity(),
                daily_returns: analysis.daily_returns.clone(),
            },
            market_coverage: MarketCoverage {
                symbol_count: analysis.symbols_traded.len(),
                symbols_traded: analysis.symbols_traded,
                sectors_traded: analysis.sectors_traded,
            },
        }
    }

    pub fn filename(&self) -> String {
        report_filename(&self.session_id)
    }
}

pub fn report_filename(session_id: &str) -> String {
    format!("performance_{}.json", session_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExitReason, Side, TradeStatus};
    use chrono::TimeZone;

    fn closed(id: &str, symbol: &str, pnl: f64) -> Trade {
        let entry = Utc.with_ymd_and_hms(2024, 4, 1, 9, 20, 0).unwrap();
        let mut trade = Trade {
            trade_id: id.to_string(),
            symbol: symbol.to_string(),
            side: Side::Buy,
            entry_price: 100.0,
            quantity: 1,
            entry_timestamp: entry,
            exit_price: None,
            exit_timestamp: None,
            pnl: 0.0,
            status: TradeStatus::Open,
            strategy: "balanced".to_string(),
            strategy_signal: String::new(),
            confidence: None,
            margin_reserved: 20.0,
            exit_reason: None,
        };
        trade.close(100.0 + pnl, entry + chrono::Duration::minutes(5), ExitReason::TakeProfit);
        trade
    }

    #[test]
    fn report_sections_reflect_trades() {
        let trades = vec![closed("a", "INFY.NS", 50.0), closed("b", "SBIN.NS", -30.0)];
        let mut capital = CapitalAccount::new(100_000.0);
        capital.reserve(20.0);
        capital.settle(20.0, 50.0);
        capital.reserve(20.0);
        capital.settle(20.0, -30.0);

        let report = PerformanceReport::build("s1", &trades, &capital, &PositionLedger::new());

        assert_eq!(report.performance_metrics.total_pnl, 20.0);
        assert_eq!(report.performance_metrics.win_rate, 50.0);
        assert_eq!(report.portfolio_summary.current_capital, 100_020.0);
        assert_eq!(report.trade_statistics.exits_by_reason.get("TAKE_PROFIT"), Some(&2));
        assert_eq!(report.market_coverage.sectors_traded, vec!["Banking", "IT Services"]);
        assert_eq!(report.risk_metrics.daily_returns.len(), 1);
        assert_eq!(report.filename(), "performance_s1.json");

        let json = serde_json::to_value(&report).unwrap();
        for section in [
            "portfolio_summary",
            "performance_metrics",
            "trade_statistics",
            "risk_metrics",
            "market_coverage",
        ] {
            assert!(json.get(section).is_some(), "missing {}", section);
        }
    }
}
