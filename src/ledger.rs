//! Position ledger and capital account
//!
//! The ledger tracks the net signed quantity per symbol; the capital account
//! tracks free capital, margin reserved by open trades, and the equity peak
//! used for drawdown.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::Side;

/// Net signed quantity per symbol (long > 0, short < 0)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionLedger {
    positions: BTreeMap<String, i64>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quantity(&self, symbol: &str) -> i64 {
        self.positions.get(symbol).copied().unwrap_or(0)
    }

    /// Apply a signed delta and return the new net quantity
    pub fn apply(&mut self, symbol: &str, delta: i64) -> i64 {
        let qty = self.positions.entry(symbol.to_string()).or_insert(0);
        *qty += delta;
        *qty
    }

    pub fn open(&mut self, symbol: &str, side: Side, quantity: i64) -> i64 {
        self.apply(symbol, side.signed(quantity))
    }

    /// Revert the delta applied by `open`
    pub fn close(&mut self, symbol: &str, side: Side, quantity: i64) -> i64 {
        self.apply(symbol, -side.signed(quantity))
    }

    /// Non-flat positions only
    pub fn active(&self) -> BTreeMap<String, i64> {
        self.positions
            .iter()
            .filter(|(_, qty)| **qty != 0)
            .map(|(symbol, qty)| (symbol.clone(), *qty))
            .collect()
    }

    pub fn all(&self) -> &BTreeMap<String, i64> {
        &self.positions
    }

    pub fn clear(&mut self) {
        self.positions.clear();
    }
}

/// Fraction of notional reserved from capital while a position is open
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarginModel {
    pub long_margin_pct: f64,
    pub short_margin_pct: f64,
}

impl Default for MarginModel {
    fn default() -> Self {
        Self {
            long_margin_pct: 0.20,
            short_margin_pct: 0.25,
        }
    }
}

impl MarginModel {
    pub fn pct(&self, side: Side) -> f64 {
        match side {
            Side::Buy => self.long_margin_pct,
            Side::Sell => self.short_margin_pct,
        }
    }

    pub fn required(&self, side: Side, price: f64, quantity: i64) -> f64 {
        price * quantity as f64 * self.pct(side)
    }
}

/// Free capital plus reserved margin, with incremental drawdown tracking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapitalAccount {
    initial: f64,
    capital: f64,
    reserved_margin: f64,
    peak_equity: f64,
    max_drawdown_pct: f64,
}

impl CapitalAccount {
    pub fn new(initial: f64) -> Self {
        Self {
            initial,
            capital: initial,
            reserved_margin: 0.0,
            peak_equity: initial,
            max_drawdown_pct: 0.0,
        }
    }

    pub fn initial(&self) -> f64 {
        self.initial
    }

    /// Capital available for new margin
    pub fn available(&self) -> f64 {
        self.capital
    }

    pub fn reserved_margin(&self) -> f64 {
        self.reserved_margin
    }

    /// Free capital plus margin held by open trades
    pub fn equity(&self) -> f64 {
        self.capital + self.reserved_margin
    }

    pub fn peak_equity(&self) -> f64 {
        self.peak_equity
    }

    /// Largest peak-to-current equity decline seen, in percent
    pub fn max_drawdown_pct(&self) -> f64 {
        self.max_drawdown_pct
    }

    pub fn current_drawdown_pct(&self) -> f64 {
        if self.peak_equity > 0.0 {
            ((self.peak_equity - self.equity()) / self.peak_equity * 100.0).max(0.0)
        } else {
            0.0
        }
    }

    pub fn can_reserve(&self, margin: f64) -> bool {
        margin <= self.capital
    }

    pub fn reserve(&mut self, margin: f64) {
        self.capital -= margin;
        self.reserved_margin += margin;
        self.track_drawdown();
    }

    /// Release margin and credit realized P&L
    pub fn settle(&mut self, margin: f64, pnl: f64) {
        self.reserved_margin -= margin;
        if self.reserved_margin.abs() < 1e-9 {
            self.reserved_margin = 0.0;
        }
        self.capital += margin + pnl;
        self.track_drawdown();
    }

    fn track_drawdown(&mut self) {
        let equity = self.equity();
        if equity > self.peak_equity {
            self.peak_equity = equity;
        } else {
            self.max_drawdown_pct = self.max_drawdown_pct.max(self.current_drawdown_pct());
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.initial);
    }
}
