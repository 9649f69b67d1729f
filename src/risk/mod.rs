//! Risk rules - Position sizing and exit conditions
//!
//! Implements:
//! - Notional-target position sizing capped by available capital
//! - Take-profit / stop-loss thresholds on the side-aware return
//! - Bar-count based position expiry
//! - Named exit presets (one parameter table instead of per-strategy copies)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::types::{ExitReason, Trade};

/// Position sizing configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSizer {
    /// Notional value aimed for per trade
    pub target_position_value: f64,
    /// Fraction of available capital a single trade may use
    pub max_capital_fraction: f64,
    /// Smallest tradeable quantity
    pub min_quantity: i64,
}

impl Default for PositionSizer {
    fn default() -> Self {
        Self {
            target_position_value: 50_000.0,
            max_capital_fraction: 0.95,
            min_quantity: 1,
        }
    }
}

impl PositionSizer {
    /// Quantity to trade at `price`; 0 when nothing is affordable
    pub fn size(&self, price: f64, available_capital: f64) -> i64 {
        if price <= 0.0 || !price.is_finite() {
            return 0;
        }
        let target = (self.target_position_value / price).floor() as i64;
        let affordable =
            (available_capital.max(0.0) * self.max_capital_fraction / price).floor() as i64;
        if affordable < self.min_quantity {
            return 0;
        }
        target.min(affordable).max(self.min_quantity)
    }
}

/// Exit thresholds, expressed as fractions (0.002 = 0.2%)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExitRules {
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    /// Bars a trade may stay open before a TIME_EXIT
    pub max_hold_bars: u64,
}

impl Default for ExitRules {
    fn default() -> Self {
        ExitPreset::Balanced.rules()
    }
}

impl ExitRules {
    /// First exit condition hit by `trade` at `price` after `hold_bars`
    pub fn check(&self, trade: &Trade, price: f64, hold_bars: u64) -> Option<ExitReason> {
        if !trade.is_open() {
            return None;
        }
        if self.max_hold_bars > 0 && hold_bars >= self.max_hold_bars {
            return Some(ExitReason::TimeExit);
        }
        let ret = trade.return_at(price);
        if self.take_profit_pct > 0.0 && ret >= self.take_profit_pct {
            Some(ExitReason::TakeProfit)
        } else if self.stop_loss_pct > 0.0 && ret <= -self.stop_loss_pct {
            Some(ExitReason::StopLoss)
        } else {
            None
        }
    }
}

/// Built-in exit parameter sets of the breakout strategy family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitPreset {
    /// 1-minute scalping: tight stop, small target, 8 bars
    Balanced,
    Momentum,
    ScaledMomentum,
    /// Longer holds waiting for bigger moves
    Optimized,
}

impl ExitPreset {
    pub fn rules(&self) -> ExitRules {
        match self {
            ExitPreset::Balanced => ExitRules {
                take_profit_pct: 0.0020,
                stop_loss_pct: 0.0015,
                max_hold_bars: 8,
            },
            ExitPreset::Momentum => ExitRules {
                take_profit_pct: 0.018,
                stop_loss_pct: 0.006,
                max_hold_bars: 15,
            },
            ExitPreset::ScaledMomentum => ExitRules {
                take_profit_pct: 0.020,
                stop_loss_pct: 0.005,
                max_hold_bars: 12,
            },
            ExitPreset::Optimized => ExitRules {
                take_profit_pct: 0.015,
                stop_loss_pct: 0.005,
                max_hold_bars: 25,
            },
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "balanced" | "balanced_breakout" | "default" => Some(ExitPreset::Balanced),
            "momentum" | "momentum_breakout" => Some(ExitPreset::Momentum),
            "scaled_momentum" => Some(ExitPreset::ScaledMomentum),
            "optimized" | "optimized_breakout" => Some(ExitPreset::Optimized),
            _ => None,
        }
    }
}

/// Exit rules per strategy name, with a fallback for unknown strategies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitTable {
    #[serde(default)]
    pub default: ExitRules,
    #[serde(default)]
    pub strategies: BTreeMap<String, ExitRules>,
}

impl Default for ExitTable {
    fn default() -> Self {
        Self::uniform(ExitRules::default())
    }
}

impl ExitTable {
    pub fn uniform(rules: ExitRules) -> Self {
        Self {
            default: rules,
            strategies: BTreeMap::new(),
        }
    }

    pub fn with_strategy(mut self, strategy: &str, rules: ExitRules) -> Self {
        self.strategies.insert(strategy.to_string(), rules);
        self
    }

    pub fn rules_for(&self, strategy: &str) -> ExitRules {
        self.strategies
            .get(strategy)
            .copied()
            .unwrap_or(self.default)
    }

    /// Load a YAML table:
    ///
    /// ```yaml
    /// default: { take_profit_pct: 0.002, stop_loss_pct: 0.0015, max_hold_bars: 8 }
    /// strategies:
    ///   momentum: { take_profit_pct: 0.018, stop_loss_pct: 0.006, max_hold_bars: 15 }
    /// ```
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed reading exit table {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("Failed parsing exit table {}", path.display()))
    }
}
