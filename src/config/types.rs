//! Configuration section types

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct PaperTradingSection {
    /// Starting virtual capital
    pub initial_capital: f64,
    /// Margin reserved on long entries (0.20 = 20% of notional)
    pub long_margin_pct: f64,
    /// Margin reserved on short entries
    pub short_margin_pct: f64,
    pub single_position_per_symbol: bool,
    /// Resume an existing session instead of generating a new id
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SizingSection {
    pub target_position_value: f64,
    pub max_capital_fraction: f64,
    pub min_quantity: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExitsSection {
    /// balanced | momentum | scaled_momentum | optimized
    pub preset: String,
    #[serde(default)]
    pub take_profit_pct: Option<f64>,
    #[serde(default)]
    pub stop_loss_pct: Option<f64>,
    #[serde(default)]
    pub max_hold_bars: Option<u64>,
    /// YAML exit table with per-strategy rules; replaces the preset
    #[serde(default)]
    pub table_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceSection {
    /// Directory for the event log, snapshot and reports
    pub log_dir: String,
    pub json_snapshot_enabled: bool,
    pub write_report_on_end: bool,
}
