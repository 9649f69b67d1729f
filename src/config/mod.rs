//! Configuration management for Intradar
//!
//! Loads from YAML files + environment variables via .env

mod types;

pub use types::*;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::ledger::MarginModel;
use crate::paper_trading::PaperTradingConfig;
use crate::risk::{ExitPreset, ExitRules, ExitTable, PositionSizer};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub paper_trading: PaperTradingSection,
    pub sizing: SizingSection,
    pub exits: ExitsSection,
    pub persistence: PersistenceSection,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Paper trading defaults
            .set_default("paper_trading.initial_capital", 100_000.0)?
            .set_default("paper_trading.long_margin_pct", 0.20)?
            .set_default("paper_trading.short_margin_pct", 0.25)?
            .set_default("paper_trading.single_position_per_symbol", false)?
            // Sizing defaults
            .set_default("sizing.target_position_value", 50_000.0)?
            .set_default("sizing.max_capital_fraction", 0.95)?
            .set_default("sizing.min_quantity", 1)?
            // Exit defaults
            .set_default("exits.preset", "balanced")?
            // Persistence defaults
            .set_default("persistence.log_dir", "./logs")?
            .set_default("persistence.json_snapshot_enabled", true)?
            .set_default("persistence.write_report_on_end", true)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (INTRADAR__*)
            .add_source(Environment::with_prefix("INTRADAR").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app_config.validate()?;

        Ok(app_config)
    }

    pub fn validate(&self) -> Result<()> {
        let pt = &self.paper_trading;
        if !(pt.initial_capital > 0.0) {
            bail!("paper_trading.initial_capital must be positive, got {}", pt.initial_capital);
        }
        for (key, pct) in [
            ("long_margin_pct", pt.long_margin_pct),
            ("short_margin_pct", pt.short_margin_pct),
        ] {
            if !(pct > 0.0 && pct <= 1.0) {
                bail!("paper_trading.{} must be in (0, 1], got {}", key, pct);
            }
        }
        if !(self.sizing.max_capital_fraction > 0.0 && self.sizing.max_capital_fraction <= 1.0) {
            bail!(
                "sizing.max_capital_fraction must be in (0, 1], got {}",
                self.sizing.max_capital_fraction
            );
        }
        if self.sizing.min_quantity < 1 {
            bail!("sizing.min_quantity must be at least 1");
        }
        Ok(())
    }

    /// Resolve the exit table: a table file when given, else the preset
    /// with any per-field overrides
    pub fn exit_table(&self) -> Result<ExitTable> {
        if let Some(path) = &self.exits.table_file {
            return ExitTable::from_yaml_file(Path::new(path));
        }
        let Some(preset) = ExitPreset::from_name(&self.exits.preset) else {
            bail!("Unknown exit preset: {}", self.exits.preset);
        };
        let base = preset.rules();
        Ok(ExitTable::uniform(ExitRules {
            take_profit_pct: self.exits.take_profit_pct.unwrap_or(base.take_profit_pct),
            stop_loss_pct: self.exits.stop_loss_pct.unwrap_or(base.stop_loss_pct),
            max_hold_bars: self.exits.max_hold_bars.unwrap_or(base.max_hold_bars),
        }))
    }

    pub fn to_engine_config(&self) -> Result<PaperTradingConfig> {
        let pt = &self.paper_trading;
        Ok(PaperTradingConfig {
            initial_capital: pt.initial_capital,
            margin: MarginModel {
                long_margin_pct: pt.long_margin_pct,
                short_margin_pct: pt.short_margin_pct,
            },
            sizer: PositionSizer {
                target_position_value: self.sizing.target_position_value,
                max_capital_fraction: self.sizing.max_capital_fraction,
                min_quantity: self.sizing.min_quantity,
            },
            exits: self.exit_table()?,
            single_position_per_symbol: pt.single_position_per_symbol,
            session_id: pt.session_id.clone(),
            write_report_on_end: self.persistence.write_report_on_end,
        })
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "capital={:.2} margin={:.0}%/{:.0}% preset={} single_pos={} log_dir={}",
            self.paper_trading.initial_capital,
            self.paper_trading.long_margin_pct * 100.0,
            self.paper_trading.short_margin_pct * 100.0,
            self.exits.table_file.as_deref().unwrap_or(self.exits.preset.as_str()),
            self.paper_trading.single_position_per_symbol,
            self.persistence.log_dir
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AppConfig {
        AppConfig {
            paper_trading: PaperTradingSection {
                initial_capital: 100_000.0,
                long_margin_pct: 0.20,
                short_margin_pct: 0.25,
                single_position_per_symbol: false,
                session_id: None,
            },
            sizing: SizingSection {
                target_position_value: 50_000.0,
                max_capital_fraction: 0.95,
                min_quantity: 1,
            },
            exits: ExitsSection {
                preset: "balanced".to_string(),
                take_profit_pct: None,
                stop_loss_pct: None,
                max_hold_bars: None,
                table_file: None,
            },
            persistence: PersistenceSection {
                log_dir: "./logs".to_string(),
                json_snapshot_enabled: true,
                write_report_on_end: true,
            },
        }
    }

    #[test]
    fn load_uses_defaults_without_files() {
        let config = AppConfig::load().unwrap();
        assert!(config.paper_trading.initial_capital > 0.0);
        assert!(ExitPreset::from_name(&config.exits.preset).is_some());
    }

    #[test]
    fn overrides_apply_on_top_of_preset() {
        let mut config = sample();
        config.exits.preset = "momentum".to_string();
        config.exits.max_hold_bars = Some(30);

        let engine = config.to_engine_config().unwrap();
        let rules = engine.exits.rules_for("anything");
        assert_eq!(rules.take_profit_pct, 0.018);
        assert_eq!(rules.max_hold_bars, 30);
        assert_eq!(engine.margin.short_margin_pct, 0.25);
    }

    #[test]
    fn unknown_preset_is_an_error() {
        let mut config = sample();
        config.exits.preset = "yolo".to_string();
        assert!(config.to_engine_config().is_err());
    }

    #[test]
    fn validate_rejects_bad_margin() {
        let mut config = sample();
        config.paper_trading.long_margin_pct = 1.5;
        assert!(config.validate().is_err());
        assert!(sample().validate().is_ok());
        assert!(sample().digest().contains("margin=20%/25%"));
    }
}
