//! Intradar Library
//!
//! Paper-trading ledger and performance accounting for intraday breakout
//! strategies

pub mod broker;
pub mod config;
pub mod error;
pub mod ledger;
pub mod paper_trading;
pub mod performance;
pub mod persistence;
pub mod risk;
pub mod types;

pub use error::EngineError;
pub use paper_trading::{PaperTradingConfig, PaperTradingEngine};
pub use types::{Bar, ExitReason, Side, Signal, Trade, TradeStatus};
