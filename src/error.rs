//! Engine error types

use thiserror::Error;

use crate::types::Side;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Invalid quantity {quantity} for {symbol}")]
    InvalidQuantity { symbol: String, quantity: i64 },

    #[error("Invalid price {price} for {symbol}")]
    InvalidPrice { symbol: String, price: f64 },

    #[error("Insufficient funds: required {required:.2}, available {available:.2}")]
    InsufficientFunds { required: f64, available: f64 },

    #[error("Position already open for {symbol} ({quantity:+})")]
    PositionAlreadyOpen { symbol: String, quantity: i64 },

    #[error("Order rejected by broker for {side} {symbol}: {reason}")]
    OrderRejected {
        symbol: String,
        side: Side,
        reason: String,
    },

    #[error("Trade {0} not found")]
    TradeNotFound(String),

    #[error("Trade {0} is already CLOSED")]
    TradeAlreadyClosed(String),
}

impl EngineError {
    /// Rejections raised before any state change on open
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            Self::TradeNotFound(_) | Self::TradeAlreadyClosed(_)
        )
    }
}
