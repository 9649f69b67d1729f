//! Broker capability used by the paper engine
//!
//! The engine only needs four operations from the broker/data layer. A real
//! brokerage adapter implements [`Broker`]; [`PaperBroker`] is an in-memory
//! stand-in that fills every order immediately.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::types::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
    Limit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub symbol: String,
    pub side: Side,
    pub qty: i64,
    pub order_type: OrderType,
    /// Limit price; ignored for market orders
    pub limit_price: f64,
    /// Engine trade id the order belongs to
    pub tag: String,
}

impl Order {
    pub fn market(symbol: &str, side: Side, qty: i64, tag: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            qty,
            order_type: OrderType::Market,
            limit_price: 0.0,
            tag: tag.to_string(),
        }
    }

    pub fn limit(symbol: &str, side: Side, qty: i64, price: f64, tag: &str) -> Self {
        Self {
            order_type: OrderType::Limit,
            limit_price: price,
            ..Self::market(symbol, side, qty, tag)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub symbol: String,
    pub net_qty: i64,
    pub avg_price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Funds {
    pub available_balance: f64,
    pub utilized_amount: f64,
}

#[cfg_attr(test, mockall::automock)]
pub trait Broker {
    fn get_positions(&self) -> Result<Vec<BrokerPosition>>;
    fn get_funds(&self) -> Result<Funds>;
    fn get_live_price(&self, symbol: &str) -> Result<f64>;
    /// Returns the broker order id
    fn place_order(&mut self, order: &Order) -> Result<String>;
}

/// Immediate-fill broker backed by a price map
#[derive(Debug, Clone, Default)]
pub struct PaperBroker {
    prices: HashMap<String, f64>,
    positions: HashMap<String, BrokerPosition>,
    funds: Funds,
    order_counter: u64,
}

impl PaperBroker {
    pub fn new(cash: f64) -> Self {
        Self {
            funds: Funds {
                available_balance: cash,
                utilized_amount: 0.0,
            },
            ..Self::default()
        }
    }

    pub fn set_price(&mut self, symbol: &str, price: f64) {
        self.prices.insert(symbol.to_string(), price);
    }

    fn fill_price(&self, order: &Order) -> Result<f64> {
        match order.order_type {
            OrderType::Limit if order.limit_price > 0.0 => Ok(order.limit_price),
            _ => self.get_live_price(&order.symbol),
        }
    }
}

impl Broker for PaperBroker {
    fn get_positions(&self) -> Result<Vec<BrokerPosition>> {
        let mut positions: Vec<BrokerPosition> = self
            .positions
            .values()
            .filter(|p| p.net_qty != 0)
            .cloned()
            .collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(positions)
    }

    fn get_funds(&self) -> Result<Funds> {
        Ok(self.funds)
    }

    fn get_live_price(&self, symbol: &str) -> Result<f64> {
        match self.prices.get(symbol) {
            Some(&price) if price > 0.0 => Ok(price),
            _ => bail!("No live price for {}", symbol),
        }
    }

    fn place_order(&mut self, order: &Order) -> Result<String> {
        if order.qty <= 0 {
            bail!("Order quantity must be positive, got {}", order.qty);
        }
        let price = self.fill_price(order)?;
        let delta = order.side.signed(order.qty);

        let pos = self
            .positions
            .entry(order.symbol.clone())
            .or_insert_with(|| BrokerPosition {
                symbol: order.symbol.clone(),
                net_qty: 0,
                avg_price: 0.0,
            });
        let new_qty = pos.net_qty + delta;
        if pos.net_qty == 0 || pos.net_qty.signum() == delta.signum() {
            // Adding to (or opening) a position: blend the average price.
            let old_value = pos.avg_price * pos.net_qty.abs() as f64;
            pos.avg_price = (old_value + price * order.qty as f64) / new_qty.abs() as f64;
        } else if new_qty == 0 {
            pos.avg_price = 0.0;
        } else if new_qty.signum() != pos.net_qty.signum() {
            // Flipped through flat: the remainder opens at the fill price.
            pos.avg_price = price;
        }
        pos.net_qty = new_qty;

        let value = price * order.qty as f64;
        match order.side {
            Side::Buy => self.funds.available_balance -= value,
            Side::Sell => self.funds.available_balance += value,
        }
        self.funds.utilized_amount = self
            .positions
            .values()
            .map(|p| p.avg_price * p.net_qty.abs() as f64)
            .sum();

        self.order_counter += 1;
        let order_id = format!("PB-{:06}", self.order_counter);
        debug!(
            order_id = %order_id,
            symbol = %order.symbol,
            side = %order.side,
            qty = order.qty,
            price = price,
            tag = %order.tag,
            "[PAPER] Broker fill"
        );
        Ok(order_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_order_requires_live_price() {
        let mut broker = PaperBroker::new(10_000.0);
        let order = Order::market("TCS.NS", Side::Buy, 5, "PT_x_0001");
        assert!(broker.place_order(&order).is_err());

        broker.set_price("TCS.NS", 100.0);
        assert_eq!(broker.place_order(&order).unwrap(), "PB-000001");
        assert_eq!(broker.get_funds().unwrap().available_balance, 9_500.0);
    }

    #[test]
    fn positions_net_out_and_average() {
        let mut broker = PaperBroker::new(10_000.0);
        broker
            .place_order(&Order::limit("SBIN.NS", Side::Buy, 10, 100.0, "a"))
            .unwrap();
        broker
            .place_order(&Order::limit("SBIN.NS", Side::Buy, 10, 110.0, "b"))
            .unwrap();

        let positions = broker.get_positions().unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].net_qty, 20);
        assert!((positions[0].avg_price - 105.0).abs() < 1e-9);

        broker
            .place_order(&Order::limit("SBIN.NS", Side::Sell, 20, 120.0, "c"))
            .unwrap();
        assert!(broker.get_positions().unwrap().is_empty());
    }
}
