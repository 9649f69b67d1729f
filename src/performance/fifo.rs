//! FIFO lot matching
//!
//! Closing legs consume the oldest open lots of the opposite side on the same
//! symbol, partially when needed. Whatever a leg does not consume opens a new
//! lot, so both long and short round trips are produced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use super::RoundTrip;
use crate::persistence::TradeEventRecord;
use crate::types::Side;

/// One executed order leg
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub symbol: String,
    pub side: Side,
    pub qty: i64,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

impl From<&TradeEventRecord> for Fill {
    fn from(event: &TradeEventRecord) -> Self {
        Self {
            symbol: event.symbol.clone(),
            side: event.side,
            qty: event.qty,
            price: event.price,
            timestamp: event.timestamp,
        }
    }
}

#[derive(Debug, Clone)]
struct Lot {
    side: Side,
    remaining: i64,
    price: f64,
    timestamp: DateTime<Utc>,
}

/// Match `fills` (in execution order) into round trips
pub fn match_fills(fills: &[Fill]) -> Vec<RoundTrip> {
    let mut books: HashMap<&str, VecDeque<Lot>> = HashMap::new();
    let mut round_trips = Vec::new();

    for fill in fills.iter().filter(|f| f.qty > 0) {
        let lots = books.entry(fill.symbol.as_str()).or_default();
        let mut remaining = fill.qty;

        while remaining > 0 {
            let Some(lot) = lots.front_mut() else { break };
            if lot.side == fill.side {
                break;
            }
            let matched = remaining.min(lot.remaining);
            let qty = matched as f64;
            let pnl = match lot.side {
                Side::Buy => (fill.price - lot.price) * qty,
                Side::Sell => (lot.price - fill.price) * qty,
            };
            round_trips.push(RoundTrip {
                symbol: fill.symbol.clone(),
                side: lot.side,
                quantity: matched,
                entry_price: lot.price,
                exit_price: fill.price,
                entry_timestamp: lot.timestamp,
                exit_timestamp: fill.timestamp,
                pnl,
            });

            lot.remaining -= matched;
            remaining -= matched;
            if lot.remaining == 0 {
                lots.pop_front();
            }
        }

        if remaining > 0 {
            lots.push_back(Lot {
                side: fill.side,
                remaining,
                price: fill.price,
                timestamp: fill.timestamp,
            });
        }
    }

    round_trips
}

/// Unmatched quantity per symbol after matching (signed)
pub fn open_lots(fills: &[Fill]) -> HashMap<String, i64> {
    let mut net: HashMap<String, i64> = HashMap::new();
    for fill in fills.iter().filter(|f| f.qty > 0) {
        *net.entry(fill.symbol.clone()).or_insert(0) += fill.side.signed(fill.qty);
    }
    net.retain(|_, qty| *qty != 0);
    net
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fill(symbol: &str, side: Side, qty: i64, price: f64, minute: u32) -> Fill {
        Fill {
            symbol: symbol.to_string(),
            side,
            qty,
            price,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 8, 10, minute, 0).unwrap(),
        }
    }

    #[test]
    fn sell_consumes_oldest_buy_first() {
        let fills = vec![
            fill("ITC.NS", Side::Buy, 10, 100.0, 0),
            fill("ITC.NS", Side::Buy, 10, 110.0, 1),
            fill("ITC.NS", Side::Sell, 15, 120.0, 2),
        ];
        let trips = match_fills(&fills);

        assert_eq!(trips.len(), 2);
        assert_eq!(trips[0].quantity, 10);
        assert_eq!(trips[0].pnl, 200.0);
        assert_eq!(trips[1].quantity, 5);
        assert_eq!(trips[1].entry_price, 110.0);
        assert_eq!(trips[1].pnl, 50.0);
        assert_eq!(open_lots(&fills).get("ITC.NS"), Some(&5));
    }

    #[test]
    fn short_lots_are_covered_by_buys() {
        let fills = vec![
            fill("WIPRO.NS", Side::Sell, 20, 400.0, 0),
            fill("WIPRO.NS", Side::Buy, 20, 390.0, 5),
        ];
        let trips = match_fills(&fills);

        assert_eq!(trips.len(), 1);
        assert_eq!(trips[0].side, Side::Sell);
        assert_eq!(trips[0].pnl, 200.0);
        assert!(open_lots(&fills).is_empty());
    }

    #[test]
    fn oversized_leg_flips_the_position() {
        let fills = vec![
            fill("LT.NS", Side::Buy, 5, 100.0, 0),
            fill("LT.NS", Side::Sell, 8, 104.0, 1),
            fill("LT.NS", Side::Buy, 3, 101.0, 2),
        ];
        let trips = match_fills(&fills);

        assert_eq!(trips.len(), 2);
        assert_eq!(trips[0].pnl, 20.0);
        // 3 shares shorted at 104 and covered at 101
        assert_eq!(trips[1].side, Side::Sell);
        assert_eq!(trips[1].pnl, 9.0);
    }

    #[test]
    fn symbols_are_matched_independently() {
        let fills = vec![
            fill("A", Side::Buy, 1, 10.0, 0),
            fill("B", Side::Sell, 1, 20.0, 1),
        ];
        assert!(match_fills(&fills).is_empty());
        assert_eq!(open_lots(&fills).len(), 2);
    }
}
