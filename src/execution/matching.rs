//! Paper matching - deterministic local stand-in for the matching backend

use rust_decimal::Decimal;
use tracing::debug;

use crate::core::{FillConfirmation, MatchingStub, Order, OrderKind, PricingOracle, Side};

/// Fills against the reference price only; no book, no partial fills.
///
/// MARKET fills at once. LIMIT fills when the price is at or better than the
/// limit; STOP fills once the price trades through the stop.
#[derive(Debug, Clone, Default)]
pub struct PaperMatcher;

impl PaperMatcher {
    pub fn new() -> Self {
        Self
    }

    fn triggered(order: &Order, price: Decimal) -> bool {
        match (order.kind, order.side) {
            (OrderKind::Market, _) => true,
            (OrderKind::Limit, Side::Buy) => price <= order.price,
            (OrderKind::Limit, Side::Sell) => price >= order.price,
            (OrderKind::Stop, Side::Buy) => price >= order.price,
            (OrderKind::Stop, Side::Sell) => price <= order.price,
        }
    }
}

impl MatchingStub for PaperMatcher {
    fn evaluate(&self, order: &Order, price: Decimal) -> Option<FillConfirmation> {
        if !order.status.is_active() || order.remaining() <= Decimal::ZERO {
            return None;
        }
        if !Self::triggered(order, price) {
            return None;
        }

        // LIMIT fills at its own price, the rest at the reference price
        let fill_price = match order.kind {
            OrderKind::Limit => order.price,
            OrderKind::Market | OrderKind::Stop => price,
        };

        Some(FillConfirmation {
            order_id: order.id,
            filled_delta: order.remaining(),
            fill_price,
        })
    }

    fn name(&self) -> &str {
        "paper"
    }
}

/// Run a matcher over active orders, pricing each from the oracle.
pub fn sweep(matcher: &dyn MatchingStub, orders: &[Order], oracle: &dyn PricingOracle) -> Vec<FillConfirmation> {
    let fills: Vec<FillConfirmation> = orders
        .iter()
        .filter_map(|order| {
            let price = oracle.price(&order.symbol)?;
            matcher.evaluate(order, price)
        })
        .collect();

    if !fills.is_empty() {
        debug!("{} matcher produced {} fills", matcher.name(), fills.len());
    }
    fills
}
