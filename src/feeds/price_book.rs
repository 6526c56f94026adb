//! Price book - last applied tick per symbol

use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::core::{PriceTick, PricingOracle, Symbol};

/// Reference prices fed by the price feed.
///
/// Ticks are applied in arrival order; an older or duplicate tick arriving
/// late still overwrites (last applied wins).
pub struct PriceBook {
    ticks: RwLock<HashMap<Symbol, PriceTick>>,
}

impl PriceBook {
    pub fn new() -> Self {
        Self {
            ticks: RwLock::new(HashMap::new()),
        }
    }

    /// Store a tick. Non-positive prices are ignored.
    pub fn apply(&self, tick: &PriceTick) -> bool {
        if tick.price <= Decimal::ZERO {
            tracing::warn!("Dropping non-positive tick for {}: {}", tick.symbol, tick.price);
            return false;
        }
        self.ticks.write().insert(tick.symbol.clone(), tick.clone());
        true
    }

    pub fn last(&self, symbol: &Symbol) -> Option<PriceTick> {
        self.ticks.read().get(symbol).cloned()
    }

    /// Snapshot all prices (for diagnostics / UI).
    pub fn snapshot(&self) -> HashMap<Symbol, PriceTick> {
        self.ticks.read().clone()
    }
}

impl Default for PriceBook {
    fn default() -> Self {
        Self::new()
    }
}

impl PricingOracle for PriceBook {
    fn price(&self, symbol: &Symbol) -> Option<Decimal> {
        self.ticks.read().get(symbol).map(|t| t.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_last_applied_wins() {
        let book = PriceBook::new();
        let newer = PriceTick { symbol: Symbol::new("BTC"), price: dec!(35100), timestamp: 2_000 };
        let older = PriceTick { symbol: Symbol::new("btc"), price: dec!(35000), timestamp: 1_000 };

        assert!(book.apply(&newer));
        assert!(book.apply(&older));
        assert_eq!(book.price(&Symbol::new("BTC")), Some(dec!(35000)));
    }

    #[test]
    fn test_rejects_non_positive() {
        let book = PriceBook::new();
        assert!(!book.apply(&PriceTick::new("ETH", Decimal::ZERO)));
        assert!(book.price(&Symbol::new("ETH")).is_none());
        assert!(book.snapshot().is_empty());
    }
}
