//! Core traits - Seams where collaborators plug into the engine

use rust_decimal::Decimal;

use crate::core::types::*;
use crate::ledger::AccountLedger;

/// Reference price source, implemented by the price feed
pub trait PricingOracle: Send + Sync {
    /// Current reference price for a symbol, if any tick has been seen
    fn price(&self, symbol: &Symbol) -> Option<Decimal>;
}

/// Decides when and how much of an order fills.
///
/// The engine never originates fills: whatever a matcher returns is fed back
/// through `TradingEngine::apply_fill` like any other collaborator event.
pub trait MatchingStub: Send + Sync {
    /// Fill decision for an active order at the given reference price
    fn evaluate(&self, order: &Order, price: Decimal) -> Option<FillConfirmation>;

    fn name(&self) -> &str;
}

/// What to do once a position's mark price crosses its liquidation price
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiquidationAction {
    Ignore,
    ForceClose,
}

/// Hook invoked for every detected liquidation crossing
pub trait LiquidationHandler: Send + Sync {
    fn on_crossing(&self, position: &Position) -> LiquidationAction;
}

/// Hook invoked for every realized close, full or partial
pub trait PnlRealizer: Send + Sync {
    fn realize(&self, ledger: &mut AccountLedger, realization: &Realization);
}
