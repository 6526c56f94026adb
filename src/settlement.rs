//! Settlement hooks - liquidation and realized-PnL policies

use crate::core::{Error, LiquidationAction, LiquidationHandler, PnlRealizer, Position, Realization};
use crate::ledger::AccountLedger;

/// Report crossings, leave the position open for the backend to act on.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectOnly;

impl LiquidationHandler for DetectOnly {
    fn on_crossing(&self, position: &Position) -> LiquidationAction {
        tracing::warn!(
            position = %position.id,
            symbol = %position.symbol,
            mark = %position.mark_price,
            liquidation = %position.liquidation_price,
            "Liquidation crossing left to backend"
        );
        LiquidationAction::Ignore
    }
}

/// Close the whole position at the crossing tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForceClose;

impl LiquidationHandler for ForceClose {
    fn on_crossing(&self, _position: &Position) -> LiquidationAction {
        LiquidationAction::ForceClose
    }
}

/// Leave the ledger untouched; the backend settles realized PnL.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeferToBackend;

impl PnlRealizer for DeferToBackend {
    fn realize(&self, _ledger: &mut AccountLedger, realization: &Realization) {
        tracing::debug!(
            position = %realization.position_id,
            pnl = %realization.realized_pnl,
            "Realized PnL deferred to backend"
        );
    }
}

/// Release the closed margin and settle realized PnL net of the close fee.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreditLedger;

impl PnlRealizer for CreditLedger {
    fn realize(&self, ledger: &mut AccountLedger, realization: &Realization) {
        let settled = realization
            .released_margin
            .checked_add(realization.realized_pnl)
            .and_then(|d| d.checked_sub(realization.fee))
            .ok_or(Error::Overflow("settlement"))
            .and_then(|delta| ledger.settle(delta).map(|balance| (delta, balance)));

        match settled {
            Ok((delta, balance)) => tracing::info!(
                position = %realization.position_id,
                pnl = %realization.realized_pnl,
                delta = %delta,
                balance = %balance,
                "Realized PnL credited"
            ),
            Err(e) => tracing::warn!(
                position = %realization.position_id,
                pnl = %realization.realized_pnl,
                "Realized PnL not credited: {}", e
            ),
        }
    }
}
