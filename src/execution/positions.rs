//! Position manager - merges fills into open positions and keeps them valued

use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::{
    AccountId, Error, Leverage, MarginMode, Position, PositionId, PositionKey, Result, Side, Symbol, now_ms,
};
use crate::risk::RiskCalculator;

/// A filled quantity to merge into the (symbol, side) position
#[derive(Debug, Clone)]
pub struct PositionFill {
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Decimal,
    pub leverage: Leverage,
    pub margin_mode: MarginMode,
    /// Share of the order's debited margin carried by this fill
    pub margin: Decimal,
}

/// Result of closing part or all of a position
#[derive(Debug, Clone)]
pub struct ClosedPortion {
    /// Position as it was before the close
    pub before: Position,
    pub quantity: Decimal,
    pub close_price: Decimal,
    pub realized_pnl: Decimal,
    pub released_margin: Decimal,
    /// `quantity × close_price × feeRate`
    pub fee: Decimal,
    /// Remainder after a partial close; `None` once fully closed
    pub remaining: Option<Position>,
}

/// Revaluation result for one price tick
#[derive(Debug, Clone, Default)]
pub struct TickOutcome {
    pub revalued: Vec<Position>,
    /// Positions whose mark crossed their liquidation price
    pub crossed: Vec<Position>,
}

/// Open positions of one account
pub struct PositionManager {
    account: AccountId,
    positions: HashMap<PositionId, Position>,
    index: HashMap<PositionKey, PositionId>,
}

impl PositionManager {
    pub fn new(account: AccountId) -> Self {
        Self {
            account,
            positions: HashMap::new(),
            index: HashMap::new(),
        }
    }

    /// Open a position, or average into the existing one for the same key.
    ///
    /// Every derived figure is computed before anything is written, so an
    /// overflow leaves the table unchanged.
    pub fn apply_fill(&mut self, fill: &PositionFill, risk: &RiskCalculator) -> Result<Position> {
        let key = PositionKey {
            account: self.account.clone(),
            symbol: fill.symbol.clone(),
            side: fill.side,
        };
        let now = now_ms();

        if let Some(position) = self.index.get(&key).and_then(|id| self.positions.get_mut(id)) {
            let amount = position.amount.checked_add(fill.quantity).ok_or(Error::Overflow("position amount"))?;
            let entry_price = position
                .entry_price
                .checked_mul(position.amount)
                .zip(fill.price.checked_mul(fill.quantity))
                .and_then(|(held, added)| held.checked_add(added))
                .and_then(|total| total.checked_div(amount))
                .ok_or(Error::Overflow("entry price"))?;
            let margin = position.margin.checked_add(fill.margin).ok_or(Error::Overflow("position margin"))?;
            let liquidation_price = risk.liquidation_price(position.side, entry_price, position.leverage)?;
            let unrealized_pnl =
                risk.unrealized_pnl(position.side, entry_price, fill.price, amount, position.leverage)?;

            position.amount = amount;
            position.entry_price = entry_price;
            position.mark_price = fill.price;
            position.margin = margin;
            position.liquidation_price = liquidation_price;
            position.unrealized_pnl = unrealized_pnl;
            position.updated_at = now;

            info!(
                "Averaged into {} {} position: amount={} entry={}",
                position.side, position.symbol, position.amount, position.entry_price
            );
            return Ok(position.clone());
        }

        let position = Position {
            id: Uuid::new_v4(),
            account: self.account.clone(),
            symbol: fill.symbol.clone(),
            side: fill.side,
            amount: fill.quantity,
            entry_price: fill.price,
            mark_price: fill.price,
            leverage: fill.leverage,
            margin_mode: fill.margin_mode,
            margin: fill.margin,
            unrealized_pnl: Decimal::ZERO,
            liquidation_price: risk.liquidation_price(fill.side, fill.price, fill.leverage)?,
            created_at: now,
            updated_at: now,
        };

        info!(
            "Opened {} {} position: amount={} entry={} liq={}",
            position.side, position.symbol, position.amount, position.entry_price, position.liquidation_price
        );
        self.index.insert(key, position.id);
        self.positions.insert(position.id, position.clone());
        Ok(position)
    }

    /// Close `quantity` (default: everything) of a position at `close_price`.
    ///
    /// A partial close keeps the mark price and revalues the remainder at it.
    pub fn close_position(
        &mut self,
        id: &PositionId,
        quantity: Option<Decimal>,
        close_price: Decimal,
        risk: &RiskCalculator,
    ) -> Result<ClosedPortion> {
        let position = self.positions.get_mut(id).ok_or_else(|| Error::position_not_found(id))?;
        let quantity = quantity.unwrap_or(position.amount);

        if quantity <= Decimal::ZERO || quantity > position.amount {
            return Err(Error::InvalidCloseAmount {
                requested: quantity,
                open: position.amount,
            });
        }

        let realized_pnl =
            risk.unrealized_pnl(position.side, position.entry_price, close_price, quantity, position.leverage)?;
        let fee = risk.trading_fee(risk.notional(quantity, close_price)?)?;
        let before = position.clone();

        if quantity == position.amount {
            self.index.remove(&before.key());
            self.positions.remove(id);
            info!("Closed {} {} position {} at {}", before.side, before.symbol, before.id, close_price);

            return Ok(ClosedPortion {
                released_margin: before.margin,
                before,
                quantity,
                close_price,
                realized_pnl,
                fee,
                remaining: None,
            });
        }

        let amount = position.amount - quantity;
        let released_margin = position
            .margin
            .checked_mul(quantity)
            .and_then(|m| m.checked_div(position.amount))
            .ok_or(Error::Overflow("released margin"))?;
        let unrealized_pnl =
            risk.unrealized_pnl(position.side, position.entry_price, position.mark_price, amount, position.leverage)?;

        position.amount = amount;
        position.margin -= released_margin;
        position.unrealized_pnl = unrealized_pnl;
        position.updated_at = now_ms();

        info!(
            "Reduced {} {} position {} by {}: remaining={}",
            position.side, position.symbol, position.id, quantity, position.amount
        );

        Ok(ClosedPortion {
            before,
            quantity,
            close_price,
            realized_pnl,
            released_margin,
            fee,
            remaining: Some(position.clone()),
        })
    }

    /// Mark every open position on `symbol` to `price`.
    ///
    /// A position whose PnL cannot be represented at `price` is skipped and
    /// keeps its previous mark.
    pub fn on_price_tick(&mut self, symbol: &Symbol, price: Decimal, risk: &RiskCalculator) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        let now = now_ms();

        for position in self.positions.values_mut().filter(|p| &p.symbol == symbol) {
            let unrealized_pnl =
                match risk.unrealized_pnl(position.side, position.entry_price, price, position.amount, position.leverage) {
                    Ok(pnl) => pnl,
                    Err(e) => {
                        warn!("Skipping revaluation of position {} @ {}: {}", position.id, price, e);
                        continue;
                    }
                };
            position.mark_price = price;
            position.unrealized_pnl = unrealized_pnl;
            position.updated_at = now;

            if risk.liquidation_crossed(position.side, price, position.liquidation_price) {
                warn!(
                    "Liquidation price crossed: {} {} mark={} liq={}",
                    position.side, position.symbol, price, position.liquidation_price
                );
                outcome.crossed.push(position.clone());
            }
            outcome.revalued.push(position.clone());
        }

        debug!("Revalued {} positions on {} @ {}", outcome.revalued.len(), symbol, price);
        outcome
    }

    pub fn get(&self, id: &PositionId) -> Option<&Position> {
        self.positions.get(id)
    }

    pub fn find(&self, symbol: &Symbol, side: Side) -> Option<&Position> {
        let key = PositionKey {
            account: self.account.clone(),
            symbol: symbol.clone(),
            side,
        };
        self.index.get(&key).and_then(|id| self.positions.get(id))
    }

    /// Open positions, oldest first
    pub fn all(&self) -> Vec<Position> {
        let mut positions: Vec<Position> = self.positions.values().cloned().collect();
        positions.sort_by_key(|p| (p.created_at, p.id));
        positions
    }

    pub fn positions_for(&self, symbol: &Symbol) -> Vec<Position> {
        self.all().into_iter().filter(|p| &p.symbol == symbol).collect()
    }

    pub fn total_unrealized_pnl(&self) -> Decimal {
        self.positions
            .values()
            .fold(Decimal::ZERO, |total, p| total.saturating_add(p.unrealized_pnl))
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
