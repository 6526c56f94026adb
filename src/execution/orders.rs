//! Order lifecycle manager - placement, fills, cancel and reject for one account

use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::{
    AccountId, Error, FillConfirmation, Leverage, Order, OrderId, OrderKind, OrderRequest, OrderStatus,
    Position, PricingOracle, Quote, Result, now_ms,
};
use crate::execution::positions::{PositionFill, PositionManager};
use crate::ledger::AccountLedger;
use crate::risk::RiskCalculator;

/// Order and position state after an accepted fill
#[derive(Debug, Clone)]
pub struct FillOutcome {
    pub order: Order,
    pub position: Position,
}

/// Orders of one account. Orders are never deleted.
pub struct OrderLifecycleManager {
    account: AccountId,
    orders: HashMap<OrderId, Order>,
    /// Insertion order, for newest-first history views
    sequence: Vec<OrderId>,
}

impl OrderLifecycleManager {
    pub fn new(account: AccountId) -> Self {
        Self {
            account,
            orders: HashMap::new(),
            sequence: Vec::new(),
        }
    }

    /// Price, notional, margin and fee a placement would use.
    pub fn quote(&self, request: &OrderRequest, oracle: &dyn PricingOracle, risk: &RiskCalculator) -> Result<Quote> {
        if request.amount <= Decimal::ZERO {
            return Err(Error::InvalidAmount(request.amount));
        }

        let reference_price = match request.kind {
            OrderKind::Market => oracle
                .price(&request.symbol)
                .ok_or_else(|| Error::PriceUnavailable(request.symbol.clone()))?,
            OrderKind::Limit | OrderKind::Stop => match request.price {
                Some(p) if p > Decimal::ZERO => p,
                other => return Err(Error::InvalidPrice(other.unwrap_or(Decimal::ZERO))),
            },
        };

        let leverage = Leverage::clamped(request.leverage);
        let notional = risk.notional(request.amount, reference_price)?;

        let quote = Quote {
            reference_price,
            notional,
            margin: risk.margin_required(notional, leverage)?,
            fee: risk.trading_fee(notional)?,
            liquidation_price: risk.liquidation_price(request.side, reference_price, leverage)?,
            leverage,
        };
        quote.required_funds()?;
        Ok(quote)
    }

    /// Validate, debit margin + fee, and store the order as PENDING.
    pub fn place_order(
        &mut self,
        request: &OrderRequest,
        oracle: &dyn PricingOracle,
        risk: &RiskCalculator,
        ledger: &mut AccountLedger,
    ) -> Result<Order> {
        if request.account != self.account {
            return Err(Error::account_not_found(&request.account));
        }

        let quote = self.quote(request, oracle, risk)?;
        ledger.debit(quote.required_funds()?)?;

        let now = now_ms();
        let order = Order {
            id: Uuid::new_v4(),
            account: self.account.clone(),
            symbol: request.symbol.clone(),
            kind: request.kind,
            side: request.side,
            price: quote.reference_price,
            amount: request.amount,
            filled: Decimal::ZERO,
            status: OrderStatus::Pending,
            leverage: quote.leverage,
            margin_mode: request.margin_mode,
            margin: quote.margin,
            fee: quote.fee,
            created_at: now,
            updated_at: now,
        };

        info!(
            "Placed {} {} {} {} @ {} ({}): margin={} fee={}",
            order.kind, order.side, order.amount, order.symbol, order.price, order.leverage, order.margin, order.fee
        );

        self.insert(order.clone());
        Ok(order)
    }

    /// Apply a fill confirmation and merge the filled quantity into a position.
    ///
    /// Rejected fills leave both the order and the positions untouched.
    pub fn apply_fill(
        &mut self,
        fill: &FillConfirmation,
        positions: &mut PositionManager,
        risk: &RiskCalculator,
    ) -> Result<FillOutcome> {
        let order = self
            .orders
            .get_mut(&fill.order_id)
            .ok_or_else(|| Error::order_not_found(&fill.order_id))?;

        if order.status.is_terminal() {
            return Err(Error::invalid_fill(order.id, format!("order is {}", order.status)));
        }
        if fill.filled_delta <= Decimal::ZERO {
            return Err(Error::invalid_fill(order.id, format!("non-positive delta {}", fill.filled_delta)));
        }
        if fill.fill_price <= Decimal::ZERO {
            return Err(Error::invalid_fill(order.id, format!("non-positive price {}", fill.fill_price)));
        }
        let filled = match order.filled.checked_add(fill.filled_delta) {
            Some(filled) if filled <= order.amount => filled,
            _ => {
                return Err(Error::invalid_fill(
                    order.id,
                    format!("delta {} would exceed amount {}", fill.filled_delta, order.amount),
                ));
            }
        };

        // Cumulative share of the debited margin, so the shares of all
        // fills add up to exactly `order.margin`.
        let margin = margin_through(order, filled)?
            .checked_sub(margin_through(order, order.filled)?)
            .ok_or(Error::Overflow("fill margin"))?;

        let position = positions.apply_fill(
            &PositionFill {
                symbol: order.symbol.clone(),
                side: order.side,
                quantity: fill.filled_delta,
                price: fill.fill_price,
                leverage: order.leverage,
                margin_mode: order.margin_mode,
                margin,
            },
            risk,
        )?;

        order.filled = filled;
        order.status = if filled == order.amount {
            OrderStatus::Filled
        } else {
            OrderStatus::Partially
        };
        order.updated_at = now_ms();

        info!(
            "Order {} filled {} @ {} ({}/{}) -> {}",
            order.id, fill.filled_delta, fill.fill_price, order.filled, order.amount, order.status
        );

        Ok(FillOutcome {
            order: order.clone(),
            position,
        })
    }

    /// Cancel an active order. Unknown ids and terminal orders are a no-op.
    pub fn cancel_order(&mut self, id: &OrderId) -> Option<Order> {
        let order = self.orders.get_mut(id)?;
        if order.status.is_terminal() {
            return None;
        }

        order.status = OrderStatus::Canceled;
        order.updated_at = now_ms();
        info!("Canceled order {} ({}/{} filled)", order.id, order.filled, order.amount);
        Some(order.clone())
    }

    /// PENDING -> REJECTED. Returns `None` when the order is past PENDING.
    pub fn reject_order(&mut self, id: &OrderId, reason: &str) -> Result<Option<Order>> {
        let order = self.orders.get_mut(id).ok_or_else(|| Error::order_not_found(id))?;
        if order.status != OrderStatus::Pending {
            warn!("Ignoring reject for order {} in status {}: {}", order.id, order.status, reason);
            return Ok(None);
        }

        order.status = OrderStatus::Rejected;
        order.updated_at = now_ms();
        info!("Order {} rejected: {}", order.id, reason);
        Ok(Some(order.clone()))
    }

    /// Record the companion MARKET order of a position close, already FILLED.
    pub fn record_close(&mut self, position: &Position, quantity: Decimal, price: Decimal, fee: Decimal) -> Order {
        let now = now_ms();
        let order = Order {
            id: Uuid::new_v4(),
            account: self.account.clone(),
            symbol: position.symbol.clone(),
            kind: OrderKind::Market,
            side: position.side.opposite(),
            price,
            amount: quantity,
            filled: quantity,
            status: OrderStatus::Filled,
            leverage: position.leverage,
            margin_mode: position.margin_mode,
            margin: Decimal::ZERO,
            fee,
            created_at: now,
            updated_at: now,
        };
        self.insert(order.clone());
        order
    }

    fn insert(&mut self, order: Order) {
        self.sequence.push(order.id);
        self.orders.insert(order.id, order);
    }

    pub fn get(&self, id: &OrderId) -> Option<&Order> {
        self.orders.get(id)
    }

    /// All orders, newest first
    pub fn all(&self) -> Vec<Order> {
        self.sequence.iter().rev().filter_map(|id| self.orders.get(id)).cloned().collect()
    }

    /// PENDING and PARTIALLY orders, newest first
    pub fn active_orders(&self) -> Vec<Order> {
        self.all().into_iter().filter(|o| o.status.is_active()).collect()
    }

    /// FILLED, CANCELED and REJECTED orders, newest first
    pub fn history_orders(&self) -> Vec<Order> {
        self.all().into_iter().filter(|o| o.status.is_terminal()).collect()
    }
}

/// `order.margin × filled / order.amount`, exact once fully filled
fn margin_through(order: &Order, filled: Decimal) -> Result<Decimal> {
    if filled == order.amount {
        return Ok(order.margin);
    }
    order
        .margin
        .checked_mul(filled)
        .and_then(|m| m.checked_div(order.amount))
        .ok_or(Error::Overflow("fill margin"))
}
