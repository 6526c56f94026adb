//! Trading engine - owns accounts, prices, events and settlement hooks.
//!
//! Every mutation of an account's ledger, orders and positions runs under
//! that account's exclusive lock, so a fill and a price tick on the same
//! account never interleave.

use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::{
    AccountId, Config, Error, FillConfirmation, InboundEvent, LiquidationAction, LiquidationHandler, Order,
    OrderId, OrderRequest, PnlRealizer, Position, PositionId, PriceTick, PricingOracle, Quote, Realization,
    RejectNotice, Result,
};
use crate::events::{EngineEvent, EventBus, Subscription};
use crate::execution::{FillOutcome, OrderLifecycleManager, PositionManager};
use crate::feeds::PriceBook;
use crate::ledger::AccountLedger;
use crate::risk::{RiskCalculator, RiskParams};
use crate::settlement::{CreditLedger, DeferToBackend, DetectOnly, ForceClose};

/// Everything owned by one account, guarded as a unit
pub struct Account {
    pub ledger: AccountLedger,
    pub orders: OrderLifecycleManager,
    pub positions: PositionManager,
}

impl Account {
    pub fn new(id: AccountId, asset: impl Into<String>, balance: Decimal) -> Self {
        Self {
            ledger: AccountLedger::new(id.clone(), asset, balance),
            orders: OrderLifecycleManager::new(id.clone()),
            positions: PositionManager::new(id),
        }
    }

    pub fn snapshot(&self) -> AccountSnapshot {
        AccountSnapshot {
            account: self.ledger.account().clone(),
            asset: self.ledger.asset().to_string(),
            available: self.ledger.available(),
            active_orders: self.orders.active_orders(),
            history_orders: self.orders.history_orders(),
            positions: self.positions.all(),
            total_unrealized_pnl: self.positions.total_unrealized_pnl(),
        }
    }
}

/// Serializable view of an account for UI callers
#[derive(Debug, Clone, Serialize)]
pub struct AccountSnapshot {
    pub account: AccountId,
    pub asset: String,
    pub available: Decimal,
    pub active_orders: Vec<Order>,
    pub history_orders: Vec<Order>,
    pub positions: Vec<Position>,
    pub total_unrealized_pnl: Decimal,
}

pub struct TradingEngine {
    risk: RiskCalculator,
    prices: Arc<PriceBook>,
    accounts: RwLock<HashMap<AccountId, Arc<Mutex<Account>>>>,
    /// Which account an order belongs to, for fills that carry only an order id
    order_index: RwLock<HashMap<OrderId, AccountId>>,
    events: EventBus<EngineEvent>,
    liquidation: Box<dyn LiquidationHandler>,
    realizer: Box<dyn PnlRealizer>,
}

impl TradingEngine {
    pub fn new(risk: RiskCalculator) -> Self {
        Self {
            risk,
            prices: Arc::new(PriceBook::new()),
            accounts: RwLock::new(HashMap::new()),
            order_index: RwLock::new(HashMap::new()),
            events: EventBus::new(),
            liquidation: Box::new(DetectOnly),
            realizer: Box::new(DeferToBackend),
        }
    }

    /// Rates and settlement hooks from config
    pub fn from_config(config: &Config) -> Self {
        let mut engine = Self::new(RiskCalculator::new(RiskParams::from(&config.risk)));
        if config.risk.force_liquidation {
            engine = engine.with_liquidation_handler(ForceClose);
        }
        if config.risk.realize_pnl_on_close {
            engine = engine.with_realizer(CreditLedger);
        }
        engine
    }

    pub fn with_liquidation_handler(mut self, handler: impl LiquidationHandler + 'static) -> Self {
        self.liquidation = Box::new(handler);
        self
    }

    pub fn with_realizer(mut self, realizer: impl PnlRealizer + 'static) -> Self {
        self.realizer = Box::new(realizer);
        self
    }

    pub fn risk(&self) -> &RiskCalculator {
        &self.risk
    }

    pub fn prices(&self) -> &PriceBook {
        &self.prices
    }

    pub fn subscribe(&self) -> Subscription<EngineEvent> {
        self.events.subscribe()
    }

    pub fn open_account(&self, id: AccountId, asset: impl Into<String>, balance: Decimal) -> Result<()> {
        let mut accounts = self.accounts.write();
        if accounts.contains_key(&id) {
            return Err(Error::AccountExists(id));
        }
        let asset = asset.into();
        info!("Opened account {} with {} {}", id, balance, asset);
        accounts.insert(id.clone(), Arc::new(Mutex::new(Account::new(id, asset, balance))));
        Ok(())
    }

    fn account(&self, id: &AccountId) -> Result<Arc<Mutex<Account>>> {
        self.accounts.read().get(id).cloned().ok_or_else(|| Error::account_not_found(id))
    }

    /// Accounts sorted by id, so ticks visit them in a stable order
    fn accounts_sorted(&self) -> Vec<Arc<Mutex<Account>>> {
        let accounts = self.accounts.read();
        let mut ids: Vec<&AccountId> = accounts.keys().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids.into_iter().filter_map(|id| accounts.get(id).cloned()).collect()
    }

    /// Read-only access to an account under its lock
    pub fn with_account<R>(&self, id: &AccountId, f: impl FnOnce(&Account) -> R) -> Result<R> {
        let account = self.account(id)?;
        let guard = account.lock();
        Ok(f(&guard))
    }

    pub fn snapshot(&self, id: &AccountId) -> Option<AccountSnapshot> {
        self.with_account(id, Account::snapshot).ok()
    }

    pub fn quote(&self, request: &OrderRequest) -> Result<Quote> {
        self.with_account(&request.account, |acc| acc.orders.quote(request, self.prices.as_ref(), &self.risk))?
    }

    pub fn place_order(&self, request: &OrderRequest) -> Result<Order> {
        let account = self.account(&request.account)?;
        let mut guard = account.lock();
        let acc = &mut *guard;

        let order = acc.orders.place_order(request, self.prices.as_ref(), &self.risk, &mut acc.ledger)?;
        self.order_index.write().insert(order.id, order.account.clone());
        self.events.publish(EngineEvent::OrderPlaced(order.clone()));
        Ok(order)
    }

    fn account_for_order(&self, order_id: &OrderId) -> Result<Arc<Mutex<Account>>> {
        let account_id = self
            .order_index
            .read()
            .get(order_id)
            .cloned()
            .ok_or_else(|| Error::order_not_found(order_id))?;
        self.account(&account_id)
    }

    pub fn apply_fill(&self, fill: &FillConfirmation) -> Result<FillOutcome> {
        let account = self.account_for_order(&fill.order_id)?;
        let mut guard = account.lock();
        let acc = &mut *guard;

        let outcome = acc.orders.apply_fill(fill, &mut acc.positions, &self.risk)?;
        self.events.publish(EngineEvent::OrderFilled {
            order: outcome.order.clone(),
            delta: fill.filled_delta,
            price: fill.fill_price,
        });
        self.events.publish(EngineEvent::PositionChanged(outcome.position.clone()));
        Ok(outcome)
    }

    pub fn reject_order(&self, notice: &RejectNotice) -> Result<Option<Order>> {
        let account = self.account_for_order(&notice.order_id)?;
        let mut guard = account.lock();

        let rejected = guard.orders.reject_order(&notice.order_id, &notice.reason)?;
        if let Some(order) = &rejected {
            self.events.publish(EngineEvent::OrderRejected {
                order: order.clone(),
                reason: notice.reason.clone(),
            });
        }
        Ok(rejected)
    }

    /// Cancel an active order; unknown ids and terminal orders are a no-op.
    pub fn cancel_order(&self, account: &AccountId, order_id: &OrderId) -> Option<Order> {
        let account = self.account(account).ok()?;
        let mut guard = account.lock();

        let canceled = guard.orders.cancel_order(order_id)?;
        self.events.publish(EngineEvent::OrderCanceled(canceled.clone()));
        Some(canceled)
    }

    /// Close `amount` (default: all) of a position at the current reference price.
    pub fn close_position(&self, account: &AccountId, position_id: &PositionId, amount: Option<Decimal>) -> Result<Order> {
        let account = self.account(account)?;
        let mut guard = account.lock();
        self.close_locked(&mut guard, position_id, amount, None, false)
    }

    fn close_locked(
        &self,
        acc: &mut Account,
        position_id: &PositionId,
        amount: Option<Decimal>,
        price: Option<Decimal>,
        forced: bool,
    ) -> Result<Order> {
        let position = acc.positions.get(position_id).ok_or_else(|| Error::position_not_found(position_id))?;
        let close_price = price
            .or_else(|| self.prices.price(&position.symbol))
            .unwrap_or(position.mark_price);

        let closed = acc.positions.close_position(position_id, amount, close_price, &self.risk)?;
        let fee = closed.fee;
        let order = acc.orders.record_close(&closed.before, closed.quantity, close_price, fee);
        self.order_index.write().insert(order.id, order.account.clone());

        let realization = Realization {
            account: closed.before.account.clone(),
            position_id: closed.before.id,
            symbol: closed.before.symbol.clone(),
            side: closed.before.side,
            quantity: closed.quantity,
            entry_price: closed.before.entry_price,
            close_price,
            realized_pnl: closed.realized_pnl,
            released_margin: closed.released_margin,
            fee,
            forced,
        };
        self.realizer.realize(&mut acc.ledger, &realization);

        self.events.publish(EngineEvent::OrderFilled {
            order: order.clone(),
            delta: closed.quantity,
            price: close_price,
        });
        if let Some(remaining) = closed.remaining {
            self.events.publish(EngineEvent::PositionChanged(remaining));
        }
        self.events.publish(EngineEvent::PositionClosed(realization));
        Ok(order)
    }

    /// Apply a price tick to the book and revalue every account's positions.
    /// Returns the number of positions revalued.
    pub fn on_price_tick(&self, tick: &PriceTick) -> usize {
        if !self.prices.apply(tick) {
            return 0;
        }
        self.events.publish(EngineEvent::PriceApplied {
            symbol: tick.symbol.clone(),
            price: tick.price,
        });

        let mut revalued = 0;
        for account in self.accounts_sorted() {
            let mut guard = account.lock();
            let acc = &mut *guard;

            let outcome = acc.positions.on_price_tick(&tick.symbol, tick.price, &self.risk);
            revalued += outcome.revalued.len();
            for position in outcome.revalued {
                self.events.publish(EngineEvent::PositionChanged(position));
            }

            for position in outcome.crossed {
                self.events.publish(EngineEvent::LiquidationCrossed(position.clone()));
                if self.liquidation.on_crossing(&position) != LiquidationAction::ForceClose {
                    continue;
                }
                match self.close_locked(acc, &position.id, None, Some(tick.price), true) {
                    Ok(order) => warn!("Force-closed position {} via order {}", position.id, order.id),
                    Err(e) => warn!("Forced close of {} failed: {}", position.id, e),
                }
            }
        }
        revalued
    }

    /// Dispatch a collaborator event. Failures are logged and dropped.
    pub fn handle(&self, event: InboundEvent) {
        match event {
            InboundEvent::Tick(tick) => {
                self.on_price_tick(&tick);
            }
            InboundEvent::Fill(fill) => {
                if let Err(e) = self.apply_fill(&fill) {
                    warn!("Dropping fill for order {}: {}", fill.order_id, e);
                }
            }
            InboundEvent::Reject(notice) => {
                if let Err(e) = self.reject_order(&notice) {
                    warn!("Dropping reject for order {}: {}", notice.order_id, e);
                }
            }
        }
    }

    /// Active orders across all accounts, for a matcher sweep
    pub fn open_orders(&self) -> Vec<Order> {
        self.accounts_sorted()
            .into_iter()
            .flat_map(|account| account.lock().orders.active_orders())
            .collect()
    }
}
