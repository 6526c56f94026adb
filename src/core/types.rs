//! Core types - Strong typing for orders, positions and market inputs

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type OrderId = Uuid;
pub type PositionId = Uuid;

/// Epoch milliseconds
pub type Timestamp = u64;

pub fn now_ms() -> Timestamp {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Tradeable symbol (e.g., "BTC")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol::new(s)
    }
}

/// Owning account identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        AccountId::new(s)
    }
}

/// Order direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Market,
    Limit,
    Stop,
}

impl std::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderKind::Market => write!(f, "MARKET"),
            OrderKind::Limit => write!(f, "LIMIT"),
            OrderKind::Stop => write!(f, "STOP"),
        }
    }
}

/// Order status
///
/// `Pending -> Partially -> Filled`, `Pending | Partially -> Canceled`,
/// `Pending -> Rejected`. The last three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Partially,
    Filled,
    Canceled,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected)
    }

    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "PENDING"),
            OrderStatus::Partially => write!(f, "PARTIALLY"),
            OrderStatus::Filled => write!(f, "FILLED"),
            OrderStatus::Canceled => write!(f, "CANCELED"),
            OrderStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// Margin mode. Recorded only; cross-margin pooling is not modeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarginMode {
    #[default]
    Isolated,
    Cross,
}

/// Leverage multiplier, always within `[MIN, MAX]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Leverage(u32);

impl Leverage {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 100;

    /// Out-of-range input is clamped, never rejected.
    pub fn clamped(raw: u32) -> Self {
        Self(raw.clamp(Self::MIN, Self::MAX))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn as_decimal(self) -> Decimal {
        Decimal::from(self.0)
    }
}

impl Default for Leverage {
    fn default() -> Self {
        Self(10)
    }
}

impl std::fmt::Display for Leverage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x", self.0)
    }
}

/// Order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub account: AccountId,
    pub symbol: Symbol,
    pub kind: OrderKind,
    pub side: Side,
    /// Limit/stop price, or the reference price a MARKET order was priced at
    pub price: Decimal,
    pub amount: Decimal,
    pub filled: Decimal,
    pub status: OrderStatus,
    pub leverage: Leverage,
    pub margin_mode: MarginMode,
    /// Margin drawn from the ledger at placement
    pub margin: Decimal,
    pub fee: Decimal,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Order {
    pub fn remaining(&self) -> Decimal {
        self.amount - self.filled
    }
}

/// Open position, keyed by (account, symbol, side)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub account: AccountId,
    pub symbol: Symbol,
    pub side: Side,
    pub amount: Decimal,
    /// Volume-weighted average fill price
    pub entry_price: Decimal,
    pub mark_price: Decimal,
    pub leverage: Leverage,
    pub margin_mode: MarginMode,
    pub margin: Decimal,
    pub unrealized_pnl: Decimal,
    pub liquidation_price: Decimal,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Position {
    pub fn key(&self) -> PositionKey {
        PositionKey {
            account: self.account.clone(),
            symbol: self.symbol.clone(),
            side: self.side,
        }
    }
}

/// At most one open position exists per key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PositionKey {
    pub account: AccountId,
    pub symbol: Symbol,
    pub side: Side,
}

/// Placement request from a UI/CLI caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub account: AccountId,
    pub symbol: Symbol,
    pub kind: OrderKind,
    pub side: Side,
    /// Required for LIMIT/STOP, ignored for MARKET
    #[serde(default)]
    pub price: Option<Decimal>,
    pub amount: Decimal,
    /// Raw leverage input, clamped at placement
    pub leverage: u32,
    #[serde(default)]
    pub margin_mode: MarginMode,
}

impl OrderRequest {
    pub fn market(account: impl Into<AccountId>, symbol: impl Into<Symbol>, side: Side, amount: Decimal) -> Self {
        Self {
            account: account.into(),
            symbol: symbol.into(),
            kind: OrderKind::Market,
            side,
            price: None,
            amount,
            leverage: Leverage::default().get(),
            margin_mode: MarginMode::default(),
        }
    }

    pub fn limit(
        account: impl Into<AccountId>,
        symbol: impl Into<Symbol>,
        side: Side,
        amount: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            kind: OrderKind::Limit,
            price: Some(price),
            ..Self::market(account, symbol, side, amount)
        }
    }

    pub fn stop(
        account: impl Into<AccountId>,
        symbol: impl Into<Symbol>,
        side: Side,
        amount: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            kind: OrderKind::Stop,
            ..Self::limit(account, symbol, side, amount, price)
        }
    }

    pub fn with_leverage(mut self, leverage: u32) -> Self {
        self.leverage = leverage;
        self
    }

    pub fn with_margin_mode(mut self, mode: MarginMode) -> Self {
        self.margin_mode = mode;
        self
    }
}

/// Pre-trade figures for a placement, computed without mutating anything
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quote {
    pub reference_price: Decimal,
    pub notional: Decimal,
    pub margin: Decimal,
    pub fee: Decimal,
    pub liquidation_price: Decimal,
    pub leverage: Leverage,
}

impl Quote {
    /// Margin plus fee, the amount debited at placement
    pub fn required_funds(&self) -> crate::core::Result<Decimal> {
        self.margin
            .checked_add(self.fee)
            .ok_or(crate::core::Error::Overflow("required funds"))
    }
}

/// Price feed input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    pub symbol: Symbol,
    pub price: Decimal,
    pub timestamp: Timestamp,
}

impl PriceTick {
    pub fn new(symbol: impl Into<Symbol>, price: Decimal) -> Self {
        Self { symbol: symbol.into(), price, timestamp: now_ms() }
    }
}

/// Fill confirmation from the matching collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillConfirmation {
    pub order_id: OrderId,
    pub filled_delta: Decimal,
    pub fill_price: Decimal,
}

/// Pre-trade rejection from the matching collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectNotice {
    pub order_id: OrderId,
    pub reason: String,
}

/// Events arriving from collaborators; failures are dropped, not re-raised
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Tick(PriceTick),
    Fill(FillConfirmation),
    Reject(RejectNotice),
}

/// Realized close of some or all of a position
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Realization {
    pub account: AccountId,
    pub position_id: PositionId,
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub close_price: Decimal,
    pub realized_pnl: Decimal,
    /// Share of the position margin attributed to the closed quantity
    pub released_margin: Decimal,
    pub fee: Decimal,
    /// True when the close was forced by the liquidation hook
    pub forced: bool,
}
