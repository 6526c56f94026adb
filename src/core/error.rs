//! Error handling - Typed, recoverable errors for every engine boundary

use rust_decimal::Decimal;
use thiserror::Error;

use crate::core::types::{AccountId, OrderId, Symbol};

pub type Result<T> = std::result::Result<T, Error>;

/// Engine error hierarchy
#[derive(Debug, Error)]
pub enum Error {
    /// Available balance cannot cover margin + fee
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },

    /// Non-positive order amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(Decimal),

    /// Close quantity not positive or larger than the open amount
    #[error("Invalid close amount: requested {requested}, open {open}")]
    InvalidCloseAmount { requested: Decimal, open: Decimal },

    /// Missing or non-positive limit/stop/tick price
    #[error("Invalid price: {0}")]
    InvalidPrice(Decimal),

    /// Fill event that would break the order invariants
    #[error("Invalid fill for order {order_id}: {reason}")]
    InvalidFill { order_id: OrderId, reason: String },

    /// Unknown order, position or account
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// MARKET order on a symbol with no reference price yet
    #[error("No reference price for {0}")]
    PriceUnavailable(Symbol),

    /// Decimal result outside the representable range
    #[error("Arithmetic overflow computing {0}")]
    Overflow(&'static str),

    #[error("Account already exists: {0}")]
    AccountExists(AccountId),

    /// Malformed inbound message
    #[error("Decode error: {0}")]
    Decode(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn order_not_found(id: &OrderId) -> Self {
        Error::NotFound { kind: "Order", id: id.to_string() }
    }

    pub fn position_not_found(id: &uuid::Uuid) -> Self {
        Error::NotFound { kind: "Position", id: id.to_string() }
    }

    pub fn account_not_found(id: &AccountId) -> Self {
        Error::NotFound { kind: "Account", id: id.to_string() }
    }

    pub(crate) fn invalid_fill(order_id: OrderId, reason: impl Into<String>) -> Self {
        Error::InvalidFill { order_id, reason: reason.into() }
    }
}
