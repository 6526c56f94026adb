//! Account ledger - available quote balance that margin and fees draw on

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{AccountId, Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountLedger {
    account: AccountId,
    asset: String,
    available: Decimal,
}

impl AccountLedger {
    pub fn new(account: AccountId, asset: impl Into<String>, available: Decimal) -> Self {
        Self {
            account,
            asset: asset.into(),
            available,
        }
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn available(&self) -> Decimal {
        self.available
    }

    pub fn can_afford(&self, amount: Decimal) -> bool {
        self.available >= amount
    }

    /// Debit `amount`, leaving the balance untouched if it cannot be covered.
    pub fn debit(&mut self, amount: Decimal) -> Result<Decimal> {
        if !self.can_afford(amount) {
            return Err(Error::InsufficientFunds {
                required: amount,
                available: self.available,
            });
        }
        self.available -= amount;
        Ok(self.available)
    }

    pub fn credit(&mut self, amount: Decimal) -> Result<Decimal> {
        self.settle(amount)
    }

    /// Apply a signed settlement (realized PnL). May take the balance negative.
    /// An unrepresentable result leaves the balance untouched.
    pub fn settle(&mut self, delta: Decimal) -> Result<Decimal> {
        self.available = self
            .available
            .checked_add(delta)
            .ok_or(Error::Overflow("ledger balance"))?;
        if self.available < Decimal::ZERO {
            tracing::warn!(account = %self.account, balance = %self.available, "Ledger balance negative after settlement");
        }
        Ok(self.available)
    }
}
