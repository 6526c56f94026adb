//! Risk calculator - margin, fee, PnL and liquidation price.
//!
//! Pure functions over `Decimal`. Every formula keeps its multiply/divide
//! order fixed; decimal rounding depends on it.

use rust_decimal::Decimal;

use crate::core::{Error, Leverage, Result, Side};

/// Rates the calculator is parameterised with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskParams {
    pub fee_rate: Decimal,                // e.g., 0.05% = 0.0005
    pub maintenance_margin_rate: Decimal, // e.g., 0.5% = 0.005
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            fee_rate: Decimal::new(5, 4),
            maintenance_margin_rate: Decimal::new(5, 3),
        }
    }
}

impl From<&crate::core::config::RiskConfig> for RiskParams {
    fn from(config: &crate::core::config::RiskConfig) -> Self {
        Self {
            fee_rate: config.fee_rate,
            maintenance_margin_rate: config.maintenance_margin_rate,
        }
    }
}

/// Stateless risk math shared by the order and position managers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskCalculator {
    params: RiskParams,
}

impl RiskCalculator {
    pub fn new(params: RiskParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &RiskParams {
        &self.params
    }

    /// `amount × price`
    pub fn notional(&self, amount: Decimal, price: Decimal) -> Result<Decimal> {
        mul(amount, price, "notional")
    }

    /// `notional / leverage`
    pub fn margin_required(&self, notional: Decimal, leverage: Leverage) -> Result<Decimal> {
        notional
            .checked_div(leverage.as_decimal())
            .ok_or(Error::Overflow("margin"))
    }

    /// `notional × feeRate`
    pub fn trading_fee(&self, notional: Decimal) -> Result<Decimal> {
        mul(notional, self.params.fee_rate, "fee")
    }

    /// BUY: `(mark − entry) × amount × leverage`; SELL: `(entry − mark) × amount × leverage`.
    pub fn unrealized_pnl(
        &self,
        side: Side,
        entry_price: Decimal,
        mark_price: Decimal,
        amount: Decimal,
        leverage: Leverage,
    ) -> Result<Decimal> {
        let diff = match side {
            Side::Buy => mark_price.checked_sub(entry_price),
            Side::Sell => entry_price.checked_sub(mark_price),
        }
        .ok_or(Error::Overflow("pnl"))?;
        mul(mul(diff, amount, "pnl")?, leverage.as_decimal(), "pnl")
    }

    /// BUY: `entry × (1 − 1/leverage + mmr)`; SELL: `entry × (1 + 1/leverage − mmr)`.
    pub fn liquidation_price(&self, side: Side, entry_price: Decimal, leverage: Leverage) -> Result<Decimal> {
        let inverse = Decimal::ONE / leverage.as_decimal();
        let mmr = self.params.maintenance_margin_rate;
        let factor = match side {
            Side::Buy => Decimal::ONE - inverse + mmr,
            Side::Sell => Decimal::ONE + inverse - mmr,
        };
        mul(entry_price, factor, "liquidation price")
    }

    /// Whether `mark` has reached the liquidation price from the losing side.
    pub fn liquidation_crossed(&self, side: Side, mark_price: Decimal, liquidation_price: Decimal) -> bool {
        match side {
            Side::Buy => mark_price <= liquidation_price,
            Side::Sell => mark_price >= liquidation_price,
        }
    }
}

fn mul(a: Decimal, b: Decimal, what: &'static str) -> Result<Decimal> {
    a.checked_mul(b).ok_or(Error::Overflow(what))
}
