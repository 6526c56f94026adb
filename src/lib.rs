//! Aleph Margin - Core Library
//! Order and position lifecycle engine for leveraged paper accounts

// Public modules
pub mod core;
pub mod engine;
pub mod events;
pub mod execution;
pub mod feeds;
pub mod ledger;
pub mod risk;
pub mod settlement;

// Re-exports
pub use crate::core::{Config, Error, Result};
pub use engine::{AccountSnapshot, TradingEngine};
pub use events::{EngineEvent, EventBus, Subscription};
pub use ledger::AccountLedger;
pub use risk::{RiskCalculator, RiskParams};
