//! Core module - Common types, traits, config and error handling

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use traits::*;
pub use types::*;
