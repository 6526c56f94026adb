//! Market data and collaborator feeds - price book + JSON-lines ingestion

pub mod ipc;
pub mod price_book;

pub use ipc::Inbound;
pub use price_book::PriceBook;
