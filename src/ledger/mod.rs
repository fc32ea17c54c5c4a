pub mod models;
pub mod repository;

pub use models::{EventType, Refund, RefundStatus, SettlementEvent};
pub use repository::{LedgerRepository, NewRefund};
