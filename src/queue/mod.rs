pub mod models;
pub mod repository;

pub use models::{JobState, SettlementJob};
pub use repository::JobQueue;
