pub mod engine;
pub mod hosted;
pub mod provider;
pub mod stub;
pub mod worker;

pub use engine::SettlementEngine;
pub use hosted::HostedRailProvider;
pub use provider::{
    FeeQuote, ProviderKind, SettlementProvider, SettlementReceipt, SettlementStatus,
};
pub use stub::StubRailProvider;
pub use worker::SettlementWorker;
