pub mod api;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod ledger;
pub mod queue;
pub mod server;
pub mod settlement;
pub mod signing;
