pub mod client;
pub mod intent;
pub mod mac;
pub mod messages;
pub mod service;

pub use client::SignerClient;
pub use intent::TransactionIntent;
pub use messages::{SignAudit, SignRequest, SignResponse, MAC_HEADER, POLICY_VERSION};
pub use service::{signer_app, SignerState};
