pub mod account;
pub mod cli;
pub mod client;
pub mod config;
pub mod crypto;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod ids;
pub mod ownership;
pub mod record;
pub mod retry;
pub mod signer;
pub mod tracker;
pub mod types;

pub use account::{Account, AccountNumber, Network, Seed};
pub use client::{HttpLedger, LedgerApi, MemoryLedger};
pub use config::EngineConfig;
pub use engine::TransferEngine;
pub use error::{LedgerError, LedgerResult};
pub use ids::{AssetId, BitmarkId, Signature, TxId};
