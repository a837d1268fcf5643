//! MRX Exchange Core
//!
//! Internal INR/MRX exchange priced off a two-reserve pool and persisted in
//! tab-separated record files.
//!
//! # Architecture
//!
//! - **Record Store**: One TSV file per record kind, rewritten atomically
//! - **Single Writer**: Every mutation runs on one actor task
//! - **Pool**: INR and MRX reserves, price = INR / MRX
//! - **Workflows**: Buys, withdrawals and deposits with an audit trail
//!
//! # Invariants
//!
//! - MRX conservation: pool MRX + internal holdings == initial supply
//! - Price floor: no committed write leaves the price below the floor
//! - No negative cash balance
//! - A deposit or withdrawal settles at most once

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod accounts;
pub mod actor;
pub mod admin;
pub mod audit;
pub mod config;
pub mod deposit;
pub mod error;
pub mod exchange;
pub mod meter;
pub mod metrics;
pub mod orders;
pub mod pool;
pub mod reports;
pub mod storage;
pub mod store;
pub mod types;
pub mod withdrawal;

// Re-exports
pub use accounts::NewAccount;
pub use config::Config;
pub use deposit::DepositClaim;
pub use error::{Error, ErrorKind, Result};
pub use exchange::Exchange;
pub use orders::{BuyOrder, BuyReceipt, Sentiment};
pub use storage::Storage;
pub use types::{
    Account, DepositRequest, DepositStatus, PoolState, RequestContext, Transaction, TxnKind,
    WithdrawalRequest, WithdrawalStatus,
};
pub use withdrawal::BankDetails;
