//! transfer_ledger Library
//!
//! Atomic money transfers over a double-entry ledger. See [`transfer`] for
//! the engine and [`store`] for the record stores it runs on.

pub mod config;
pub mod db;
pub mod domain;
pub mod store;
pub mod transfer;

mod error;

pub use config::{Config, ConfigError};
pub use domain::{Account, Amount, AmountError, Entry, Transfer, TransferParams, TransferResult};
pub use error::{ErrorKind, LedgerError, LedgerResult};
pub use store::{IsolationLevel, MemoryStore, PgStore, Queries, Store, TxHandle};
pub use transfer::{retry_transient, RetryPolicy, TransferHandler, TransferPolicy, TxExecutor};
