//! Domain module
//!
//! Ledger records and validated value types.

pub mod amount;
pub mod models;

pub use amount::{Amount, AmountError};
pub use models::{
    Account, AddAccountBalanceParams, CreateAccountParams, CreateEntryParams,
    CreateTransferParams, Entry, ListAccountsParams, Transfer, TransferParams, TransferResult,
};
