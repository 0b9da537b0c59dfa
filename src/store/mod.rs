//! Record Store module
//!
//! Traits for the transactional record store the transfer engine runs on,
//! with a PostgreSQL implementation and an in-memory one.
//!
//! The same [`Queries`] surface is offered by the plain store (each call
//! autocommits) and by an open transaction ([`TxHandle`]), so code that only
//! needs the ledger primitives can be written once against `Queries`.

mod isolation;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::domain::{
    Account, AddAccountBalanceParams, CreateAccountParams, CreateEntryParams,
    CreateTransferParams, Entry, ListAccountsParams, Transfer,
};
use crate::error::LedgerResult;

pub use isolation::IsolationLevel;
pub use memory::{FailPoint, MemoryStore, MemoryTx};
pub use postgres::{PgStore, PgTx};

/// Row-level operations on accounts, entries and transfers
#[async_trait]
pub trait Queries: Send {
    async fn create_account(&mut self, params: CreateAccountParams) -> LedgerResult<Account>;

    /// Fails with `NotFound` when the account does not exist
    async fn get_account(&mut self, id: i64) -> LedgerResult<Account>;

    async fn list_accounts(&mut self, params: ListAccountsParams) -> LedgerResult<Vec<Account>>;

    async fn create_transfer(&mut self, params: CreateTransferParams) -> LedgerResult<Transfer>;

    async fn get_transfer(&mut self, id: i64) -> LedgerResult<Transfer>;

    async fn create_entry(&mut self, params: CreateEntryParams) -> LedgerResult<Entry>;

    async fn list_entries(&mut self, account_id: i64) -> LedgerResult<Vec<Entry>>;

    /// Atomic `balance = balance + amount` evaluated by the store.
    /// Returns the account as updated by this statement.
    async fn add_account_balance(
        &mut self,
        params: AddAccountBalanceParams,
    ) -> LedgerResult<Account>;
}

/// An open transaction. Dropping it without commit discards its writes.
#[async_trait]
pub trait TxHandle: Queries + Sized {
    async fn commit(self) -> LedgerResult<()>;

    async fn rollback(self) -> LedgerResult<()>;
}

/// A store that can open transactions
#[async_trait]
pub trait Store: Queries + Clone + Sync + 'static {
    type Tx: TxHandle + 'static;

    async fn begin(&self) -> LedgerResult<Self::Tx>;
}
