//! In-memory Record Store
//!
//! Behaves like a row-locking database for the purposes of the transfer
//! engine: writes are staged per transaction and published on commit, a
//! balance increment takes the account's row lock and keeps it until the
//! transaction ends, and a lock wait longer than the configured timeout is
//! reported as a transient deadlock. Failures can be injected at every step.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::OwnedMutexGuard;

use crate::domain::{
    Account, AddAccountBalanceParams, CreateAccountParams, CreateEntryParams,
    CreateTransferParams, Entry, ListAccountsParams, Transfer,
};
use crate::error::{ErrorKind, LedgerError, LedgerResult};

use super::{Queries, Store, TxHandle};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// Steps at which a failure can be injected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Begin,
    CreateTransfer,
    CreateEntry,
    AddAccountBalance,
    Commit,
    Rollback,
}

#[derive(Debug)]
struct Fault {
    point: FailPoint,
    skip: usize,
    kind: ErrorKind,
}

#[derive(Debug, Default)]
struct State {
    accounts: BTreeMap<i64, Account>,
    entries: Vec<Entry>,
    transfers: Vec<Transfer>,
    last_account_id: i64,
    last_entry_id: i64,
    last_transfer_id: i64,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<State>,
    row_locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
    faults: Mutex<Vec<Fault>>,
    balance_updates: Mutex<Vec<i64>>,
    lock_timeout: Duration,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Inner {
    fn row_lock(&self, account_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        lock(&self.row_locks)
            .entry(account_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Consume a matching one-shot fault, if one is due
    fn check_fault(&self, point: FailPoint) -> LedgerResult<()> {
        let mut faults = lock(&self.faults);
        let Some(index) = faults.iter().position(|f| f.point == point) else {
            return Ok(());
        };

        if faults[index].skip > 0 {
            faults[index].skip -= 1;
            return Ok(());
        }

        let fault = faults.remove(index);
        tracing::debug!("Injected {} failure at {:?}", fault.kind, point);
        Err(LedgerError::from_kind(
            fault.kind,
            format!("injected failure at {:?}", point),
        ))
    }

    fn committed_account(&self, id: i64) -> Option<Account> {
        lock(&self.state).accounts.get(&id).cloned()
    }
}

/// Shared in-memory store. Clones share the same data.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Create a store whose row-lock waits give up after `lock_timeout`
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                row_locks: Mutex::new(HashMap::new()),
                faults: Mutex::new(Vec::new()),
                balance_updates: Mutex::new(Vec::new()),
                lock_timeout,
            }),
        }
    }

    /// Fail the next call at `point` with an error of `kind`
    pub fn fail_at(&self, point: FailPoint, kind: ErrorKind) {
        self.fail_after(point, 0, kind);
    }

    /// Let `skip` calls at `point` succeed, then fail the next one
    pub fn fail_after(&self, point: FailPoint, skip: usize, kind: ErrorKind) {
        lock(&self.inner.faults).push(Fault { point, skip, kind });
    }

    /// Account ids in the order their balances were incremented
    pub fn balance_updates(&self) -> Vec<i64> {
        lock(&self.inner.balance_updates).clone()
    }

    pub fn clear_balance_updates(&self) {
        lock(&self.inner.balance_updates).clear();
    }

    /// Number of committed transfer records
    pub fn transfer_count(&self) -> usize {
        lock(&self.inner.state).transfers.len()
    }

    /// Number of committed entries
    pub fn entry_count(&self) -> usize {
        lock(&self.inner.state).entries.len()
    }

    fn open(&self) -> MemoryTx {
        MemoryTx {
            inner: self.inner.clone(),
            locks: HashMap::new(),
            accounts: BTreeMap::new(),
            entries: Vec::new(),
            transfers: Vec::new(),
        }
    }
}

/// Transaction on a [`MemoryStore`]. Dropping it discards staged writes and
/// releases its row locks.
#[derive(Debug)]
pub struct MemoryTx {
    inner: Arc<Inner>,
    locks: HashMap<i64, OwnedMutexGuard<()>>,
    accounts: BTreeMap<i64, Account>,
    entries: Vec<Entry>,
    transfers: Vec<Transfer>,
}

impl MemoryTx {
    fn account(&self, id: i64) -> Option<Account> {
        self.accounts
            .get(&id)
            .cloned()
            .or_else(|| self.inner.committed_account(id))
    }

    fn require_account(&self, id: i64, relation: &str) -> LedgerResult<()> {
        match self.account(id) {
            Some(_) => Ok(()),
            None => Err(LedgerError::NotFound(format!(
                "{} references missing account {}",
                relation, id
            ))),
        }
    }

    async fn lock_row(&mut self, account_id: i64) -> LedgerResult<()> {
        if self.locks.contains_key(&account_id) {
            return Ok(());
        }

        let row_lock = self.inner.row_lock(account_id);
        match tokio::time::timeout(self.inner.lock_timeout, row_lock.lock_owned()).await {
            Ok(guard) => {
                self.locks.insert(account_id, guard);
                Ok(())
            }
            Err(_) => {
                tracing::warn!("Lock wait on account {} timed out", account_id);
                Err(LedgerError::Transient(format!(
                    "deadlock detected waiting for account {}",
                    account_id
                )))
            }
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> LedgerResult<MemoryTx> {
        self.inner.check_fault(FailPoint::Begin)?;
        Ok(self.open())
    }
}

#[async_trait]
impl TxHandle for MemoryTx {
    async fn commit(self) -> LedgerResult<()> {
        self.inner.check_fault(FailPoint::Commit)?;

        let MemoryTx {
            inner,
            locks,
            accounts,
            entries,
            transfers,
        } = self;

        {
            let mut state = lock(&inner.state);
            state.accounts.extend(accounts);
            state.entries.extend(entries);
            state.transfers.extend(transfers);
        }

        // row locks go only after the writes are visible
        drop(locks);
        Ok(())
    }

    async fn rollback(self) -> LedgerResult<()> {
        self.inner.check_fault(FailPoint::Rollback)
    }
}

#[async_trait]
impl Queries for MemoryTx {
    async fn create_account(&mut self, params: CreateAccountParams) -> LedgerResult<Account> {
        let id = {
            let mut state = lock(&self.inner.state);
            state.last_account_id += 1;
            state.last_account_id
        };

        let account = Account {
            id,
            owner: params.owner,
            balance: params.balance,
            currency: params.currency,
            created_at: Utc::now(),
        };
        self.accounts.insert(id, account.clone());
        Ok(account)
    }

    async fn get_account(&mut self, id: i64) -> LedgerResult<Account> {
        self.account(id)
            .ok_or_else(|| LedgerError::NotFound(format!("account {}", id)))
    }

    async fn list_accounts(&mut self, params: ListAccountsParams) -> LedgerResult<Vec<Account>> {
        let mut merged: BTreeMap<i64, Account> = lock(&self.inner.state).accounts.clone();
        merged.extend(self.accounts.clone());

        Ok(merged
            .into_values()
            .filter(|a| a.owner == params.owner)
            .skip(params.offset.max(0) as usize)
            .take(params.limit.max(0) as usize)
            .collect())
    }

    async fn create_transfer(&mut self, params: CreateTransferParams) -> LedgerResult<Transfer> {
        self.inner.check_fault(FailPoint::CreateTransfer)?;

        if params.amount <= 0 {
            return Err(LedgerError::Conflict(format!(
                "transfer amount must be positive, got {}",
                params.amount
            )));
        }
        self.require_account(params.from_account_id, "transfer")?;
        self.require_account(params.to_account_id, "transfer")?;

        let id = {
            let mut state = lock(&self.inner.state);
            state.last_transfer_id += 1;
            state.last_transfer_id
        };

        let transfer = Transfer {
            id,
            from_account_id: params.from_account_id,
            to_account_id: params.to_account_id,
            amount: params.amount,
            created_at: Utc::now(),
        };
        self.transfers.push(transfer.clone());
        Ok(transfer)
    }

    async fn get_transfer(&mut self, id: i64) -> LedgerResult<Transfer> {
        if let Some(transfer) = self.transfers.iter().find(|t| t.id == id) {
            return Ok(transfer.clone());
        }

        lock(&self.inner.state)
            .transfers
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("transfer {}", id)))
    }

    async fn create_entry(&mut self, params: CreateEntryParams) -> LedgerResult<Entry> {
        self.inner.check_fault(FailPoint::CreateEntry)?;
        self.require_account(params.account_id, "entry")?;

        let id = {
            let mut state = lock(&self.inner.state);
            state.last_entry_id += 1;
            state.last_entry_id
        };

        let entry = Entry {
            id,
            account_id: params.account_id,
            amount: params.amount,
            created_at: Utc::now(),
        };
        self.entries.push(entry.clone());
        Ok(entry)
    }

    async fn list_entries(&mut self, account_id: i64) -> LedgerResult<Vec<Entry>> {
        let mut entries: Vec<Entry> = lock(&self.inner.state)
            .entries
            .iter()
            .filter(|e| e.account_id == account_id)
            .cloned()
            .collect();
        entries.extend(
            self.entries
                .iter()
                .filter(|e| e.account_id == account_id)
                .cloned(),
        );
        entries.sort_by_key(|e| e.id);
        Ok(entries)
    }

    async fn add_account_balance(
        &mut self,
        params: AddAccountBalanceParams,
    ) -> LedgerResult<Account> {
        self.inner.check_fault(FailPoint::AddAccountBalance)?;

        if self.account(params.id).is_none() {
            return Err(LedgerError::NotFound(format!("account {}", params.id)));
        }

        self.lock_row(params.id).await?;

        // re-read under the lock: the holder we waited on may have committed
        let mut account = self
            .account(params.id)
            .ok_or_else(|| LedgerError::NotFound(format!("account {}", params.id)))?;
        account.balance = account.balance.checked_add(params.amount).ok_or_else(|| {
            LedgerError::Conflict(format!("balance of account {} out of range", params.id))
        })?;

        lock(&self.inner.balance_updates).push(params.id);
        self.accounts.insert(params.id, account.clone());
        Ok(account)
    }
}

// Autocommit: every call on the plain store is its own transaction.
#[async_trait]
impl Queries for MemoryStore {
    async fn create_account(&mut self, params: CreateAccountParams) -> LedgerResult<Account> {
        let mut tx = self.open();
        let account = tx.create_account(params).await?;
        tx.commit().await?;
        Ok(account)
    }

    async fn get_account(&mut self, id: i64) -> LedgerResult<Account> {
        self.open().get_account(id).await
    }

    async fn list_accounts(&mut self, params: ListAccountsParams) -> LedgerResult<Vec<Account>> {
        self.open().list_accounts(params).await
    }

    async fn create_transfer(&mut self, params: CreateTransferParams) -> LedgerResult<Transfer> {
        let mut tx = self.open();
        let transfer = tx.create_transfer(params).await?;
        tx.commit().await?;
        Ok(transfer)
    }

    async fn get_transfer(&mut self, id: i64) -> LedgerResult<Transfer> {
        self.open().get_transfer(id).await
    }

    async fn create_entry(&mut self, params: CreateEntryParams) -> LedgerResult<Entry> {
        let mut tx = self.open();
        let entry = tx.create_entry(params).await?;
        tx.commit().await?;
        Ok(entry)
    }

    async fn list_entries(&mut self, account_id: i64) -> LedgerResult<Vec<Entry>> {
        self.open().list_entries(account_id).await
    }

    async fn add_account_balance(
        &mut self,
        params: AddAccountBalanceParams,
    ) -> LedgerResult<Account> {
        let mut tx = self.open();
        let account = tx.add_account_balance(params).await?;
        tx.commit().await?;
        Ok(account)
    }
}
