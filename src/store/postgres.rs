//! PostgreSQL Record Store
//!
//! Ledger primitives as single SQL statements. Each statement is written once
//! against `PgExecutor` and shared by the pool-backed store (autocommit) and
//! the transaction-scoped handle.

use async_trait::async_trait;
use sqlx::{PgExecutor, PgPool, Postgres, Transaction};

use crate::domain::{
    Account, AddAccountBalanceParams, CreateAccountParams, CreateEntryParams,
    CreateTransferParams, Entry, ListAccountsParams, Transfer,
};
use crate::error::{LedgerError, LedgerResult};

use super::{IsolationLevel, Queries, Store, TxHandle};

/// Pool-backed store
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    isolation: IsolationLevel,
}

impl PgStore {
    /// Create a store; transactions use SERIALIZABLE isolation
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            isolation: IsolationLevel::default(),
        }
    }

    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }
}

/// Transaction-scoped handle. Owns its connection until commit or rollback;
/// dropping it uncommitted rolls back when the connection is returned.
#[derive(Debug)]
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl Store for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> LedgerResult<PgTx> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(self.isolation.set_transaction_sql())
            .execute(&mut *tx)
            .await?;

        Ok(PgTx { tx })
    }
}

#[async_trait]
impl TxHandle for PgTx {
    async fn commit(self) -> LedgerResult<()> {
        self.tx.commit().await.map_err(LedgerError::from)
    }

    async fn rollback(self) -> LedgerResult<()> {
        self.tx.rollback().await.map_err(LedgerError::from)
    }
}

#[async_trait]
impl Queries for PgStore {
    async fn create_account(&mut self, params: CreateAccountParams) -> LedgerResult<Account> {
        create_account(&self.pool, &params).await
    }

    async fn get_account(&mut self, id: i64) -> LedgerResult<Account> {
        get_account(&self.pool, id).await
    }

    async fn list_accounts(&mut self, params: ListAccountsParams) -> LedgerResult<Vec<Account>> {
        list_accounts(&self.pool, &params).await
    }

    async fn create_transfer(&mut self, params: CreateTransferParams) -> LedgerResult<Transfer> {
        create_transfer(&self.pool, &params).await
    }

    async fn get_transfer(&mut self, id: i64) -> LedgerResult<Transfer> {
        get_transfer(&self.pool, id).await
    }

    async fn create_entry(&mut self, params: CreateEntryParams) -> LedgerResult<Entry> {
        create_entry(&self.pool, &params).await
    }

    async fn list_entries(&mut self, account_id: i64) -> LedgerResult<Vec<Entry>> {
        list_entries(&self.pool, account_id).await
    }

    async fn add_account_balance(
        &mut self,
        params: AddAccountBalanceParams,
    ) -> LedgerResult<Account> {
        add_account_balance(&self.pool, &params).await
    }
}

#[async_trait]
impl Queries for PgTx {
    async fn create_account(&mut self, params: CreateAccountParams) -> LedgerResult<Account> {
        create_account(&mut *self.tx, &params).await
    }

    async fn get_account(&mut self, id: i64) -> LedgerResult<Account> {
        get_account(&mut *self.tx, id).await
    }

    async fn list_accounts(&mut self, params: ListAccountsParams) -> LedgerResult<Vec<Account>> {
        list_accounts(&mut *self.tx, &params).await
    }

    async fn create_transfer(&mut self, params: CreateTransferParams) -> LedgerResult<Transfer> {
        create_transfer(&mut *self.tx, &params).await
    }

    async fn get_transfer(&mut self, id: i64) -> LedgerResult<Transfer> {
        get_transfer(&mut *self.tx, id).await
    }

    async fn create_entry(&mut self, params: CreateEntryParams) -> LedgerResult<Entry> {
        create_entry(&mut *self.tx, &params).await
    }

    async fn list_entries(&mut self, account_id: i64) -> LedgerResult<Vec<Entry>> {
        list_entries(&mut *self.tx, account_id).await
    }

    async fn add_account_balance(
        &mut self,
        params: AddAccountBalanceParams,
    ) -> LedgerResult<Account> {
        add_account_balance(&mut *self.tx, &params).await
    }
}

// =========================================================================
// Statements
// =========================================================================

async fn create_account<'e, E: PgExecutor<'e>>(
    executor: E,
    params: &CreateAccountParams,
) -> LedgerResult<Account> {
    let account = sqlx::query_as::<_, Account>(
        r#"
        INSERT INTO accounts (owner, balance, currency)
        VALUES ($1, $2, $3)
        RETURNING id, owner, balance, currency, created_at
        "#,
    )
    .bind(&params.owner)
    .bind(params.balance)
    .bind(&params.currency)
    .fetch_one(executor)
    .await?;

    Ok(account)
}

async fn get_account<'e, E: PgExecutor<'e>>(executor: E, id: i64) -> LedgerResult<Account> {
    sqlx::query_as::<_, Account>(
        r#"
        SELECT id, owner, balance, currency, created_at
        FROM accounts
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| LedgerError::NotFound(format!("account {}", id)))
}

async fn list_accounts<'e, E: PgExecutor<'e>>(
    executor: E,
    params: &ListAccountsParams,
) -> LedgerResult<Vec<Account>> {
    let accounts = sqlx::query_as::<_, Account>(
        r#"
        SELECT id, owner, balance, currency, created_at
        FROM accounts
        WHERE owner = $1
        ORDER BY id
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(&params.owner)
    .bind(params.limit)
    .bind(params.offset)
    .fetch_all(executor)
    .await?;

    Ok(accounts)
}

async fn create_transfer<'e, E: PgExecutor<'e>>(
    executor: E,
    params: &CreateTransferParams,
) -> LedgerResult<Transfer> {
    let transfer = sqlx::query_as::<_, Transfer>(
        r#"
        INSERT INTO transfers (from_account_id, to_account_id, amount)
        VALUES ($1, $2, $3)
        RETURNING id, from_account_id, to_account_id, amount, created_at
        "#,
    )
    .bind(params.from_account_id)
    .bind(params.to_account_id)
    .bind(params.amount)
    .fetch_one(executor)
    .await?;

    Ok(transfer)
}

async fn get_transfer<'e, E: PgExecutor<'e>>(executor: E, id: i64) -> LedgerResult<Transfer> {
    sqlx::query_as::<_, Transfer>(
        r#"
        SELECT id, from_account_id, to_account_id, amount, created_at
        FROM transfers
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| LedgerError::NotFound(format!("transfer {}", id)))
}

async fn create_entry<'e, E: PgExecutor<'e>>(
    executor: E,
    params: &CreateEntryParams,
) -> LedgerResult<Entry> {
    let entry = sqlx::query_as::<_, Entry>(
        r#"
        INSERT INTO entries (account_id, amount)
        VALUES ($1, $2)
        RETURNING id, account_id, amount, created_at
        "#,
    )
    .bind(params.account_id)
    .bind(params.amount)
    .fetch_one(executor)
    .await?;

    Ok(entry)
}

async fn list_entries<'e, E: PgExecutor<'e>>(
    executor: E,
    account_id: i64,
) -> LedgerResult<Vec<Entry>> {
    let entries = sqlx::query_as::<_, Entry>(
        r#"
        SELECT id, account_id, amount, created_at
        FROM entries
        WHERE account_id = $1
        ORDER BY id
        "#,
    )
    .bind(account_id)
    .fetch_all(executor)
    .await?;

    Ok(entries)
}

async fn add_account_balance<'e, E: PgExecutor<'e>>(
    executor: E,
    params: &AddAccountBalanceParams,
) -> LedgerResult<Account> {
    sqlx::query_as::<_, Account>(
        r#"
        UPDATE accounts
        SET balance = balance + $2
        WHERE id = $1
        RETURNING id, owner, balance, currency, created_at
        "#,
    )
    .bind(params.id)
    .bind(params.amount)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| LedgerError::NotFound(format!("account {}", params.id)))
}
