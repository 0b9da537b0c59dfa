//! Transfer Handler
//!
//! Money transfer as one unit of work: a transfer record, two balancing
//! entries, and two atomic balance increments, committed together.

use crate::domain::{
    Account, AddAccountBalanceParams, Amount, CreateEntryParams, CreateTransferParams,
    TransferParams, TransferResult,
};
use crate::error::{LedgerError, LedgerResult};
use crate::store::{Queries, Store};

use super::{TransferPolicy, TxExecutor};

/// Handler for money transfers between accounts
#[derive(Debug, Clone)]
pub struct TransferHandler<S> {
    executor: TxExecutor<S>,
    policy: TransferPolicy,
}

impl<S: Store> TransferHandler<S> {
    pub fn new(store: S) -> Self {
        Self {
            executor: TxExecutor::new(store),
            policy: TransferPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: TransferPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Transfer `amount` minor units from one account to another.
    ///
    /// Input is validated before any transaction is opened. Store failures
    /// come back with their kind intact after the transaction is rolled back;
    /// transient conflicts are not retried here.
    pub async fn transfer_money(
        &self,
        from_account_id: i64,
        to_account_id: i64,
        amount: i64,
    ) -> LedgerResult<TransferResult> {
        self.execute(TransferParams::new(from_account_id, to_account_id, amount))
            .await
    }

    /// Execute a transfer described by `params`
    pub async fn execute(&self, params: TransferParams) -> LedgerResult<TransferResult> {
        let amount = Amount::new(params.amount)?;

        if self.policy.reject_same_account && params.from_account_id == params.to_account_id {
            return Err(LedgerError::Validation(
                "Cannot transfer to the same account".to_string(),
            ));
        }

        tracing::debug!(
            "Transfer requested: {} -> {} ({})",
            params.from_account_id,
            params.to_account_id,
            amount
        );

        let policy = self.policy;
        let result = self
            .executor
            .run(move |tx| Box::pin(execute_transfer(tx, params, amount, policy)))
            .await?;

        tracing::info!(
            "Transfer {} committed: {} -> {} ({})",
            result.transfer.id,
            params.from_account_id,
            params.to_account_id,
            amount
        );

        Ok(result)
    }
}

/// The unit of work. Must run against a transaction-scoped handle.
///
/// Transfer and entries are written in argument order. The two balance
/// increments are taken in ascending account id order so that concurrent
/// transfers over the same pair, in either direction, lock rows in the same
/// sequence.
pub async fn execute_transfer<Q>(
    q: &mut Q,
    params: TransferParams,
    amount: Amount,
    policy: TransferPolicy,
) -> LedgerResult<TransferResult>
where
    Q: Queries + ?Sized,
{
    let transfer = q
        .create_transfer(CreateTransferParams {
            from_account_id: params.from_account_id,
            to_account_id: params.to_account_id,
            amount: amount.value(),
        })
        .await?;

    let from_entry = q
        .create_entry(CreateEntryParams {
            account_id: params.from_account_id,
            amount: amount.debit(),
        })
        .await?;

    let to_entry = q
        .create_entry(CreateEntryParams {
            account_id: params.to_account_id,
            amount: amount.credit(),
        })
        .await?;

    let (from_account, to_account) = if params.from_account_id < params.to_account_id {
        let (from_account, to_account) = add_money(
            q,
            params.from_account_id,
            amount.debit(),
            params.to_account_id,
            amount.credit(),
            policy,
        )
        .await?;
        (from_account, to_account)
    } else {
        let (to_account, from_account) = add_money(
            q,
            params.to_account_id,
            amount.credit(),
            params.from_account_id,
            amount.debit(),
            policy,
        )
        .await?;
        (from_account, to_account)
    };

    Ok(TransferResult {
        transfer,
        from_account,
        to_account,
        from_entry,
        to_entry,
    })
}

/// Apply two increments in the given order, returning the accounts in the
/// same order. Each snapshot is the row as returned by its own increment.
async fn add_money<Q>(
    q: &mut Q,
    account_id1: i64,
    amount1: i64,
    account_id2: i64,
    amount2: i64,
    policy: TransferPolicy,
) -> LedgerResult<(Account, Account)>
where
    Q: Queries + ?Sized,
{
    let account1 = q
        .add_account_balance(AddAccountBalanceParams {
            id: account_id1,
            amount: amount1,
        })
        .await?;
    check_funds(&account1, amount1, policy)?;

    let account2 = q
        .add_account_balance(AddAccountBalanceParams {
            id: account_id2,
            amount: amount2,
        })
        .await?;
    check_funds(&account2, amount2, policy)?;

    Ok((account1, account2))
}

fn check_funds(account: &Account, delta: i64, policy: TransferPolicy) -> LedgerResult<()> {
    if policy.require_sufficient_funds && delta < 0 && account.balance < 0 {
        return Err(LedgerError::InsufficientFunds {
            account_id: account.id,
            balance: account.balance,
        });
    }
    Ok(())
}
