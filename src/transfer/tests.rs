//! Transfer handler scenarios against the in-memory store

#[cfg(test)]
mod tests {
    use crate::domain::CreateAccountParams;
    use crate::error::{ErrorKind, LedgerError};
    use crate::store::{FailPoint, MemoryStore, Queries};
    use crate::transfer::{TransferHandler, TransferPolicy};

    async fn open_account(store: &MemoryStore, owner: &str, balance: i64) -> i64 {
        store
            .clone()
            .create_account(CreateAccountParams {
                owner: owner.to_string(),
                balance,
                currency: "USD".to_string(),
            })
            .await
            .unwrap()
            .id
    }

    async fn balance(store: &MemoryStore, id: i64) -> i64 {
        store.clone().get_account(id).await.unwrap().balance
    }

    async fn entry_count(store: &MemoryStore, id: i64) -> usize {
        store.clone().list_entries(id).await.unwrap().len()
    }

    // =========================================================================
    // Successful transfers
    // =========================================================================

    #[tokio::test]
    async fn test_transfer_scenario() {
        let store = MemoryStore::new();
        let a = open_account(&store, "alice", 100).await;
        let b = open_account(&store, "bob", 50).await;
        let handler = TransferHandler::new(store.clone());

        let result = handler.transfer_money(a, b, 30).await.unwrap();

        assert_eq!(result.transfer.from_account_id, a);
        assert_eq!(result.transfer.to_account_id, b);
        assert_eq!(result.transfer.amount, 30);
        assert_eq!(result.from_account.id, a);
        assert_eq!(result.from_account.balance, 70);
        assert_eq!(result.to_account.id, b);
        assert_eq!(result.to_account.balance, 80);
        assert_eq!(result.from_entry.account_id, a);
        assert_eq!(result.from_entry.amount, -30);
        assert_eq!(result.to_entry.account_id, b);
        assert_eq!(result.to_entry.amount, 30);

        assert_eq!(balance(&store, a).await, 70);
        assert_eq!(balance(&store, b).await, 80);
        assert_eq!(store.transfer_count(), 1);
        assert_eq!(store.entry_count(), 2);
    }

    #[tokio::test]
    async fn test_entries_balance_to_zero() {
        let store = MemoryStore::new();
        let a = open_account(&store, "alice", 500).await;
        let b = open_account(&store, "bob", 500).await;
        let handler = TransferHandler::new(store.clone());

        for amount in [1, 17, 250] {
            let before_a = balance(&store, a).await;
            let before_b = balance(&store, b).await;

            let result = handler.transfer_money(a, b, amount).await.unwrap();

            assert_eq!(result.from_entry.amount + result.to_entry.amount, 0);
            assert_eq!(result.from_account.balance, before_a - amount);
            assert_eq!(result.to_account.balance, before_b + amount);
        }

        let mut store_handle = store.clone();
        let sum: i64 = store_handle
            .list_entries(a)
            .await
            .unwrap()
            .iter()
            .chain(store_handle.list_entries(b).await.unwrap().iter())
            .map(|e| e.amount)
            .sum();
        assert_eq!(sum, 0);
    }

    #[tokio::test]
    async fn test_reverse_direction_maps_result_fields() {
        let store = MemoryStore::new();
        let low = open_account(&store, "alice", 100).await;
        let high = open_account(&store, "bob", 100).await;
        let handler = TransferHandler::new(store.clone());

        let result = handler.transfer_money(high, low, 40).await.unwrap();

        assert_eq!(result.from_account.id, high);
        assert_eq!(result.from_account.balance, 60);
        assert_eq!(result.to_account.id, low);
        assert_eq!(result.to_account.balance, 140);
        assert_eq!(result.from_entry.account_id, high);
        assert_eq!(result.to_entry.account_id, low);
    }

    // =========================================================================
    // Lock ordering
    // =========================================================================

    #[tokio::test]
    async fn test_balance_increments_follow_account_id_order() {
        let store = MemoryStore::new();
        let low = open_account(&store, "alice", 100).await;
        let high = open_account(&store, "bob", 100).await;
        let handler = TransferHandler::new(store.clone());

        handler.transfer_money(low, high, 10).await.unwrap();
        assert_eq!(store.balance_updates(), vec![low, high]);

        store.clear_balance_updates();
        handler.transfer_money(high, low, 10).await.unwrap();
        assert_eq!(store.balance_updates(), vec![low, high]);
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[tokio::test]
    async fn test_non_positive_amount_rejected_before_transaction() {
        let store = MemoryStore::new();
        let a = open_account(&store, "alice", 100).await;
        let b = open_account(&store, "bob", 100).await;
        // would surface as store_unavailable if a transaction were opened
        store.fail_at(FailPoint::Begin, ErrorKind::StoreUnavailable);
        let handler = TransferHandler::new(store.clone());

        for amount in [0, -5] {
            let err = handler.transfer_money(a, b, amount).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }

        assert_eq!(store.transfer_count(), 0);
        assert_eq!(balance(&store, a).await, 100);
    }

    #[tokio::test]
    async fn test_same_account_allowed_by_default() {
        let store = MemoryStore::new();
        let a = open_account(&store, "alice", 100).await;
        let handler = TransferHandler::new(store.clone());

        let result = handler.transfer_money(a, a, 30).await.unwrap();

        assert_eq!(result.from_account.balance, 100);
        assert_eq!(balance(&store, a).await, 100);
        assert_eq!(entry_count(&store, a).await, 2);
    }

    #[tokio::test]
    async fn test_same_account_rejected_by_policy() {
        let store = MemoryStore::new();
        let a = open_account(&store, "alice", 100).await;
        let handler = TransferHandler::new(store.clone()).with_policy(TransferPolicy {
            reject_same_account: true,
            require_sufficient_funds: false,
        });

        let err = handler.transfer_money(a, a, 30).await.unwrap_err();

        assert!(matches!(err, LedgerError::Validation(_)));
        assert_eq!(store.transfer_count(), 0);
    }

    #[tokio::test]
    async fn test_overdraft_allowed_by_default() {
        let store = MemoryStore::new();
        let a = open_account(&store, "alice", 10).await;
        let b = open_account(&store, "bob", 0).await;
        let handler = TransferHandler::new(store.clone());

        let result = handler.transfer_money(a, b, 25).await.unwrap();

        assert_eq!(result.from_account.balance, -15);
        assert_eq!(balance(&store, b).await, 25);
    }

    #[tokio::test]
    async fn test_insufficient_funds_rolls_back_in_either_order() {
        let store = MemoryStore::new();
        let low = open_account(&store, "alice", 10).await;
        let high = open_account(&store, "bob", 10).await;
        let handler = TransferHandler::new(store.clone()).with_policy(TransferPolicy::strict());

        for (from, to) in [(low, high), (high, low)] {
            let err = handler.transfer_money(from, to, 25).await.unwrap_err();

            match err {
                LedgerError::InsufficientFunds { account_id, balance } => {
                    assert_eq!(account_id, from);
                    assert_eq!(balance, -15);
                }
                other => panic!("Expected InsufficientFunds, got: {:?}", other),
            }
        }

        assert_eq!(balance(&store, low).await, 10);
        assert_eq!(balance(&store, high).await, 10);
        assert_eq!(store.transfer_count(), 0);
        assert_eq!(store.entry_count(), 0);

        // exact balance is fine
        let result = handler.transfer_money(low, high, 10).await.unwrap();
        assert_eq!(result.from_account.balance, 0);
    }

    // =========================================================================
    // Failures
    // =========================================================================

    #[tokio::test]
    async fn test_unknown_destination_leaves_source_untouched() {
        let store = MemoryStore::new();
        let a = open_account(&store, "alice", 100).await;
        let handler = TransferHandler::new(store.clone());

        let err = handler.transfer_money(a, a + 1000, 30).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(balance(&store, a).await, 100);
        assert_eq!(entry_count(&store, a).await, 0);
        assert_eq!(store.transfer_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_at_any_step_is_atomic() {
        let steps = [
            (FailPoint::CreateTransfer, 0),
            (FailPoint::CreateEntry, 0),
            (FailPoint::CreateEntry, 1),
            (FailPoint::AddAccountBalance, 0),
            (FailPoint::AddAccountBalance, 1),
        ];

        for (point, skip) in steps {
            let store = MemoryStore::new();
            let a = open_account(&store, "alice", 100).await;
            let b = open_account(&store, "bob", 50).await;
            store.fail_after(point, skip, ErrorKind::Conflict);
            let handler = TransferHandler::new(store.clone());

            let err = handler.transfer_money(a, b, 30).await.unwrap_err();

            assert_eq!(err.kind(), ErrorKind::Conflict, "{:?}/{}", point, skip);
            assert_eq!(balance(&store, a).await, 100, "{:?}/{}", point, skip);
            assert_eq!(balance(&store, b).await, 50, "{:?}/{}", point, skip);
            assert_eq!(store.transfer_count(), 0, "{:?}/{}", point, skip);
            assert_eq!(store.entry_count(), 0, "{:?}/{}", point, skip);
        }
    }

    #[tokio::test]
    async fn test_transient_store_error_keeps_its_kind() {
        let store = MemoryStore::new();
        let a = open_account(&store, "alice", 100).await;
        let b = open_account(&store, "bob", 50).await;
        store.fail_after(FailPoint::AddAccountBalance, 1, ErrorKind::Transient);
        let handler = TransferHandler::new(store.clone());

        let err = handler.transfer_money(a, b, 30).await.unwrap_err();

        assert!(matches!(err, LedgerError::Transient(_)));
        assert!(err.is_retryable());
        assert_eq!(balance(&store, a).await, 100);
    }

    #[tokio::test]
    async fn test_rollback_failure_reports_step_error_too() {
        let store = MemoryStore::new();
        let a = open_account(&store, "alice", 100).await;
        let b = open_account(&store, "bob", 50).await;
        store.fail_after(FailPoint::CreateEntry, 1, ErrorKind::Conflict);
        store.fail_at(FailPoint::Rollback, ErrorKind::StoreUnavailable);
        let handler = TransferHandler::new(store.clone());

        let err = handler.transfer_money(a, b, 30).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Transaction);
        match err {
            LedgerError::RollbackFailed { cause, rollback } => {
                assert_eq!(cause.kind(), ErrorKind::Conflict);
                assert_eq!(rollback.kind(), ErrorKind::StoreUnavailable);
            }
            other => panic!("Expected RollbackFailed, got: {:?}", other),
        }
        assert_eq!(store.transfer_count(), 0);
    }

    #[tokio::test]
    async fn test_commit_failure_discards_everything() {
        let store = MemoryStore::new();
        let a = open_account(&store, "alice", 100).await;
        let b = open_account(&store, "bob", 50).await;
        store.fail_at(FailPoint::Commit, ErrorKind::StoreUnavailable);
        let handler = TransferHandler::new(store.clone());

        let err = handler.transfer_money(a, b, 30).await.unwrap_err();

        assert!(matches!(err, LedgerError::CommitFailed(_)));
        assert_eq!(balance(&store, a).await, 100);
        assert_eq!(balance(&store, b).await, 50);
        assert_eq!(store.transfer_count(), 0);
    }
}
