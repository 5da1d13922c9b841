//! Ledger engine: appends operations and enforces the non-negative balance rule.

use ledger_store::{LedgerTx, Operation, OperationDirection};

use crate::error::{Result, WalletError};

/// Appends `operation` and returns the resulting balance.
///
/// Increases are recorded unconditionally. A decrease is appended first and
/// the resulting balance is checked afterwards; a negative balance yields
/// [`WalletError::InsufficientFunds`] and relies on the enclosing transaction
/// being rolled back to undo the append. Never call this outside a unit of work.
pub async fn record_operation<T: LedgerTx>(tx: &mut T, operation: &Operation) -> Result<i64> {
    let balance = tx.append_operation(operation).await?;

    if operation.direction == OperationDirection::Decrease && balance < 0 {
        tracing::debug!(
            account_id = %operation.account_id,
            amount = operation.amount,
            balance,
            "decrease rejected"
        );
        return Err(WalletError::InsufficientFunds {
            account_id: operation.account_id,
            shortfall: -balance,
        });
    }

    metrics::counter!(
        "ledger_operations_appended_total",
        "direction" => operation.direction.as_str()
    )
    .increment(1);

    Ok(balance)
}

#[cfg(test)]
mod tests {
    use ledger_store::{Account, AccountId, InMemoryLedgerStore, LedgerStore, OperationSource};

    use super::*;
    use crate::ErrorKind;

    async fn funded(amount: i64) -> (InMemoryLedgerStore, AccountId) {
        let store = InMemoryLedgerStore::new();
        let account = Account::new("alice", "hash");
        let mut tx = store.begin().await.unwrap();
        tx.insert_account(&account).await.unwrap();
        let op = Operation::increase(account.id, amount, OperationSource::Deposit, None).unwrap();
        record_operation(&mut tx, &op).await.unwrap();
        tx.commit().await.unwrap();
        (store, account.id)
    }

    fn spend(account: AccountId, amount: i64) -> Operation {
        Operation::decrease(account, amount, OperationSource::ShopPurchase, None).unwrap()
    }

    #[tokio::test]
    async fn test_decrease_to_exactly_zero_is_allowed() {
        let (store, account) = funded(100).await;
        let mut tx = store.begin().await.unwrap();
        assert_eq!(record_operation(&mut tx, &spend(account, 100)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_overdraft_is_rejected() {
        let (store, account) = funded(50).await;
        let mut tx = store.begin().await.unwrap();

        let err = record_operation(&mut tx, &spend(account, 100))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
        assert!(matches!(err, WalletError::InsufficientFunds { shortfall: 50, .. }));
        tx.rollback().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.balance_of(account).await.unwrap(), Some(50));
        assert_eq!(tx.operations_for_account(account).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_increase_has_no_check() {
        let (store, account) = funded(1).await;
        let mut tx = store.begin().await.unwrap();
        let op = Operation::increase(account, i64::from(u32::MAX), OperationSource::Deposit, None)
            .unwrap();
        assert_eq!(
            record_operation(&mut tx, &op).await.unwrap(),
            1 + i64::from(u32::MAX)
        );
    }
}
