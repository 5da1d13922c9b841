//! Idempotency guard.

use common::IdentityKey;
use ledger_store::{IdempotencyScope, LedgerTx};

use crate::error::{Result, WalletError};

/// Fails with [`WalletError::DuplicateRequest`] if `key` was already used in
/// `scope`.
///
/// Must run inside the same transaction as the insert it protects. A request
/// without a key is never deduplicated.
pub async fn ensure_fresh<T: LedgerTx>(
    tx: &mut T,
    scope: IdempotencyScope,
    key: Option<IdentityKey>,
) -> Result<()> {
    let Some(key) = key else {
        return Ok(());
    };

    if tx.identity_key_exists(scope, key).await? {
        tracing::debug!(?scope, %key, "duplicate request rejected");
        return Err(WalletError::DuplicateRequest(key));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use ledger_store::{
        Account, CoinTransfer, InMemoryLedgerStore, LedgerStore, TransferDirection,
    };

    use super::*;
    use crate::ErrorKind;

    #[tokio::test]
    async fn test_missing_key_always_passes() {
        let store = InMemoryLedgerStore::new();
        let mut tx = store.begin().await.unwrap();
        ensure_fresh(&mut tx, IdempotencyScope::Transfer, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_used_key_is_rejected_in_its_scope_only() {
        let store = InMemoryLedgerStore::new();
        let alice = Account::new("alice", "hash");
        let bob = Account::new("bob", "hash");
        let key = IdentityKey::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert_account(&alice).await.unwrap();
        tx.insert_account(&bob).await.unwrap();
        tx.insert_transfer(&CoinTransfer::new(
            TransferDirection::Sending,
            alice.id,
            bob.id,
            5,
            Some(key),
        ))
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let err = ensure_fresh(&mut tx, IdempotencyScope::Transfer, Some(key))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        ensure_fresh(&mut tx, IdempotencyScope::Purchase, Some(key))
            .await
            .unwrap();
        ensure_fresh(&mut tx, IdempotencyScope::Transfer, Some(IdentityKey::new()))
            .await
            .unwrap();
    }
}
