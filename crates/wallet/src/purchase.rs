//! Shop purchase workflow.

use async_trait::async_trait;
use common::{AccountId, IdentityKey};
use ledger_store::{IdempotencyScope, LedgerTx, Operation, OperationSource, ShopPurchase};
use serde::{Deserialize, Serialize};

use crate::coordinator::UnitOfWork;
use crate::error::{Result, WalletError};
use crate::idempotency::ensure_fresh;
use crate::ledger::record_operation;

/// Buys `quantity` units of the catalog item named `item_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub account_id: AccountId,
    pub item_name: String,
    pub quantity: i64,
    pub identity_key: Option<IdentityKey>,
}

impl PurchaseRequest {
    pub fn new(account_id: AccountId, item_name: impl Into<String>, quantity: i64) -> Self {
        Self {
            account_id,
            item_name: item_name.into(),
            quantity,
            identity_key: None,
        }
    }

    pub fn with_identity_key(mut self, key: IdentityKey) -> Self {
        self.identity_key = Some(key);
        self
    }

    /// Checks the request before any transaction is opened.
    pub fn validate(&self) -> Result<()> {
        if self.quantity <= 0 {
            return Err(WalletError::InvalidQuantity(self.quantity));
        }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for PurchaseRequest {
    type Output = ShopPurchase;

    async fn execute<T: LedgerTx>(&self, tx: &mut T) -> Result<ShopPurchase> {
        ensure_fresh(tx, IdempotencyScope::Purchase, self.identity_key).await?;

        let item = tx
            .find_item_by_name(&self.item_name)
            .await?
            .ok_or_else(|| WalletError::ItemNotFound(self.item_name.clone()))?;

        let cost = item.price.checked_mul(self.quantity).ok_or_else(|| {
            WalletError::InvalidRequest(format!(
                "cost of {} x {} overflows",
                self.quantity, item.name
            ))
        })?;

        let purchase = ShopPurchase::new(item.id, self.account_id, self.quantity, self.identity_key);
        let charge = Operation::decrease(
            self.account_id,
            cost,
            OperationSource::ShopPurchase,
            Some(purchase.id.as_uuid()),
        )?;

        record_operation(tx, &charge).await?;
        tx.insert_purchase(&purchase).await?;

        Ok(purchase)
    }
}

#[cfg(test)]
mod tests {
    use ledger_store::{Account, InMemoryLedgerStore, LedgerStore, ShopItem};

    use super::*;
    use crate::ErrorKind;

    async fn setup(balance: i64) -> (InMemoryLedgerStore, Account) {
        let store = InMemoryLedgerStore::with_items([
            ShopItem::new("pen", 50),
            ShopItem::new("yacht", i64::MAX / 2),
        ])
        .await;
        let buyer = Account::new("alice", "hash");

        let mut tx = store.begin().await.unwrap();
        tx.insert_account(&buyer).await.unwrap();
        tx.append_operation(
            &Operation::increase(buyer.id, balance, OperationSource::Deposit, None).unwrap(),
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        (store, buyer)
    }

    #[test]
    fn test_rejects_non_positive_quantity() {
        let err = PurchaseRequest::new(AccountId::new(), "pen", 0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, WalletError::InvalidQuantity(0)));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_charge_links_to_purchase() {
        let (store, buyer) = setup(100).await;
        let mut tx = store.begin().await.unwrap();
        let purchase = PurchaseRequest::new(buyer.id, "pen", 2)
            .execute(&mut tx)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let charge = store
            .operations()
            .await
            .into_iter()
            .find(|op| op.source == OperationSource::ShopPurchase)
            .unwrap();
        assert_eq!(charge.amount, 100);
        assert_eq!(charge.source_id, Some(purchase.id.as_uuid()));
    }

    #[tokio::test]
    async fn test_unknown_item_is_not_found() {
        let (store, buyer) = setup(100).await;
        let mut tx = store.begin().await.unwrap();
        let err = PurchaseRequest::new(buyer.id, "spaceship", 1)
            .execute(&mut tx)
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::ItemNotFound(ref name) if name == "spaceship"));
    }

    #[tokio::test]
    async fn test_cost_overflow_is_validation() {
        let (store, buyer) = setup(100).await;
        let mut tx = store.begin().await.unwrap();
        let err = PurchaseRequest::new(buyer.id, "yacht", 3)
            .execute(&mut tx)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
