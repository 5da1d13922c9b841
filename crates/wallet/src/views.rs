//! Read-only aggregated views over purchases and transfers.

use std::collections::HashMap;

use async_trait::async_trait;
use common::{AccountId, ItemId};
use ledger_store::{LedgerTx, StoreError, TransferDirection};
use serde::{Deserialize, Serialize};

use crate::coordinator::UnitOfWork;
use crate::error::Result;

/// Quantity of one item owned by an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub item_id: ItemId,
    pub item_name: String,
    pub quantity: i64,
}

/// Coins moved between an account and one counterparty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinHistoryItem {
    pub counterparty_account_id: AccountId,
    pub counterparty_username: String,
    pub total_amount: i64,
}

pub(crate) struct InventoryQuery(pub AccountId);

#[async_trait]
impl UnitOfWork for InventoryQuery {
    type Output = Vec<InventoryItem>;

    async fn execute<T: LedgerTx>(&self, tx: &mut T) -> Result<Vec<InventoryItem>> {
        let entries = tx.inventory(self.0).await?;
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<ItemId> = entries.iter().map(|e| e.item_id).collect();
        let names: HashMap<ItemId, String> = tx
            .find_items_by_ids(&ids)
            .await?
            .into_iter()
            .map(|item| (item.id, item.name))
            .collect();

        entries
            .into_iter()
            .map(|entry| -> Result<_> {
                let item_name = names.get(&entry.item_id).cloned().ok_or_else(|| {
                    StoreError::InvalidRecord(format!(
                        "purchase references unknown item {}",
                        entry.item_id
                    ))
                })?;
                Ok(InventoryItem {
                    item_id: entry.item_id,
                    item_name,
                    quantity: entry.quantity,
                })
            })
            .collect()
    }
}

pub(crate) struct CoinHistoryQuery {
    pub account_id: AccountId,
    pub direction: TransferDirection,
}

#[async_trait]
impl UnitOfWork for CoinHistoryQuery {
    type Output = Vec<CoinHistoryItem>;

    async fn execute<T: LedgerTx>(&self, tx: &mut T) -> Result<Vec<CoinHistoryItem>> {
        let entries = tx.coin_history(self.account_id, self.direction).await?;
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<AccountId> = entries.iter().map(|e| e.counterparty_account_id).collect();
        let usernames: HashMap<AccountId, String> = tx
            .find_accounts_by_ids(&ids)
            .await?
            .into_iter()
            .map(|account| (account.id, account.username))
            .collect();

        entries
            .into_iter()
            .map(|entry| -> Result<_> {
                let counterparty_username = usernames
                    .get(&entry.counterparty_account_id)
                    .cloned()
                    .ok_or_else(|| {
                        StoreError::InvalidRecord(format!(
                            "transfer references unknown account {}",
                            entry.counterparty_account_id
                        ))
                    })?;
                Ok(CoinHistoryItem {
                    counterparty_account_id: entry.counterparty_account_id,
                    counterparty_username,
                    total_amount: entry.total_amount,
                })
            })
            .collect()
    }
}
