use async_trait::async_trait;

use crate::{
    Account, AccountId, CoinHistoryEntry, CoinTransfer, IdempotencyScope, IdentityKey,
    InventoryEntry, ItemId, Operation, Result, ShopItem, ShopPurchase, TransferDirection,
};

/// Entry point of a ledger store.
///
/// A store only hands out transactions; every read and write happens through
/// the [`LedgerTx`] handle so that it is covered by the transaction's
/// isolation. Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Transaction handle type.
    type Tx: LedgerTx;

    /// Opens a transaction at serializable isolation.
    async fn begin(&self) -> Result<Self::Tx>;
}

/// A unit of work against the ledger.
///
/// Nothing written through the handle is visible to other transactions until
/// [`commit`](LedgerTx::commit) succeeds. Dropping the handle without
/// committing discards every write, same as [`rollback`](LedgerTx::rollback).
///
/// Any method may fail with `StoreError::SerializationConflict`, including
/// `commit`. The caller is expected to abandon the handle and re-run the whole
/// unit of work.
#[async_trait]
pub trait LedgerTx: Send {
    /// Appends an operation and updates the owner's balance projection in the
    /// same transaction.
    ///
    /// Returns the balance after the append.
    async fn append_operation(&mut self, operation: &Operation) -> Result<i64>;

    /// Reads the balance projection.
    ///
    /// Returns None if the account has no projection row yet.
    async fn balance_of(&mut self, account_id: AccountId) -> Result<Option<i64>>;

    /// Computes the balance by summing the account's full operation log.
    async fn replay_balance(&mut self, account_id: AccountId) -> Result<i64>;

    /// Returns the account's operations, oldest first.
    async fn operations_for_account(&mut self, account_id: AccountId) -> Result<Vec<Operation>>;

    /// Replaces the balance projection with an explicit value.
    ///
    /// Only reconciliation uses this; regular writes go through
    /// [`append_operation`](LedgerTx::append_operation).
    async fn overwrite_balance(&mut self, account_id: AccountId, balance: i64) -> Result<()>;

    /// Returns every account that has operations or a projection row.
    async fn ledger_accounts(&mut self) -> Result<Vec<AccountId>>;

    /// Checks whether a record with the given identity key exists in `scope`.
    async fn identity_key_exists(
        &mut self,
        scope: IdempotencyScope,
        key: IdentityKey,
    ) -> Result<bool>;

    /// Persists one side of a transfer.
    async fn insert_transfer(&mut self, transfer: &CoinTransfer) -> Result<()>;

    /// Persists a purchase.
    async fn insert_purchase(&mut self, purchase: &ShopPurchase) -> Result<()>;

    /// Looks up an account by its unique username.
    async fn find_account_by_username(&mut self, username: &str) -> Result<Option<Account>>;

    /// Looks up several accounts by id. Unknown ids are skipped.
    async fn find_accounts_by_ids(&mut self, ids: &[AccountId]) -> Result<Vec<Account>>;

    /// Persists a new account.
    async fn insert_account(&mut self, account: &Account) -> Result<()>;

    /// Looks up a catalog item by its unique name.
    async fn find_item_by_name(&mut self, name: &str) -> Result<Option<ShopItem>>;

    /// Looks up several catalog items by id. Unknown ids are skipped.
    async fn find_items_by_ids(&mut self, ids: &[ItemId]) -> Result<Vec<ShopItem>>;

    /// Sums purchased quantity per item for an account.
    async fn inventory(&mut self, account_id: AccountId) -> Result<Vec<InventoryEntry>>;

    /// Sums transferred amount per counterparty for the rows an account owns
    /// in the given direction.
    async fn coin_history(
        &mut self,
        account_id: AccountId,
        direction: TransferDirection,
    ) -> Result<Vec<CoinHistoryEntry>>;

    /// Commits the transaction.
    async fn commit(self) -> Result<()>;

    /// Rolls the transaction back.
    async fn rollback(self) -> Result<()>;
}
