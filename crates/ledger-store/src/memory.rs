use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    Account, AccountId, CoinHistoryEntry, CoinTransfer, IdempotencyScope, IdentityKey,
    InventoryEntry, ItemId, Operation, Result, ShopItem, ShopPurchase, StoreError,
    TransferDirection,
    store::{LedgerStore, LedgerTx},
};

/// Data a transaction can observe and that a concurrent commit can invalidate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConflictKey {
    Balance(AccountId),
    Identity(IdempotencyScope, IdentityKey),
    Username(String),
}

/// A buffered write, replayed onto the shared state at commit.
#[derive(Debug, Clone)]
enum Write {
    Operation(Operation),
    Balance(AccountId, i64),
    Transfer(CoinTransfer),
    Purchase(ShopPurchase),
    Account(Account),
}

/// Adds `value` to `total`, failing like PostgreSQL's bigint arithmetic on overflow.
fn add_checked(total: &mut i64, value: i64, what: &str) -> Result<()> {
    *total = total
        .checked_add(value)
        .ok_or_else(|| StoreError::NumericOverflow(format!("{what} out of range")))?;
    Ok(())
}

fn require_positive(value: i64, constraint: &str) -> Result<()> {
    if value > 0 {
        Ok(())
    } else {
        Err(StoreError::IntegrityViolation {
            constraint: constraint.to_string(),
        })
    }
}

#[derive(Debug, Clone, Default)]
struct LedgerState {
    accounts: Vec<Account>,
    operations: Vec<Operation>,
    balances: HashMap<AccountId, i64>,
    transfers: Vec<CoinTransfer>,
    purchases: Vec<ShopPurchase>,
    items: Vec<ShopItem>,
}

impl LedgerState {
    fn has_account(&self, id: AccountId) -> bool {
        self.accounts.iter().any(|a| a.id == id)
    }

    fn require_account(&self, id: AccountId, constraint: &str) -> Result<()> {
        if self.has_account(id) {
            Ok(())
        } else {
            Err(StoreError::IntegrityViolation {
                constraint: constraint.to_string(),
            })
        }
    }

    /// Applies a write, enforcing the same constraints as the SQL schema.
    ///
    /// Nothing is modified when a write is rejected.
    fn apply(&mut self, write: &Write) -> Result<()> {
        match write {
            Write::Operation(op) => {
                require_positive(op.amount, "operation_amount_check")?;
                self.require_account(op.account_id, "operation_account_id_fkey")?;
                let mut balance = self.balances.get(&op.account_id).copied().unwrap_or(0);
                add_checked(&mut balance, op.signed_amount(), "balance")?;
                self.balances.insert(op.account_id, balance);
                self.operations.push(op.clone());
            }
            Write::Balance(account_id, balance) => {
                self.balances.insert(*account_id, *balance);
            }
            Write::Transfer(transfer) => {
                require_positive(transfer.amount, "coin_transfer_amount_check")?;
                self.require_account(
                    transfer.owner_account_id,
                    "coin_transfer_owner_account_id_fkey",
                )?;
                self.require_account(
                    transfer.counterparty_account_id,
                    "coin_transfer_counterparty_account_id_fkey",
                )?;
                if let Some(key) = transfer.identity_key
                    && self
                        .transfers
                        .iter()
                        .any(|t| t.identity_key == Some(key) && t.direction == transfer.direction)
                {
                    return Err(StoreError::UniqueViolation {
                        constraint: "coin_transfer_identity_key_idx".to_string(),
                    });
                }
                self.transfers.push(transfer.clone());
            }
            Write::Purchase(purchase) => {
                require_positive(purchase.quantity, "shop_purchase_quantity_check")?;
                self.require_account(purchase.account_id, "shop_purchase_account_id_fkey")?;
                if !self.items.iter().any(|i| i.id == purchase.item_id) {
                    return Err(StoreError::IntegrityViolation {
                        constraint: "shop_purchase_item_id_fkey".to_string(),
                    });
                }
                if let Some(key) = purchase.identity_key
                    && self.purchases.iter().any(|p| p.identity_key == Some(key))
                {
                    return Err(StoreError::UniqueViolation {
                        constraint: "shop_purchase_identity_key_idx".to_string(),
                    });
                }
                self.purchases.push(purchase.clone());
            }
            Write::Account(account) => {
                if self.accounts.iter().any(|a| a.username == account.username) {
                    return Err(StoreError::UniqueViolation {
                        constraint: "account_username_key".to_string(),
                    });
                }
                self.accounts.push(account.clone());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: LedgerState,
    commit_seq: u64,
    /// Commit sequence that last wrote each key.
    versions: HashMap<ConflictKey, u64>,
    /// Number of upcoming writing commits to fail with a serialization conflict.
    injected_conflicts: usize,
}

/// In-memory ledger store for testing.
///
/// Provides the same interface and isolation guarantees as the PostgreSQL
/// implementation. Each transaction works on a snapshot taken at `begin` and
/// records which balances, identity keys and usernames it read or wrote. At
/// commit, if any of those keys was written by a transaction that committed
/// after the snapshot was taken, the commit fails with
/// `StoreError::SerializationConflict`.
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    shared: Arc<Mutex<Shared>>,
}

impl InMemoryLedgerStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store whose catalog holds the given items.
    pub async fn with_items(items: impl IntoIterator<Item = ShopItem>) -> Self {
        let store = Self::new();
        for item in items {
            store.insert_item(item).await;
        }
        store
    }

    /// Adds an item to the catalog outside of any transaction.
    pub async fn insert_item(&self, item: ShopItem) {
        self.shared.lock().await.state.items.push(item);
    }

    /// Makes the next `count` writing commits fail with a serialization conflict.
    pub async fn inject_conflicts(&self, count: usize) {
        self.shared.lock().await.injected_conflicts = count;
    }

    /// Overwrites a balance projection outside of any transaction, leaving the
    /// log untouched.
    pub async fn tamper_balance(&self, account_id: AccountId, balance: i64) {
        self.shared
            .lock()
            .await
            .state
            .balances
            .insert(account_id, balance);
    }

    /// Returns the number of successful commits that wrote something.
    pub async fn commit_count(&self) -> u64 {
        self.shared.lock().await.commit_seq
    }

    /// Returns all committed operations.
    pub async fn operations(&self) -> Vec<Operation> {
        self.shared.lock().await.state.operations.clone()
    }

    /// Returns all committed transfer rows.
    pub async fn transfers(&self) -> Vec<CoinTransfer> {
        self.shared.lock().await.state.transfers.clone()
    }

    /// Returns all committed purchases.
    pub async fn purchases(&self) -> Vec<ShopPurchase> {
        self.shared.lock().await.state.purchases.clone()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    type Tx = InMemoryLedgerTx;

    async fn begin(&self) -> Result<InMemoryLedgerTx> {
        let shared = self.shared.lock().await;
        Ok(InMemoryLedgerTx {
            shared: self.shared.clone(),
            working: shared.state.clone(),
            start_seq: shared.commit_seq,
            reads: HashSet::new(),
            written: HashSet::new(),
            writes: Vec::new(),
        })
    }
}

/// Transaction handle of [`InMemoryLedgerStore`].
pub struct InMemoryLedgerTx {
    shared: Arc<Mutex<Shared>>,
    /// Snapshot taken at begin with this transaction's own writes applied.
    working: LedgerState,
    start_seq: u64,
    reads: HashSet<ConflictKey>,
    written: HashSet<ConflictKey>,
    writes: Vec<Write>,
}

impl InMemoryLedgerTx {
    fn write(&mut self, write: Write, key: Option<ConflictKey>) -> Result<()> {
        self.working.apply(&write)?;
        if let Some(key) = key {
            self.written.insert(key);
        }
        self.writes.push(write);
        Ok(())
    }
}

#[async_trait]
impl LedgerTx for InMemoryLedgerTx {
    async fn append_operation(&mut self, operation: &Operation) -> Result<i64> {
        let key = ConflictKey::Balance(operation.account_id);
        self.reads.insert(key.clone());
        self.write(Write::Operation(operation.clone()), Some(key))?;

        Ok(self
            .working
            .balances
            .get(&operation.account_id)
            .copied()
            .unwrap_or(0))
    }

    async fn balance_of(&mut self, account_id: AccountId) -> Result<Option<i64>> {
        self.reads.insert(ConflictKey::Balance(account_id));
        Ok(self.working.balances.get(&account_id).copied())
    }

    async fn replay_balance(&mut self, account_id: AccountId) -> Result<i64> {
        self.reads.insert(ConflictKey::Balance(account_id));
        let mut balance = 0i64;
        for op in self
            .working
            .operations
            .iter()
            .filter(|op| op.account_id == account_id)
        {
            add_checked(&mut balance, op.signed_amount(), "replayed balance")?;
        }
        Ok(balance)
    }

    async fn operations_for_account(&mut self, account_id: AccountId) -> Result<Vec<Operation>> {
        self.reads.insert(ConflictKey::Balance(account_id));
        let mut operations: Vec<_> = self
            .working
            .operations
            .iter()
            .filter(|op| op.account_id == account_id)
            .cloned()
            .collect();
        operations.sort_by_key(|op| op.created_at);
        Ok(operations)
    }

    async fn overwrite_balance(&mut self, account_id: AccountId, balance: i64) -> Result<()> {
        self.write(
            Write::Balance(account_id, balance),
            Some(ConflictKey::Balance(account_id)),
        )
    }

    async fn ledger_accounts(&mut self) -> Result<Vec<AccountId>> {
        let mut accounts: Vec<AccountId> = self
            .working
            .operations
            .iter()
            .map(|op| op.account_id)
            .chain(self.working.balances.keys().copied())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        accounts.sort();
        Ok(accounts)
    }

    async fn identity_key_exists(
        &mut self,
        scope: IdempotencyScope,
        key: IdentityKey,
    ) -> Result<bool> {
        self.reads.insert(ConflictKey::Identity(scope, key));
        let exists = match scope {
            IdempotencyScope::Transfer => self
                .working
                .transfers
                .iter()
                .any(|t| t.identity_key == Some(key)),
            IdempotencyScope::Purchase => self
                .working
                .purchases
                .iter()
                .any(|p| p.identity_key == Some(key)),
        };
        Ok(exists)
    }

    async fn insert_transfer(&mut self, transfer: &CoinTransfer) -> Result<()> {
        let key = transfer
            .identity_key
            .map(|key| ConflictKey::Identity(IdempotencyScope::Transfer, key));
        self.write(Write::Transfer(transfer.clone()), key)
    }

    async fn insert_purchase(&mut self, purchase: &ShopPurchase) -> Result<()> {
        let key = purchase
            .identity_key
            .map(|key| ConflictKey::Identity(IdempotencyScope::Purchase, key));
        self.write(Write::Purchase(purchase.clone()), key)
    }

    async fn find_account_by_username(&mut self, username: &str) -> Result<Option<Account>> {
        self.reads.insert(ConflictKey::Username(username.to_string()));
        Ok(self
            .working
            .accounts
            .iter()
            .find(|a| a.username == username)
            .cloned())
    }

    async fn find_accounts_by_ids(&mut self, ids: &[AccountId]) -> Result<Vec<Account>> {
        Ok(self
            .working
            .accounts
            .iter()
            .filter(|a| ids.contains(&a.id))
            .cloned()
            .collect())
    }

    async fn insert_account(&mut self, account: &Account) -> Result<()> {
        let key = ConflictKey::Username(account.username.clone());
        self.write(Write::Account(account.clone()), Some(key))
    }

    async fn find_item_by_name(&mut self, name: &str) -> Result<Option<ShopItem>> {
        Ok(self.working.items.iter().find(|i| i.name == name).cloned())
    }

    async fn find_items_by_ids(&mut self, ids: &[ItemId]) -> Result<Vec<ShopItem>> {
        Ok(self
            .working
            .items
            .iter()
            .filter(|i| ids.contains(&i.id))
            .cloned()
            .collect())
    }

    async fn inventory(&mut self, account_id: AccountId) -> Result<Vec<InventoryEntry>> {
        let mut totals: HashMap<ItemId, i64> = HashMap::new();
        for purchase in self
            .working
            .purchases
            .iter()
            .filter(|p| p.account_id == account_id)
        {
            add_checked(
                totals.entry(purchase.item_id).or_insert(0),
                purchase.quantity,
                "inventory quantity",
            )?;
        }

        let mut entries: Vec<_> = totals
            .into_iter()
            .map(|(item_id, quantity)| InventoryEntry { item_id, quantity })
            .collect();
        entries.sort_by_key(|e| e.item_id);
        Ok(entries)
    }

    async fn coin_history(
        &mut self,
        account_id: AccountId,
        direction: TransferDirection,
    ) -> Result<Vec<CoinHistoryEntry>> {
        let mut totals: HashMap<AccountId, i64> = HashMap::new();
        for transfer in self
            .working
            .transfers
            .iter()
            .filter(|t| t.owner_account_id == account_id && t.direction == direction)
        {
            add_checked(
                totals.entry(transfer.counterparty_account_id).or_insert(0),
                transfer.amount,
                "transferred total",
            )?;
        }

        let mut entries: Vec<_> = totals
            .into_iter()
            .map(|(counterparty_account_id, total_amount)| CoinHistoryEntry {
                counterparty_account_id,
                total_amount,
            })
            .collect();
        entries.sort_by_key(|e| e.counterparty_account_id);
        Ok(entries)
    }

    async fn commit(self) -> Result<()> {
        if self.writes.is_empty() {
            return Ok(());
        }

        let mut shared = self.shared.lock().await;

        if shared.injected_conflicts > 0 {
            shared.injected_conflicts -= 1;
            return Err(StoreError::SerializationConflict(
                "injected serialization failure".to_string(),
            ));
        }

        let stale = self
            .reads
            .iter()
            .chain(self.written.iter())
            .find(|key| {
                shared
                    .versions
                    .get(*key)
                    .is_some_and(|version| *version > self.start_seq)
            });
        if let Some(key) = stale {
            tracing::debug!(?key, "in-memory commit rejected");
            return Err(StoreError::SerializationConflict(format!(
                "concurrent update of {key:?}"
            )));
        }

        let mut next = shared.state.clone();
        for write in &self.writes {
            next.apply(write)?;
        }
        shared.state = next;

        shared.commit_seq += 1;
        let seq = shared.commit_seq;
        for key in self.written {
            shared.versions.insert(key, seq);
        }

        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OperationSource;

    async fn store_with_account() -> (InMemoryLedgerStore, AccountId) {
        let store = InMemoryLedgerStore::new();
        let account = Account::new("alice", "hash");
        let mut tx = store.begin().await.unwrap();
        tx.insert_account(&account).await.unwrap();
        tx.commit().await.unwrap();
        (store, account.id)
    }

    fn deposit(account: AccountId, amount: i64) -> Operation {
        Operation::increase(account, amount, OperationSource::Deposit, None).unwrap()
    }

    #[tokio::test]
    async fn append_updates_projection() {
        let (store, account) = store_with_account().await;

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.balance_of(account).await.unwrap(), None);
        assert_eq!(tx.append_operation(&deposit(account, 100)).await.unwrap(), 100);
        assert_eq!(tx.append_operation(&deposit(account, 5)).await.unwrap(), 105);
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.balance_of(account).await.unwrap(), Some(105));
        assert_eq!(tx.replay_balance(account).await.unwrap(), 105);
    }

    #[tokio::test]
    async fn uncommitted_writes_are_discarded() {
        let (store, account) = store_with_account().await;

        let mut tx = store.begin().await.unwrap();
        tx.append_operation(&deposit(account, 100)).await.unwrap();
        tx.rollback().await.unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            tx.append_operation(&deposit(account, 7)).await.unwrap();
            // dropped without commit
        }

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.balance_of(account).await.unwrap(), None);
        assert!(store.operations().await.is_empty());
    }

    #[tokio::test]
    async fn concurrent_appends_to_same_account_conflict() {
        let (store, account) = store_with_account().await;

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        first.append_operation(&deposit(account, 10)).await.unwrap();
        second.append_operation(&deposit(account, 20)).await.unwrap();

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(err.is_serialization_conflict());

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.balance_of(account).await.unwrap(), Some(10));
    }

    #[tokio::test]
    async fn appends_to_different_accounts_do_not_conflict() {
        let store = InMemoryLedgerStore::new();
        let alice = Account::new("alice", "hash");
        let bob = Account::new("bob", "hash");
        let mut tx = store.begin().await.unwrap();
        tx.insert_account(&alice).await.unwrap();
        tx.insert_account(&bob).await.unwrap();
        tx.commit().await.unwrap();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        first.append_operation(&deposit(alice.id, 10)).await.unwrap();
        second.append_operation(&deposit(bob.id, 20)).await.unwrap();
        first.commit().await.unwrap();
        second.commit().await.unwrap();
    }

    #[tokio::test]
    async fn identity_check_then_insert_conflicts() {
        let (store, account) = store_with_account().await;
        let item = ShopItem::new("pen", 10);
        store.insert_item(item.clone()).await;
        let key = IdentityKey::new();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        for tx in [&mut first, &mut second] {
            assert!(
                !tx.identity_key_exists(IdempotencyScope::Purchase, key)
                    .await
                    .unwrap()
            );
            tx.insert_purchase(&ShopPurchase::new(item.id, account, 1, Some(key)))
                .await
                .unwrap();
        }

        first.commit().await.unwrap();
        assert!(second.commit().await.unwrap_err().is_serialization_conflict());
        assert_eq!(store.purchases().await.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_username_is_unique_violation() {
        let (store, _) = store_with_account().await;

        let mut tx = store.begin().await.unwrap();
        let err = tx
            .insert_account(&Account::new("alice", "other"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn operation_for_unknown_account_is_rejected() {
        let store = InMemoryLedgerStore::new();
        let mut tx = store.begin().await.unwrap();
        let err = tx
            .append_operation(&deposit(AccountId::new(), 1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::IntegrityViolation { .. }));
    }

    #[tokio::test]
    async fn injected_conflicts_fail_writing_commits_only() {
        let (store, account) = store_with_account().await;
        store.inject_conflicts(1).await;

        // read-only commit is not affected
        let mut tx = store.begin().await.unwrap();
        tx.balance_of(account).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.append_operation(&deposit(account, 1)).await.unwrap();
        assert!(tx.commit().await.unwrap_err().is_serialization_conflict());

        let mut tx = store.begin().await.unwrap();
        tx.append_operation(&deposit(account, 1)).await.unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn aggregates_group_by_item_and_counterparty() {
        let store = InMemoryLedgerStore::new();
        let alice = Account::new("alice", "hash");
        let bob = Account::new("bob", "hash");
        let pen = ShopItem::new("pen", 10);
        store.insert_item(pen.clone()).await;

        let mut tx = store.begin().await.unwrap();
        tx.insert_account(&alice).await.unwrap();
        tx.insert_account(&bob).await.unwrap();
        tx.insert_purchase(&ShopPurchase::new(pen.id, alice.id, 2, None))
            .await
            .unwrap();
        tx.insert_purchase(&ShopPurchase::new(pen.id, alice.id, 3, None))
            .await
            .unwrap();
        for amount in [5, 7] {
            tx.insert_transfer(&CoinTransfer::new(
                TransferDirection::Sending,
                alice.id,
                bob.id,
                amount,
                None,
            ))
            .await
            .unwrap();
        }
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let inventory = tx.inventory(alice.id).await.unwrap();
        assert_eq!(
            inventory,
            vec![InventoryEntry {
                item_id: pen.id,
                quantity: 5
            }]
        );

        let sent = tx
            .coin_history(alice.id, TransferDirection::Sending)
            .await
            .unwrap();
        assert_eq!(
            sent,
            vec![CoinHistoryEntry {
                counterparty_account_id: bob.id,
                total_amount: 12
            }]
        );
        assert!(
            tx.coin_history(alice.id, TransferDirection::Receiving)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn balance_overflow_is_rejected_without_side_effects() {
        let (store, account) = store_with_account().await;
        let mut tx = store.begin().await.unwrap();
        tx.append_operation(&deposit(account, i64::MAX)).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let err = tx.append_operation(&deposit(account, 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::NumericOverflow(_)), "unexpected error: {err:?}");
        assert_eq!(tx.balance_of(account).await.unwrap(), Some(i64::MAX));
        assert_eq!(tx.operations_for_account(account).await.unwrap().len(), 1);
        tx.commit().await.unwrap();

        assert_eq!(store.operations().await.len(), 1);
    }

    #[tokio::test]
    async fn aggregate_overflow_is_rejected() {
        let (store, account) = store_with_account().await;
        let pen = ShopItem::new("pen", 10);
        store.insert_item(pen.clone()).await;

        let mut tx = store.begin().await.unwrap();
        tx.append_operation(&deposit(account, i64::MAX)).await.unwrap();
        tx.overwrite_balance(account, 0).await.unwrap();
        tx.append_operation(&deposit(account, i64::MAX)).await.unwrap();
        for _ in 0..2 {
            tx.insert_purchase(&ShopPurchase::new(pen.id, account, i64::MAX, None))
                .await
                .unwrap();
        }

        assert!(matches!(
            tx.replay_balance(account).await.unwrap_err(),
            StoreError::NumericOverflow(_)
        ));
        assert!(matches!(
            tx.inventory(account).await.unwrap_err(),
            StoreError::NumericOverflow(_)
        ));
    }

    #[tokio::test]
    async fn non_positive_magnitudes_violate_checks() {
        let (store, account) = store_with_account().await;
        let pen = ShopItem::new("pen", 10);
        store.insert_item(pen.clone()).await;
        let negative = Operation {
            amount: -50,
            ..deposit(account, 50)
        };

        let mut tx = store.begin().await.unwrap();
        let err = tx.append_operation(&negative).await.unwrap_err();
        assert!(
            matches!(err, StoreError::IntegrityViolation { ref constraint } if constraint == "operation_amount_check")
        );

        let err = tx
            .insert_purchase(&ShopPurchase::new(pen.id, account, 0, None))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::IntegrityViolation { .. }));
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.balance_of(account).await.unwrap(), None);
        assert!(store.operations().await.is_empty());
        assert!(store.purchases().await.is_empty());
    }
}
