use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Account, AccountId, CoinHistoryEntry, CoinTransfer, IdempotencyScope, IdentityKey,
    InventoryEntry, ItemId, Operation, OperationDirection, OperationId, OperationSource, Result,
    ShopItem, ShopPurchase, TransferDirection,
    store::{LedgerStore, LedgerTx},
};

/// PostgreSQL-backed ledger store implementation.
#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    /// Creates a new PostgreSQL ledger store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    type Tx = PostgresLedgerTx;

    async fn begin(&self) -> Result<PostgresLedgerTx> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;
        Ok(PostgresLedgerTx { tx })
    }
}

/// Transaction handle of [`PostgresLedgerStore`].
///
/// Dropping the handle without committing rolls the transaction back.
pub struct PostgresLedgerTx {
    tx: Transaction<'static, Postgres>,
}

fn row_to_operation(row: PgRow) -> Result<Operation> {
    Ok(Operation {
        id: OperationId::from_uuid(row.try_get::<Uuid, _>("operation_id")?),
        direction: OperationDirection::from_i16(row.try_get("operation_type")?)?,
        account_id: AccountId::from_uuid(row.try_get::<Uuid, _>("account_id")?),
        amount: row.try_get("amount")?,
        source: OperationSource::from_i16(row.try_get("source_type")?)?,
        source_id: row.try_get("source_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_account(row: PgRow) -> Result<Account> {
    Ok(Account {
        id: AccountId::from_uuid(row.try_get::<Uuid, _>("account_id")?),
        username: row.try_get("username")?,
        credential_hash: row.try_get("credential_hash")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_item(row: PgRow) -> Result<ShopItem> {
    Ok(ShopItem {
        id: ItemId::from_uuid(row.try_get::<Uuid, _>("item_id")?),
        name: row.try_get("name")?,
        price: row.try_get("price")?,
    })
}

#[async_trait]
impl LedgerTx for PostgresLedgerTx {
    async fn append_operation(&mut self, operation: &Operation) -> Result<i64> {
        sqlx::query(
            r#"
            INSERT INTO operation (operation_id, operation_type, account_id, amount, source_type, source_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(operation.id.as_uuid())
        .bind(operation.direction.as_i16())
        .bind(operation.account_id.as_uuid())
        .bind(operation.amount)
        .bind(operation.source.as_i16())
        .bind(operation.source_id)
        .bind(operation.created_at)
        .execute(&mut *self.tx)
        .await?;

        // Two transactions racing on the same projection row are forced apart
        // by serializable isolation; one of them fails with 40001.
        let balance: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO operation_balance (account_id, balance)
            VALUES ($1, $2)
            ON CONFLICT (account_id) DO UPDATE SET
                balance = operation_balance.balance + EXCLUDED.balance
            RETURNING balance
            "#,
        )
        .bind(operation.account_id.as_uuid())
        .bind(operation.signed_amount())
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(balance)
    }

    async fn balance_of(&mut self, account_id: AccountId) -> Result<Option<i64>> {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT balance FROM operation_balance WHERE account_id = $1")
                .bind(account_id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await?;

        Ok(balance)
    }

    async fn replay_balance(&mut self, account_id: AccountId) -> Result<i64> {
        let balance: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(CASE WHEN operation_type = 1 THEN amount ELSE -amount END), 0)::BIGINT
            FROM operation
            WHERE account_id = $1
            "#,
        )
        .bind(account_id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(balance)
    }

    async fn operations_for_account(&mut self, account_id: AccountId) -> Result<Vec<Operation>> {
        let rows = sqlx::query(
            r#"
            SELECT operation_id, operation_type, account_id, amount, source_type, source_id, created_at
            FROM operation
            WHERE account_id = $1
            ORDER BY created_at ASC, operation_id ASC
            "#,
        )
        .bind(account_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_operation).collect()
    }

    async fn overwrite_balance(&mut self, account_id: AccountId, balance: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO operation_balance (account_id, balance)
            VALUES ($1, $2)
            ON CONFLICT (account_id) DO UPDATE SET balance = EXCLUDED.balance
            "#,
        )
        .bind(account_id.as_uuid())
        .bind(balance)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn ledger_accounts(&mut self) -> Result<Vec<AccountId>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT account_id FROM operation
            UNION
            SELECT account_id FROM operation_balance
            ORDER BY account_id
            "#,
        )
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(ids.into_iter().map(AccountId::from_uuid).collect())
    }

    async fn identity_key_exists(
        &mut self,
        scope: IdempotencyScope,
        key: IdentityKey,
    ) -> Result<bool> {
        let sql = match scope {
            IdempotencyScope::Transfer => {
                "SELECT EXISTS(SELECT 1 FROM coin_transfer WHERE identity_key = $1)"
            }
            IdempotencyScope::Purchase => {
                "SELECT EXISTS(SELECT 1 FROM shop_purchase WHERE identity_key = $1)"
            }
        };

        let exists: bool = sqlx::query_scalar(sql)
            .bind(key.as_uuid())
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(exists)
    }

    async fn insert_transfer(&mut self, transfer: &CoinTransfer) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO coin_transfer (transfer_id, transfer_type, owner_account_id, counterparty_account_id, amount, identity_key, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(transfer.id.as_uuid())
        .bind(transfer.direction.as_i16())
        .bind(transfer.owner_account_id.as_uuid())
        .bind(transfer.counterparty_account_id.as_uuid())
        .bind(transfer.amount)
        .bind(transfer.identity_key.map(|k| k.as_uuid()))
        .bind(transfer.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn insert_purchase(&mut self, purchase: &ShopPurchase) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO shop_purchase (purchase_id, item_id, account_id, quantity, identity_key, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(purchase.id.as_uuid())
        .bind(purchase.item_id.as_uuid())
        .bind(purchase.account_id.as_uuid())
        .bind(purchase.quantity)
        .bind(purchase.identity_key.map(|k| k.as_uuid()))
        .bind(purchase.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn find_account_by_username(&mut self, username: &str) -> Result<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT account_id, username, credential_hash, created_at
            FROM account
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_account).transpose()
    }

    async fn find_accounts_by_ids(&mut self, ids: &[AccountId]) -> Result<Vec<Account>> {
        let ids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let rows = sqlx::query(
            r#"
            SELECT account_id, username, credential_hash, created_at
            FROM account
            WHERE account_id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_account).collect()
    }

    async fn insert_account(&mut self, account: &Account) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO account (account_id, username, credential_hash, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(account.id.as_uuid())
        .bind(&account.username)
        .bind(&account.credential_hash)
        .bind(account.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn find_item_by_name(&mut self, name: &str) -> Result<Option<ShopItem>> {
        let row = sqlx::query("SELECT item_id, name, price FROM shop_item WHERE name = $1")
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(row_to_item).transpose()
    }

    async fn find_items_by_ids(&mut self, ids: &[ItemId]) -> Result<Vec<ShopItem>> {
        let ids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let rows = sqlx::query("SELECT item_id, name, price FROM shop_item WHERE item_id = ANY($1)")
            .bind(ids)
            .fetch_all(&mut *self.tx)
            .await?;

        rows.into_iter().map(row_to_item).collect()
    }

    async fn inventory(&mut self, account_id: AccountId) -> Result<Vec<InventoryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT item_id, SUM(quantity)::BIGINT AS quantity
            FROM shop_purchase
            WHERE account_id = $1
            GROUP BY item_id
            ORDER BY item_id
            "#,
        )
        .bind(account_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<InventoryEntry> {
                Ok(InventoryEntry {
                    item_id: ItemId::from_uuid(row.try_get::<Uuid, _>("item_id")?),
                    quantity: row.try_get("quantity")?,
                })
            })
            .collect()
    }

    async fn coin_history(
        &mut self,
        account_id: AccountId,
        direction: TransferDirection,
    ) -> Result<Vec<CoinHistoryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT counterparty_account_id, SUM(amount)::BIGINT AS total_amount
            FROM coin_transfer
            WHERE owner_account_id = $1 AND transfer_type = $2
            GROUP BY counterparty_account_id
            ORDER BY counterparty_account_id
            "#,
        )
        .bind(account_id.as_uuid())
        .bind(direction.as_i16())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<CoinHistoryEntry> {
                Ok(CoinHistoryEntry {
                    counterparty_account_id: AccountId::from_uuid(
                        row.try_get::<Uuid, _>("counterparty_account_id")?,
                    ),
                    total_amount: row.try_get("total_amount")?,
                })
            })
            .collect()
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
