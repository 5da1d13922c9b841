//! Operation log store for the coin wallet.
//!
//! Every mutation goes through a [`LedgerTx`] opened by a [`LedgerStore`] at
//! serializable isolation. Two implementations are provided: an in-memory
//! store with optimistic commit-time validation and a PostgreSQL store.

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;

pub use common::{AccountId, IdentityKey, ItemId, OperationId, PurchaseId, TransferId};
pub use error::{Result, StoreError};
pub use memory::{InMemoryLedgerStore, InMemoryLedgerTx};
pub use model::{
    Account, CoinHistoryEntry, CoinTransfer, IdempotencyScope, InventoryEntry, Operation,
    OperationDirection, OperationSource, ShopItem, ShopPurchase, TransferDirection,
};
pub use postgres::{PostgresLedgerStore, PostgresLedgerTx};
pub use store::{LedgerStore, LedgerTx};
