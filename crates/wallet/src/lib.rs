//! Coin wallet ledger engine.
//!
//! Balances are derived from an append-only operation log. Every write runs
//! as a [`UnitOfWork`] inside a serializable transaction opened by the
//! [`TransactionCoordinator`], which retries the whole unit on serialization
//! conflicts. [`WalletService`] exposes the public operations.
//!
//! ```no_run
//! use ledger_store::InMemoryLedgerStore;
//! use wallet::{TransferRequest, WalletConfig, WalletService};
//!
//! # async fn demo() -> wallet::Result<()> {
//! let wallet = WalletService::new(InMemoryLedgerStore::new(), WalletConfig::default());
//! let (alice, _) = wallet.register_account("alice", "hash").await?;
//! wallet.register_account("bob", "hash").await?;
//! wallet
//!     .transfer(TransferRequest::new(alice.id, "bob", 10))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod account;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod idempotency;
pub mod ledger;
pub mod purchase;
pub mod reconcile;
pub mod service;
pub mod transfer;
pub mod views;

pub use account::{AccountBalance, Deposit, RegisterAccount};
pub use config::{RetryPolicy, WalletConfig};
pub use coordinator::{TransactionCoordinator, UnitOfWork};
pub use error::{ErrorKind, Result, WalletError};
pub use idempotency::ensure_fresh;
pub use ledger::record_operation;
pub use purchase::PurchaseRequest;
pub use reconcile::{BalanceMismatch, ReconciliationReport};
pub use service::WalletService;
pub use transfer::{TransferReceipt, TransferRequest};
pub use views::{CoinHistoryItem, InventoryItem};
