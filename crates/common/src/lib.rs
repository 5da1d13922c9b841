//! Identifier types shared by the ledger store and the wallet workflows.

mod types;

pub use types::{AccountId, IdentityKey, ItemId, OperationId, PurchaseId, TransferId};
