//! Ledger records.
//!
//! All records are immutable once written. Amounts are `i64` in the smallest
//! currency-agnostic unit and are always positive; direction carries the sign.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AccountId, IdentityKey, ItemId, OperationId, PurchaseId, Result, StoreError, TransferId};

/// Whether an operation adds to or subtracts from a balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationDirection {
    Increase,
    Decrease,
}

impl OperationDirection {
    /// Returns the stored discriminant.
    pub fn as_i16(&self) -> i16 {
        match self {
            OperationDirection::Increase => 1,
            OperationDirection::Decrease => 2,
        }
    }

    /// Parses a stored discriminant.
    pub fn from_i16(value: i16) -> Result<Self> {
        match value {
            1 => Ok(OperationDirection::Increase),
            2 => Ok(OperationDirection::Decrease),
            other => Err(StoreError::InvalidRecord(format!(
                "unknown operation direction {other}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationDirection::Increase => "increase",
            OperationDirection::Decrease => "decrease",
        }
    }
}

impl std::fmt::Display for OperationDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What caused an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationSource {
    Deposit,
    ShopPurchase,
    Transfer,
}

impl OperationSource {
    /// Returns the stored discriminant.
    pub fn as_i16(&self) -> i16 {
        match self {
            OperationSource::Deposit => 1,
            OperationSource::ShopPurchase => 2,
            OperationSource::Transfer => 3,
        }
    }

    /// Parses a stored discriminant.
    pub fn from_i16(value: i16) -> Result<Self> {
        match value {
            1 => Ok(OperationSource::Deposit),
            2 => Ok(OperationSource::ShopPurchase),
            3 => Ok(OperationSource::Transfer),
            other => Err(StoreError::InvalidRecord(format!(
                "unknown operation source {other}"
            ))),
        }
    }
}

/// A single signed monetary event on one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    pub direction: OperationDirection,
    pub account_id: AccountId,
    /// Magnitude, always greater than zero.
    pub amount: i64,
    pub source: OperationSource,
    /// Id of the transfer or purchase record that caused this operation.
    pub source_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Operation {
    /// Builds a new operation, rejecting non-positive magnitudes.
    pub fn new(
        direction: OperationDirection,
        account_id: AccountId,
        amount: i64,
        source: OperationSource,
        source_id: Option<Uuid>,
    ) -> Result<Self> {
        if amount <= 0 {
            return Err(StoreError::InvalidAmount(amount));
        }

        Ok(Self {
            id: OperationId::new(),
            direction,
            account_id,
            amount,
            source,
            source_id,
            created_at: Utc::now(),
        })
    }

    /// Builds an increase operation.
    pub fn increase(
        account_id: AccountId,
        amount: i64,
        source: OperationSource,
        source_id: Option<Uuid>,
    ) -> Result<Self> {
        Self::new(
            OperationDirection::Increase,
            account_id,
            amount,
            source,
            source_id,
        )
    }

    /// Builds a decrease operation.
    pub fn decrease(
        account_id: AccountId,
        amount: i64,
        source: OperationSource,
        source_id: Option<Uuid>,
    ) -> Result<Self> {
        Self::new(
            OperationDirection::Decrease,
            account_id,
            amount,
            source,
            source_id,
        )
    }

    /// Contribution of this operation to the account balance.
    pub fn signed_amount(&self) -> i64 {
        match self.direction {
            OperationDirection::Increase => self.amount,
            OperationDirection::Decrease => -self.amount,
        }
    }
}

/// Which side of a transfer a [`CoinTransfer`] row describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    Sending,
    Receiving,
}

impl TransferDirection {
    /// Returns the stored discriminant.
    pub fn as_i16(&self) -> i16 {
        match self {
            TransferDirection::Sending => 1,
            TransferDirection::Receiving => 2,
        }
    }

    /// Parses a stored discriminant.
    pub fn from_i16(value: i16) -> Result<Self> {
        match value {
            1 => Ok(TransferDirection::Sending),
            2 => Ok(TransferDirection::Receiving),
            other => Err(StoreError::InvalidRecord(format!(
                "unknown transfer direction {other}"
            ))),
        }
    }
}

/// One party's view of a coin transfer.
///
/// A transfer always produces two rows: a `Sending` row owned by the sender
/// and a `Receiving` row owned by the recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinTransfer {
    pub id: TransferId,
    pub direction: TransferDirection,
    pub owner_account_id: AccountId,
    pub counterparty_account_id: AccountId,
    pub amount: i64,
    pub identity_key: Option<IdentityKey>,
    pub created_at: DateTime<Utc>,
}

impl CoinTransfer {
    pub fn new(
        direction: TransferDirection,
        owner_account_id: AccountId,
        counterparty_account_id: AccountId,
        amount: i64,
        identity_key: Option<IdentityKey>,
    ) -> Self {
        Self {
            id: TransferId::new(),
            direction,
            owner_account_id,
            counterparty_account_id,
            amount,
            identity_key,
            created_at: Utc::now(),
        }
    }
}

/// Catalog entry. Never mutated by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopItem {
    pub id: ItemId,
    pub name: String,
    pub price: i64,
}

impl ShopItem {
    pub fn new(name: impl Into<String>, price: i64) -> Self {
        Self {
            id: ItemId::new(),
            name: name.into(),
            price,
        }
    }
}

/// A purchase of `quantity` units of one catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopPurchase {
    pub id: PurchaseId,
    pub item_id: ItemId,
    pub account_id: AccountId,
    pub quantity: i64,
    pub identity_key: Option<IdentityKey>,
    pub created_at: DateTime<Utc>,
}

impl ShopPurchase {
    pub fn new(
        item_id: ItemId,
        account_id: AccountId,
        quantity: i64,
        identity_key: Option<IdentityKey>,
    ) -> Self {
        Self {
            id: PurchaseId::new(),
            item_id,
            account_id,
            quantity,
            identity_key,
            created_at: Utc::now(),
        }
    }
}

/// A wallet account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Unique display name used for lookups.
    pub username: String,
    /// Opaque credential hash produced by the authentication layer.
    #[serde(skip_serializing)]
    pub credential_hash: String,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(username: impl Into<String>, credential_hash: impl Into<String>) -> Self {
        Self {
            id: AccountId::new(),
            username: username.into(),
            credential_hash: credential_hash.into(),
            created_at: Utc::now(),
        }
    }
}

/// Record family an identity key is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdempotencyScope {
    Transfer,
    Purchase,
}

/// Per-item quantity owned by an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub item_id: ItemId,
    pub quantity: i64,
}

/// Total amount moved to or from one counterparty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinHistoryEntry {
    pub counterparty_account_id: AccountId,
    pub total_amount: i64,
}
