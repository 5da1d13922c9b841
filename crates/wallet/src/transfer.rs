//! Coin transfer workflow.

use async_trait::async_trait;
use common::{AccountId, IdentityKey};
use ledger_store::{
    CoinTransfer, IdempotencyScope, LedgerTx, Operation, OperationSource, TransferDirection,
};
use serde::{Deserialize, Serialize};

use crate::coordinator::UnitOfWork;
use crate::error::{Result, WalletError};
use crate::idempotency::ensure_fresh;
use crate::ledger::record_operation;

/// Moves `amount` coins from `from` to the account named `to_username`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from: AccountId,
    pub to_username: String,
    pub amount: i64,
    pub identity_key: Option<IdentityKey>,
}

impl TransferRequest {
    pub fn new(from: AccountId, to_username: impl Into<String>, amount: i64) -> Self {
        Self {
            from,
            to_username: to_username.into(),
            amount,
            identity_key: None,
        }
    }

    pub fn with_identity_key(mut self, key: IdentityKey) -> Self {
        self.identity_key = Some(key);
        self
    }

    /// Checks the request before any transaction is opened.
    pub fn validate(&self) -> Result<()> {
        if self.amount <= 0 {
            return Err(WalletError::InvalidAmount(self.amount));
        }
        Ok(())
    }
}

/// Both sides of a committed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// Row owned by the sender.
    pub sent: CoinTransfer,
    /// Row owned by the recipient.
    pub received: CoinTransfer,
}

#[async_trait]
impl UnitOfWork for TransferRequest {
    type Output = TransferReceipt;

    async fn execute<T: LedgerTx>(&self, tx: &mut T) -> Result<TransferReceipt> {
        ensure_fresh(tx, IdempotencyScope::Transfer, self.identity_key).await?;

        let target = tx
            .find_account_by_username(&self.to_username)
            .await?
            .ok_or_else(|| WalletError::AccountNotFound(self.to_username.clone()))?;

        if target.id == self.from {
            return Err(WalletError::SelfTransfer);
        }

        let sent = CoinTransfer::new(
            TransferDirection::Sending,
            self.from,
            target.id,
            self.amount,
            self.identity_key,
        );
        let received = CoinTransfer::new(
            TransferDirection::Receiving,
            target.id,
            self.from,
            self.amount,
            self.identity_key,
        );

        let debit = Operation::decrease(
            self.from,
            self.amount,
            OperationSource::Transfer,
            Some(sent.id.as_uuid()),
        )?;
        let credit = Operation::increase(
            target.id,
            self.amount,
            OperationSource::Transfer,
            Some(received.id.as_uuid()),
        )?;

        // The debit goes first: it is the step that can fail.
        record_operation(tx, &debit).await?;
        record_operation(tx, &credit).await?;

        tx.insert_transfer(&sent).await?;
        tx.insert_transfer(&received).await?;

        Ok(TransferReceipt { sent, received })
    }
}
