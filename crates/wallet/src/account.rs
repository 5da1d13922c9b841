//! Account registration, deposits and balance reads.

use async_trait::async_trait;
use common::AccountId;
use ledger_store::{Account, LedgerTx, Operation, OperationSource};
use serde::{Deserialize, Serialize};

use crate::coordinator::UnitOfWork;
use crate::error::{Result, WalletError};
use crate::ledger::record_operation;

/// Finds or creates an account, granting `initial_amount` coins on creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterAccount {
    pub username: String,
    pub credential_hash: String,
    pub initial_amount: i64,
}

impl RegisterAccount {
    pub fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            return Err(WalletError::InvalidRequest(
                "username must not be empty".to_string(),
            ));
        }
        if self.initial_amount < 0 {
            return Err(WalletError::InvalidAmount(self.initial_amount));
        }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for RegisterAccount {
    /// The account and whether this call created it.
    type Output = (Account, bool);

    async fn execute<T: LedgerTx>(&self, tx: &mut T) -> Result<(Account, bool)> {
        if let Some(existing) = tx.find_account_by_username(&self.username).await? {
            return Ok((existing, false));
        }

        let account = Account::new(self.username.clone(), self.credential_hash.clone());
        tx.insert_account(&account).await?;

        if self.initial_amount > 0 {
            let grant = Operation::increase(
                account.id,
                self.initial_amount,
                OperationSource::Deposit,
                None,
            )?;
            record_operation(tx, &grant).await?;
        }

        Ok((account, true))
    }
}

/// Credits an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deposit {
    pub account_id: AccountId,
    pub amount: i64,
    pub source: OperationSource,
}

impl Deposit {
    pub fn validate(&self) -> Result<()> {
        if self.amount <= 0 {
            return Err(WalletError::InvalidAmount(self.amount));
        }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for Deposit {
    type Output = i64;

    async fn execute<T: LedgerTx>(&self, tx: &mut T) -> Result<i64> {
        let operation = Operation::increase(self.account_id, self.amount, self.source, None)?;
        record_operation(tx, &operation).await
    }
}

/// Current balance of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub balance: i64,
    /// False when the account has never had an operation; `balance` is 0 then.
    pub found: bool,
}

pub(crate) struct BalanceQuery(pub AccountId);

#[async_trait]
impl UnitOfWork for BalanceQuery {
    type Output = AccountBalance;

    async fn execute<T: LedgerTx>(&self, tx: &mut T) -> Result<AccountBalance> {
        Ok(match tx.balance_of(self.0).await? {
            Some(balance) => AccountBalance {
                balance,
                found: true,
            },
            None => AccountBalance {
                balance: 0,
                found: false,
            },
        })
    }
}

pub(crate) struct AccountLookup<'a>(pub &'a str);

#[async_trait]
impl UnitOfWork for AccountLookup<'_> {
    type Output = Option<Account>;

    async fn execute<T: LedgerTx>(&self, tx: &mut T) -> Result<Option<Account>> {
        Ok(tx.find_account_by_username(self.0).await?)
    }
}

pub(crate) struct OperationHistory(pub AccountId);

#[async_trait]
impl UnitOfWork for OperationHistory {
    type Output = Vec<Operation>;

    async fn execute<T: LedgerTx>(&self, tx: &mut T) -> Result<Vec<Operation>> {
        Ok(tx.operations_for_account(self.0).await?)
    }
}
