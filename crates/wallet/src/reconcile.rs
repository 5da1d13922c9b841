//! Balance projection reconciliation.
//!
//! The operation log is authoritative. Reconciliation replays each account's
//! log and compares it with the stored projection, optionally overwriting
//! projections that drifted.

use async_trait::async_trait;
use common::AccountId;
use ledger_store::LedgerTx;
use serde::{Deserialize, Serialize};

use crate::coordinator::UnitOfWork;
use crate::error::Result;

/// A projection that disagrees with its log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceMismatch {
    pub account_id: AccountId,
    /// Stored projection, `None` if the row is missing.
    pub projected: Option<i64>,
    /// Sum of the account's operations.
    pub replayed: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub accounts_checked: usize,
    pub mismatches: Vec<BalanceMismatch>,
    /// Whether mismatching projections were overwritten.
    pub repaired: bool,
}

impl ReconciliationReport {
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}

pub(crate) struct Reconcile {
    pub repair: bool,
}

#[async_trait]
impl UnitOfWork for Reconcile {
    type Output = ReconciliationReport;

    async fn execute<T: LedgerTx>(&self, tx: &mut T) -> Result<ReconciliationReport> {
        let accounts = tx.ledger_accounts().await?;
        let mut report = ReconciliationReport {
            accounts_checked: accounts.len(),
            mismatches: Vec::new(),
            repaired: false,
        };

        for account_id in accounts {
            let projected = tx.balance_of(account_id).await?;
            let replayed = tx.replay_balance(account_id).await?;
            if projected == Some(replayed) {
                continue;
            }

            tracing::warn!(%account_id, ?projected, replayed, "balance projection drifted");
            if self.repair {
                tx.overwrite_balance(account_id, replayed).await?;
            }
            report.mismatches.push(BalanceMismatch {
                account_id,
                projected,
                replayed,
            });
        }

        report.repaired = self.repair && !report.mismatches.is_empty();
        Ok(report)
    }
}
