//! Wallet service façade.

use std::time::Instant;

use common::AccountId;
use ledger_store::{Account, LedgerStore, Operation, OperationSource, ShopPurchase, TransferDirection};

use crate::account::{AccountBalance, AccountLookup, BalanceQuery, Deposit, OperationHistory, RegisterAccount};
use crate::config::WalletConfig;
use crate::coordinator::TransactionCoordinator;
use crate::error::{ErrorKind, Result};
use crate::purchase::PurchaseRequest;
use crate::reconcile::{Reconcile, ReconciliationReport};
use crate::transfer::{TransferReceipt, TransferRequest};
use crate::views::{CoinHistoryItem, CoinHistoryQuery, InventoryItem, InventoryQuery};

/// Entry point for every wallet operation.
///
/// Writes run through the coordinator's retry loop; reads run once. Every
/// call is recorded in `wallet_workflow_total` and
/// `wallet_workflow_duration_seconds`.
pub struct WalletService<S: LedgerStore> {
    coordinator: TransactionCoordinator<S>,
    config: WalletConfig,
}

impl<S: LedgerStore> WalletService<S> {
    /// Creates a new wallet service over `store`.
    pub fn new(store: S, config: WalletConfig) -> Self {
        let coordinator =
            TransactionCoordinator::new(store, config.retry_policy(), config.tx_timeout());
        Self {
            coordinator,
            config,
        }
    }

    pub fn coordinator(&self) -> &TransactionCoordinator<S> {
        &self.coordinator
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    /// Credits `amount` coins to an account and returns the new balance.
    #[tracing::instrument(skip(self))]
    pub async fn deposit(
        &self,
        account_id: AccountId,
        amount: i64,
        source: OperationSource,
    ) -> Result<i64> {
        let started = Instant::now();
        let work = Deposit {
            account_id,
            amount,
            source,
        };
        let result = async {
            work.validate()?;
            self.coordinator.run_with_retry(&work).await
        }
        .await;
        observe("deposit", started, result)
    }

    /// Reads the balance projection of an account.
    #[tracing::instrument(skip(self))]
    pub async fn get_balance(&self, account_id: AccountId) -> Result<AccountBalance> {
        let started = Instant::now();
        let result = self.coordinator.run(&BalanceQuery(account_id)).await;
        observe("get_balance", started, result)
    }

    /// Moves coins between two accounts.
    ///
    /// Fails with `Validation` for a non-positive amount, `NotFound` for an
    /// unknown recipient, `Conflict` for a self-transfer or a reused identity
    /// key, and `InsufficientFunds` when the sender cannot cover the amount.
    /// Nothing is persisted on failure.
    #[tracing::instrument(
        skip(self, request),
        fields(from = %request.from, to = %request.to_username, amount = request.amount)
    )]
    pub async fn transfer(&self, request: TransferRequest) -> Result<TransferReceipt> {
        let started = Instant::now();
        let result = async {
            request.validate()?;
            self.coordinator.run_with_retry(&request).await
        }
        .await;
        observe("transfer", started, result)
    }

    /// Buys catalog items with coins.
    #[tracing::instrument(
        skip(self, request),
        fields(
            account_id = %request.account_id,
            item = %request.item_name,
            quantity = request.quantity
        )
    )]
    pub async fn purchase(&self, request: PurchaseRequest) -> Result<ShopPurchase> {
        let started = Instant::now();
        let result = async {
            request.validate()?;
            self.coordinator.run_with_retry(&request).await
        }
        .await;
        observe("purchase", started, result)
    }

    /// Returns the items an account has bought, summed per item.
    #[tracing::instrument(skip(self))]
    pub async fn get_inventory(&self, account_id: AccountId) -> Result<Vec<InventoryItem>> {
        let started = Instant::now();
        let result = self.coordinator.run(&InventoryQuery(account_id)).await;
        observe("get_inventory", started, result)
    }

    /// Returns coins sent or received by an account, summed per counterparty.
    #[tracing::instrument(skip(self))]
    pub async fn get_coin_history(
        &self,
        account_id: AccountId,
        direction: TransferDirection,
    ) -> Result<Vec<CoinHistoryItem>> {
        let started = Instant::now();
        let result = self
            .coordinator
            .run(&CoinHistoryQuery {
                account_id,
                direction,
            })
            .await;
        observe("get_coin_history", started, result)
    }

    /// Finds the account named `username`, creating it with the configured
    /// starting balance if it does not exist yet.
    ///
    /// The boolean is true when this call created the account.
    #[tracing::instrument(skip(self, credential_hash))]
    pub async fn register_account(
        &self,
        username: &str,
        credential_hash: &str,
    ) -> Result<(Account, bool)> {
        let started = Instant::now();
        let work = RegisterAccount {
            username: username.to_string(),
            credential_hash: credential_hash.to_string(),
            initial_amount: self.config.new_account_amount,
        };
        let result = async {
            work.validate()?;
            self.coordinator.run_with_retry(&work).await
        }
        .await;
        observe("register_account", started, result)
    }

    #[tracing::instrument(skip(self))]
    pub async fn find_account(&self, username: &str) -> Result<Option<Account>> {
        let started = Instant::now();
        let result = self.coordinator.run(&AccountLookup(username)).await;
        observe("find_account", started, result)
    }

    /// Returns an account's operation log, oldest first.
    #[tracing::instrument(skip(self))]
    pub async fn operations(&self, account_id: AccountId) -> Result<Vec<Operation>> {
        let started = Instant::now();
        let result = self.coordinator.run(&OperationHistory(account_id)).await;
        observe("operations", started, result)
    }

    /// Compares every balance projection with its replayed log.
    ///
    /// With `repair`, drifted projections are overwritten with the replayed
    /// value in the same transaction.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile(&self, repair: bool) -> Result<ReconciliationReport> {
        let started = Instant::now();
        let work = Reconcile { repair };
        let result = if repair {
            self.coordinator.run_with_retry(&work).await
        } else {
            self.coordinator.run(&work).await
        };
        observe("reconcile", started, result)
    }
}

fn observe<T>(workflow: &'static str, started: Instant, result: Result<T>) -> Result<T> {
    let outcome = match &result {
        Ok(_) => "ok",
        Err(err) => err.kind().as_str(),
    };

    metrics::counter!("wallet_workflow_total", "workflow" => workflow, "outcome" => outcome)
        .increment(1);
    metrics::histogram!("wallet_workflow_duration_seconds", "workflow" => workflow)
        .record(started.elapsed().as_secs_f64());

    match &result {
        Ok(_) => tracing::debug!(workflow, "workflow completed"),
        Err(err) if err.kind() == ErrorKind::Internal => {
            tracing::error!(workflow, error = ?err, "workflow failed");
        }
        Err(err) => tracing::debug!(workflow, kind = %err.kind(), error = %err, "workflow rejected"),
    }

    result
}
