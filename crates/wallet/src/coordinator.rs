//! Transaction coordinator for running units of work at serializable isolation.

use std::time::Duration;

use async_trait::async_trait;
use ledger_store::{LedgerStore, LedgerTx};

use crate::config::RetryPolicy;
use crate::error::{Result, WalletError};

/// A piece of business logic that runs inside one ledger transaction.
///
/// `execute` may be called several times for the same value when the
/// coordinator retries, so it must derive every write from `self` and what it
/// reads through `tx`, and generate fresh record ids on each call.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    type Output: Send;

    async fn execute<T: LedgerTx>(&self, tx: &mut T) -> Result<Self::Output>;
}

/// Opens transactions, commits or rolls them back, and retries on
/// serialization conflicts.
///
/// The coordinator is the only component that treats
/// [`ErrorKind::SerializationConflict`](crate::ErrorKind::SerializationConflict)
/// as a signal to re-run; every other error propagates after the first attempt.
#[derive(Clone)]
pub struct TransactionCoordinator<S: LedgerStore> {
    store: S,
    policy: RetryPolicy,
    timeout: Option<Duration>,
}

impl<S: LedgerStore> TransactionCoordinator<S> {
    pub fn new(store: S, policy: RetryPolicy, timeout: Option<Duration>) -> Self {
        Self {
            store,
            policy,
            timeout,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Runs `work` once in its own transaction.
    ///
    /// Commits if `work` succeeds. Any error, including a business rule
    /// failure or a timeout, rolls the transaction back and is returned as-is.
    pub async fn run<W: UnitOfWork>(&self, work: &W) -> Result<W::Output> {
        let mut tx = self.store.begin().await?;

        let outcome = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, work.execute(&mut tx))
                .await
                .unwrap_or_else(|_| Err(WalletError::Timeout)),
            None => work.execute(&mut tx).await,
        };

        match outcome {
            Ok(output) => {
                tx.commit().await?;
                Ok(output)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Runs `work` with the bounded retry policy.
    ///
    /// The delay after failed attempt `n` is `n × backoff_unit`. When every
    /// attempt conflicts the caller gets [`WalletError::RetriesExhausted`]
    /// carrying the final conflict as its source.
    pub async fn run_with_retry<W: UnitOfWork>(&self, work: &W) -> Result<W::Output> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            metrics::counter!("wallet_tx_attempts_total").increment(1);

            let last = match self.run(work).await {
                Ok(output) => return Ok(output),
                Err(WalletError::SerializationConflict(last)) => last,
                Err(err) => return Err(err),
            };

            metrics::counter!("wallet_tx_conflicts_total").increment(1);

            if attempt >= self.policy.max_attempts {
                metrics::counter!("wallet_tx_retries_exhausted_total").increment(1);
                tracing::warn!(attempts = attempt, error = %last, "retries exhausted");
                return Err(WalletError::RetriesExhausted {
                    attempts: attempt,
                    last,
                });
            }

            let delay = self.policy.delay_after(attempt);
            tracing::debug!(attempt, ?delay, error = %last, "serialization conflict, retrying");
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use ledger_store::{
        Account, AccountId, InMemoryLedgerStore, Operation, OperationSource, StoreError,
    };

    use super::*;
    use crate::ErrorKind;

    struct Deposit {
        account_id: AccountId,
        amount: i64,
        calls: AtomicU32,
    }

    impl Deposit {
        fn new(account_id: AccountId, amount: i64) -> Self {
            Self {
                account_id,
                amount,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl UnitOfWork for Deposit {
        type Output = i64;

        async fn execute<T: LedgerTx>(&self, tx: &mut T) -> Result<i64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let op = Operation::increase(self.account_id, self.amount, OperationSource::Deposit, None)?;
            Ok(tx.append_operation(&op).await?)
        }
    }

    struct Fails;

    #[async_trait]
    impl UnitOfWork for Fails {
        type Output = ();

        async fn execute<T: LedgerTx>(&self, tx: &mut T) -> Result<()> {
            tx.insert_account(&Account::new("ghost", "hash")).await?;
            Err(WalletError::InvalidRequest("nope".to_string()))
        }
    }

    struct Sleeps;

    #[async_trait]
    impl UnitOfWork for Sleeps {
        type Output = ();

        async fn execute<T: LedgerTx>(&self, _tx: &mut T) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    async fn setup() -> (InMemoryLedgerStore, AccountId) {
        let store = InMemoryLedgerStore::new();
        let account = Account::new("alice", "hash");
        let mut tx = store.begin().await.unwrap();
        tx.insert_account(&account).await.unwrap();
        tx.commit().await.unwrap();
        (store, account.id)
    }

    fn coordinator(store: &InMemoryLedgerStore) -> TransactionCoordinator<InMemoryLedgerStore> {
        TransactionCoordinator::new(
            store.clone(),
            RetryPolicy::new(3, Duration::from_millis(100)),
            None,
        )
    }

    #[tokio::test]
    async fn test_run_commits_on_success() {
        let (store, account) = setup().await;
        let work = Deposit::new(account, 25);

        assert_eq!(coordinator(&store).run(&work).await.unwrap(), 25);
        assert_eq!(store.operations().await.len(), 1);
    }

    #[tokio::test]
    async fn test_run_rolls_back_on_error() {
        let (store, _) = setup().await;
        let before = store.commit_count().await;

        let err = coordinator(&store).run(&Fails).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(store.commit_count().await, before);

        let mut tx = store.begin().await.unwrap();
        assert!(tx.find_account_by_username("ghost").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let (store, account) = setup().await;
        store.inject_conflicts(2).await;
        let work = Deposit::new(account, 10);

        let started = tokio::time::Instant::now();
        assert_eq!(coordinator(&store).run_with_retry(&work).await.unwrap(), 10);

        assert_eq!(work.calls.load(Ordering::SeqCst), 3);
        // 100ms after the first failure, 200ms after the second.
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert_eq!(store.operations().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_retries() {
        let (store, account) = setup().await;
        store.inject_conflicts(5).await;
        let work = Deposit::new(account, 10);

        let err = coordinator(&store).run_with_retry(&work).await.unwrap_err();
        assert!(matches!(
            err,
            WalletError::RetriesExhausted {
                attempts: 3,
                last: StoreError::SerializationConflict(_),
            }
        ));
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(work.calls.load(Ordering::SeqCst), 3);
        assert!(store.operations().await.is_empty());
    }

    #[tokio::test]
    async fn test_business_errors_are_not_retried() {
        let (store, _) = setup().await;
        store.inject_conflicts(1).await;

        let err = coordinator(&store).run_with_retry(&Fails).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_rolls_back() {
        let (store, _) = setup().await;
        let coordinator = TransactionCoordinator::new(
            store.clone(),
            RetryPolicy::default(),
            Some(Duration::from_millis(50)),
        );

        let err = coordinator.run_with_retry(&Sleeps).await.unwrap_err();
        assert!(matches!(err, WalletError::Timeout));
    }
}
