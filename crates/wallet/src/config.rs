//! Wallet configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

/// Wallet tuning knobs with sensible defaults.
///
/// Reads from environment variables:
/// - `WALLET_MAX_TX_ATTEMPTS`: attempts per workflow (default: `3`)
/// - `WALLET_RETRY_BACKOFF_MS`: backoff unit in milliseconds (default: `100`)
/// - `WALLET_TX_TIMEOUT_MS`: unit-of-work timeout, `0` disables (default: `5000`)
/// - `WALLET_NEW_ACCOUNT_AMOUNT`: coins granted at sign-up (default: `1000`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletConfig {
    pub max_tx_attempts: u32,
    pub retry_backoff_unit_ms: u64,
    pub tx_timeout_ms: u64,
    pub new_account_amount: i64,
}

impl WalletConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_tx_attempts: env_or("WALLET_MAX_TX_ATTEMPTS", defaults.max_tx_attempts),
            retry_backoff_unit_ms: env_or("WALLET_RETRY_BACKOFF_MS", defaults.retry_backoff_unit_ms),
            tx_timeout_ms: env_or("WALLET_TX_TIMEOUT_MS", defaults.tx_timeout_ms),
            new_account_amount: env_or("WALLET_NEW_ACCOUNT_AMOUNT", defaults.new_account_amount),
        }
    }

    /// Returns the retry policy described by this configuration.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_tx_attempts.max(1),
            backoff_unit: Duration::from_millis(self.retry_backoff_unit_ms),
        }
    }

    /// Returns the unit-of-work timeout, or `None` when disabled.
    pub fn tx_timeout(&self) -> Option<Duration> {
        (self.tx_timeout_ms > 0).then(|| Duration::from_millis(self.tx_timeout_ms))
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            max_tx_attempts: 3,
            retry_backoff_unit_ms: 100,
            tx_timeout_ms: 5_000,
            new_account_amount: 1_000,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

/// Bounded retry with linear backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Always at least 1.
    pub max_attempts: u32,
    pub backoff_unit: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_unit: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_unit,
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff_unit.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        WalletConfig::default().retry_policy()
    }
}
