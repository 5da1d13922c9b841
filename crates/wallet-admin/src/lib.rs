//! Operator commands for the coin wallet ledger.

pub mod cli;
pub mod config;
pub mod error;

pub use cli::{Cli, Command};
pub use config::Config;
pub use error::{AdminError, Result};

use ledger_store::LedgerStore;
use wallet::WalletService;

/// Runs a command that only needs the wallet service and returns its output
/// as pretty-printed JSON.
///
/// `Migrate` needs direct database access and yields `None` here.
pub async fn execute<S: LedgerStore>(
    wallet: &WalletService<S>,
    command: &Command,
) -> Result<Option<String>> {
    let output = match command {
        Command::Migrate => return Ok(None),
        Command::Reconcile { repair } => {
            let report = wallet.reconcile(*repair).await?;
            if !report.is_consistent() {
                tracing::warn!(
                    mismatches = report.mismatches.len(),
                    repaired = report.repaired,
                    "balance projections drifted"
                );
            }
            serde_json::to_string_pretty(&report)?
        }
        Command::Balance { account_id } => {
            serde_json::to_string_pretty(&wallet.get_balance(*account_id).await?)?
        }
    };

    Ok(Some(output))
}
