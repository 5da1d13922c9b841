//! Command-line interface.

use clap::{Parser, Subcommand};
use common::AccountId;

/// Operator tool for the coin wallet ledger.
#[derive(Debug, Parser)]
#[command(name = "wallet-admin", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Apply pending database migrations.
    Migrate,
    /// Compare every balance projection with its operation log.
    Reconcile {
        /// Overwrite drifted projections with the replayed balance.
        #[arg(long)]
        repair: bool,
    },
    /// Print an account's current balance.
    Balance {
        account_id: AccountId,
    },
}
