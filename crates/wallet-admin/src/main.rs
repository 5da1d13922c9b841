//! Wallet admin entry point.

use clap::Parser;
use ledger_store::PostgresLedgerStore;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use wallet::{WalletConfig, WalletService};
use wallet_admin::{Cli, Command, Config};

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if config.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run(cli: Cli, config: Config) -> wallet_admin::Result<()> {
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;
    let store = PostgresLedgerStore::new(pool);

    if cli.command == Command::Migrate {
        store.run_migrations().await?;
        tracing::info!("migrations applied");
        return Ok(());
    }

    let wallet = WalletService::new(store, WalletConfig::from_env());
    if let Some(output) = wallet_admin::execute(&wallet, &cli.command).await? {
        println!("{output}");
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    // 1. Parse arguments and load configuration
    let cli = Cli::parse();
    let config = Config::from_env().expect("failed to load configuration");

    // 2. Initialize tracing
    init_tracing(&config);

    // 3. Run the command
    tracing::info!(command = ?cli.command, "running command");
    if let Err(err) = run(cli, config).await {
        tracing::error!(error = %err, "command failed");
        std::process::exit(1);
    }
}
