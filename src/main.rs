use anyhow::Context;
use clap::{Parser, Subcommand};
use configuration::load_database_config;
use database::{CancellationToken, Manager, run_migrations};
use std::path::PathBuf;

/// Runs migrations against, and reports on, the configured PostgreSQL database.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Also loads .env, so the POSTGRES_* values below can come from it.
    logger::init();

    let cli = Cli::parse();

    let config = load_database_config().context("Failed to load database configuration")?;
    let manager = Manager::connect(config)
        .await
        .context("Failed to connect to the database")?;

    let result = match cli.command {
        Commands::Migrate(args) => handle_migrate(&manager, args).await,
        Commands::Health => handle_health(&manager).await,
        Commands::Stats => {
            handle_stats(&manager);
            Ok(())
        }
    };

    manager.close().await;
    result
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Shared PostgreSQL tooling for mapbot services.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migrations from a directory.
    Migrate(MigrateArgs),
    /// Ping the database and check the pool has room left.
    Health,
    /// Print a snapshot of the connection pool.
    Stats,
}

#[derive(Parser)]
struct MigrateArgs {
    /// Directory holding `<version>_<name>.up.sql` files.
    #[arg(long)]
    path: PathBuf,

    /// Schema of the tracking table.
    #[arg(long, default_value = database::DEFAULT_SCHEMA)]
    schema: String,

    /// Name of the tracking table.
    #[arg(long, default_value = database::DEFAULT_TABLE)]
    table: String,
}

// ==============================================================================
// Command Logic
// ==============================================================================

async fn handle_migrate(manager: &Manager, args: MigrateArgs) -> anyhow::Result<()> {
    let report = run_migrations(manager.pool(), &args.path, &args.schema, &args.table)
        .await
        .with_context(|| format!("Failed to apply migrations from {}", args.path.display()))?;

    match report.version {
        Some(version) => println!(
            "Applied {} migration(s); {}.{} is at version {}{}.",
            report.applied,
            args.schema,
            args.table,
            version,
            if report.dirty { " (dirty)" } else { "" }
        ),
        None => println!("No migrations found in {}.", args.path.display()),
    }
    Ok(())
}

async fn handle_health(manager: &Manager) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.cancel();
        }
    });

    manager
        .health(&cancel)
        .await
        .with_context(|| format!("{} is unhealthy", manager.public_connection_string()))?;

    println!("{} is healthy.", manager.public_connection_string());
    Ok(())
}

fn handle_stats(manager: &Manager) {
    let stats = manager.stats();
    println!("url:              {}", manager.public_connection_string());
    println!("max connections:  {}", stats.max_open_connections);
    println!("open connections: {}", stats.open_connections);
    println!("in use:           {}", stats.in_use);
    println!("idle:             {}", stats.idle);
}
