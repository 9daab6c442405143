//! Souq CLI - database migrations and order operations.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront migrations and create the session table
//! souq migrate
//!
//! # Validate a shipping rate file
//! souq rates check crates/storefront/config/shipping_rates.yaml
//!
//! # Move an order along its lifecycle
//! souq order set-status ORD-3F9A12C4B07E shipped
//!
//! # Show an order's tracker view
//! souq order show 42
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use souq_core::OrderStatus;

mod commands;

#[derive(Parser)]
#[command(name = "souq")]
#[command(author, version, about = "Souq CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run storefront database migrations
    Migrate,
    /// Inspect shipping rate tables
    Rates {
        #[command(subcommand)]
        action: RatesAction,
    },
    /// Inspect and update orders
    Order {
        #[command(subcommand)]
        action: OrderAction,
    },
}

#[derive(Subcommand)]
enum RatesAction {
    /// Load a rate file and list its regions
    Check {
        /// Path to the YAML rate table
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum OrderAction {
    /// Print an order and its tracker view
    Show {
        /// Order ID or order number
        reference: String,
    },
    /// Move an order to a new status
    SetStatus {
        /// Order ID or order number
        reference: String,

        /// Target status (`processing`, `confirmed`, `shipped`, `delivered`, `cancelled`)
        status: OrderStatus,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Rates { action } => match action {
            RatesAction::Check { file } => commands::rates::check(&file)?,
        },
        Commands::Order { action } => match action {
            OrderAction::Show { reference } => commands::order::show(&reference).await?,
            OrderAction::SetStatus { reference, status } => {
                commands::order::set_status(&reference, status).await?;
            }
        },
    }
    Ok(())
}
