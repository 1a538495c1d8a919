//! Tradepost CLI - migrations and catalog management.
//!
//! # Usage
//!
//! ```bash
//! # Apply storefront database migrations
//! tp-cli migrate
//!
//! # Insert or update products from a YAML file (matched by title)
//! tp-cli seed products data/products.yaml
//!
//! # Overwrite a product's stock count
//! tp-cli stock set 12 40
//! ```
//!
//! All commands read `STOREFRONT_DATABASE_URL` (or `DATABASE_URL`).

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "tp-cli")]
#[command(author, version, about = "Tradepost CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run storefront database migrations
    Migrate,
    /// Load catalog data
    Seed {
        #[command(subcommand)]
        target: SeedTarget,
    },
    /// Manage product stock
    Stock {
        #[command(subcommand)]
        action: StockAction,
    },
}

#[derive(Subcommand)]
enum SeedTarget {
    /// Upsert products from a YAML file
    Products {
        /// Path to the YAML file
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum StockAction {
    /// Set the stock count of one product
    Set {
        /// Product id
        product_id: i32,
        /// New stock count
        count: u32,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::storefront().await?,
        Commands::Seed { target } => match target {
            SeedTarget::Products { file } => commands::seed::products(&file).await?,
        },
        Commands::Stock { action } => match action {
            StockAction::Set { product_id, count } => {
                commands::stock::set(product_id, count).await?;
            }
        },
    }
    Ok(())
}
