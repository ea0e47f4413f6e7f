//! ShopClub CLI - Database migrations and operator tools.
//!
//! # Usage
//!
//! ```bash
//! # Apply storefront migrations and the session-store schema
//! shopclub-cli migrate
//!
//! # Insert the demo catalog and demo user
//! shopclub-cli seed
//!
//! # Mark a paid order as refunded
//! shopclub-cli order refund ORD-9F86D081884C7D65
//!
//! # Set internal notes on an order
//! shopclub-cli order note ORD-9F86D081884C7D65 "Customer called about delivery"
//! ```
//!
//! # Environment Variables
//!
//! - `STOREFRONT_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection string

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "shopclub-cli")]
#[command(author, version, about = "ShopClub operator tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Seed the demo catalog and demo user
    Seed,
    /// Manage orders
    Order {
        #[command(subcommand)]
        action: OrderAction,
    },
}

#[derive(Subcommand)]
enum OrderAction {
    /// Mark a paid order as refunded
    Refund {
        /// Order number, e.g. ORD-9F86D081884C7D65
        order_number: String,
    },
    /// Set internal admin notes on an order
    Note {
        /// Order number, e.g. ORD-9F86D081884C7D65
        order_number: String,

        /// Note text (replaces any existing notes)
        text: String,
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
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Seed => commands::seed::run().await?,
        Commands::Order { action } => match action {
            OrderAction::Refund { order_number } => {
                commands::order::refund(&order_number).await?;
            }
            OrderAction::Note { order_number, text } => {
                commands::order::note(&order_number, &text).await?;
            }
        },
    }
    Ok(())
}
