//! Price Scanner CLI
//!
//! Reads the current scan result and manages the price overrides of a
//! running price scanner.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{catalog, scan};

/// Price Scanner CLI
#[derive(Parser)]
#[command(name = "scanctl")]
#[command(author, version, about = "CLI for the Price Scanner", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via SCANCTL_API_URL env var)
    #[arg(long, env = "SCANCTL_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the scan loop state
    Status,

    /// Show the current scan result
    Result,

    /// Pause scanning
    Pause,

    /// Resume scanning
    Resume,

    /// List the labels the classifier knows, with their prices
    Labels,

    /// Show the effective price record for a label
    Get {
        /// Classifier label
        label: String,
    },

    /// Override the price record for a label
    Set {
        /// Classifier label
        label: String,

        /// Display name shown to shoppers
        #[arg(long)]
        name: String,

        /// Price text, e.g. "₦250"
        #[arg(long)]
        price: String,

        /// Product category
        #[arg(long)]
        category: Option<String>,
    },

    /// Remove a label's override and restore its default price
    Reset {
        /// Classifier label
        label: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::Config::load()?;
    let client = client::ApiClient::new(&config.api_url(cli.api_url))?;

    match cli.command {
        Commands::Status => scan::show_status(&client, cli.format).await?,
        Commands::Result => scan::show_result(&client, cli.format).await?,
        Commands::Pause => scan::pause(&client, cli.format).await?,
        Commands::Resume => scan::resume(&client, cli.format).await?,
        Commands::Labels => catalog::list_labels(&client, cli.format).await?,
        Commands::Get { label } => catalog::get_label(&client, &label, cli.format).await?,
        Commands::Set {
            label,
            name,
            price,
            category,
        } => {
            let record = client::PriceRecord {
                display_name: name,
                price,
                category,
            };
            catalog::set_override(&client, &label, record, cli.format).await?;
        }
        Commands::Reset { label } => {
            catalog::reset_override(&client, &label, cli.format).await?
        }
    }

    Ok(())
}
