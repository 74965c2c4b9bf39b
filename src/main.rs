//! Keiba crawler CLI
//!
//! Crawls JRA race results into SQLite and reports on the visitation ledger.

mod cli;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands, CrawlTarget};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keiba_crawler=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli::load_config(cli.database)?;

    match cli.command {
        Commands::Crawl {
            year,
            month,
            headed,
            no_archive,
        } => cli::run_crawl(config, CrawlTarget::Month(year, month), headed, no_archive).await,
        Commands::CrawlRange {
            from,
            to,
            headed,
            no_archive,
        } => cli::run_crawl(config, CrawlTarget::Range(from, to), headed, no_archive).await,
        Commands::Status { format } => cli::run_status(&config, &format),
        Commands::Check { code, category } => cli::run_check(&config, &code, category),
    }
}
