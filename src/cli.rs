//! CLI commands for keiba-crawler.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use keiba_crawler::config::CrawlConfig;
use keiba_crawler::models::DataType;
use keiba_crawler::scraper::{
    ChromeFetcher, CrawlStats, Crawler, FileArchive, HtmlArchive, NoArchive, YearMonth,
};
use keiba_crawler::storage::CrawlRepository;

#[derive(Parser)]
#[command(name = "keiba-crawler")]
#[command(version, about = "Keiba crawler: resumable JRA race results crawler", long_about = None)]
pub struct Cli {
    /// Database path override
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Crawl one month of results
    Crawl {
        /// Year to crawl
        #[arg(short, long)]
        year: i32,

        /// Month to crawl (1-12)
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..=12))]
        month: u32,

        /// Show the browser window
        #[arg(long)]
        headed: bool,

        /// Do not archive fetched pages
        #[arg(long)]
        no_archive: bool,
    },

    /// Crawl every month in a range, end exclusive
    CrawlRange {
        /// First month (YYYY-MM)
        #[arg(long)]
        from: YearMonth,

        /// Month after the last one crawled (YYYY-MM)
        #[arg(long)]
        to: YearMonth,

        /// Show the browser window
        #[arg(long)]
        headed: bool,

        /// Do not archive fetched pages
        #[arg(long)]
        no_archive: bool,
    },

    /// Show ledger and table counts
    Status {
        /// Output format (json, table)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Look up a code in the ledger without counting a visit
    Check {
        /// Site code, e.g. pw01dud102022104401/B0
        #[arg(long)]
        code: String,

        /// Ledger category (horse, jockey, trainer, race, match, month, ...)
        #[arg(long)]
        category: DataType,
    },
}

/// What a crawl command covers
pub enum CrawlTarget {
    Month(i32, u32),
    Range(YearMonth, YearMonth),
}

/// Load configuration and apply CLI overrides
pub fn load_config(database: Option<PathBuf>) -> Result<CrawlConfig> {
    let mut config = CrawlConfig::load().context("Failed to load configuration")?;
    if let Some(path) = database {
        config.storage.database_path = path;
    }
    Ok(config)
}

/// Run a crawl with a fresh browser session.
pub async fn run_crawl(
    mut config: CrawlConfig,
    target: CrawlTarget,
    headed: bool,
    no_archive: bool,
) -> Result<()> {
    if headed {
        config.browser.headless = false;
    }
    if no_archive {
        config.storage.archive = false;
    }

    let repo = CrawlRepository::new(&config.storage.database_path)?;
    let archive: Box<dyn HtmlArchive> = if config.storage.archive {
        Box::new(FileArchive::new(config.storage.archive_dir.clone()))
    } else {
        Box::new(NoArchive)
    };

    eprintln!("Database: {}", config.storage.database_path.display());
    let mut fetcher = ChromeFetcher::launch(&config.browser).await?;

    let (outcome, stats) = {
        let mut crawler = Crawler::new(&mut fetcher, &repo, archive.as_ref(), &config.site);
        let outcome = match target {
            CrawlTarget::Month(year, month) => crawler.crawl_month(year, month).await,
            CrawlTarget::Range(from, to) => crawler.crawl_range(from, to).await,
        };
        (outcome, crawler.into_stats())
    };
    fetcher.close().await?;

    print_crawl_stats(&stats);
    outcome
}

fn print_crawl_stats(stats: &CrawlStats) {
    eprintln!();
    eprintln!("Pages parsed: {}", stats.pages);
    eprintln!("{:<16} {:>8} {:>8}", "category", "stored", "skipped");
    eprintln!("{}", "-".repeat(34));
    for kind in DataType::ALL {
        let (stored, skipped) = (stats.inserted(kind), stats.skipped(kind));
        if stored + skipped > 0 {
            eprintln!("{:<16} {:>8} {:>8}", kind.as_str(), stored, skipped);
        }
    }
}

/// Print ledger statistics and table counts.
pub fn run_status(config: &CrawlConfig, format: &str) -> Result<()> {
    let repo = CrawlRepository::new(&config.storage.database_path)?;
    let ledger = repo.ledger_stats()?;
    let tables: BTreeMap<_, _> = repo.table_counts()?.into_iter().collect();

    if format == "json" {
        let output = serde_json::json!({
            "database": config.storage.database_path,
            "ledger": ledger,
            "tables": tables,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Database: {}", config.storage.database_path.display());
    println!();
    println!("{:<16} {:>10} {:>10}", "category", "entries", "visits");
    println!("{}", "-".repeat(38));
    for stat in &ledger {
        println!(
            "{:<16} {:>10} {:>10}",
            stat.category.as_str(),
            stat.entries,
            stat.visits
        );
    }
    println!();
    println!("{:<16} {:>10}", "table", "rows");
    println!("{}", "-".repeat(27));
    for (table, rows) in &tables {
        println!("{:<16} {:>10}", table, rows);
    }
    Ok(())
}

/// Print the ledger row of one code.
pub fn run_check(config: &CrawlConfig, code: &str, category: DataType) -> Result<()> {
    let repo = CrawlRepository::new(&config.storage.database_path)?;
    match repo.find_code(code, category)? {
        Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
        None => println!("{} {} is not recorded", category, code),
    }
    Ok(())
}
