//! SQLite storage for crawled JRA data
//!
//! Holds every crawled entity plus the visitation ledger that lets a crawl
//! resume without re-fetching pages it already stored.

pub mod ledger;
pub mod repository;
pub mod schema;

pub use ledger::{LedgerRecord, LedgerStat};
pub use repository::CrawlRepository;
