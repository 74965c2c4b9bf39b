//! Keiba crawler
//!
//! Crawls the JRA race results site month by month, parses every page into
//! typed entities and stores them in SQLite. A visitation ledger keyed by
//! `(code, category)` makes repeated runs skip what is already stored.

pub mod config;
pub mod error;
pub mod models;
pub mod scraper;
pub mod storage;
