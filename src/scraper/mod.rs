//! Web crawler for the JRA race results site
//!
//! Provides browser automation, HTML parsing, archival and the crawl
//! orchestration that ties them to storage.

pub mod archive;
pub mod browser;
pub mod crawler;
pub mod extract;
pub mod fetcher;
pub mod navigator;
pub mod parsers;

pub use archive::{FileArchive, HtmlArchive, NoArchive};
pub use browser::ChromeFetcher;
pub use crawler::{CrawlStats, Crawler};
pub use fetcher::{Locator, PageFetcher, WaitPolicy};
pub use navigator::Navigator;

use std::fmt;
use std::str::FromStr;

/// Page the result search is reached from
pub const BEGIN_URL: &str = "https://jra.jp/faq/pop02/1_6.html";
/// Base for relative links found on result pages
pub const BASE_URL: &str = "https://jra.jp";

/// A calendar month, ordered chronologically
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = String;

    /// Parse `YYYY-MM`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| format!("expected YYYY-MM, got {}", s))?;
        let year = year
            .parse::<i32>()
            .map_err(|_| format!("invalid year in {}", s))?;
        let month = month
            .parse::<u32>()
            .map_err(|_| format!("invalid month in {}", s))?;
        YearMonth::new(year, month).ok_or_else(|| format!("month out of range in {}", s))
    }
}

/// Every month from `start` up to but excluding `end`
pub fn year_month_range(start: YearMonth, end: YearMonth) -> Vec<YearMonth> {
    let mut months = Vec::new();
    let mut current = start;
    while current < end {
        months.push(current);
        current = current.next();
    }
    months
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ym(year: i32, month: u32) -> YearMonth {
        YearMonth::new(year, month).unwrap()
    }

    #[test]
    fn test_year_month_range_crosses_year() {
        let months = year_month_range(ym(2023, 11), ym(2024, 2));
        assert_eq!(months, vec![ym(2023, 11), ym(2023, 12), ym(2024, 1)]);
    }

    #[test]
    fn test_year_month_range_empty() {
        assert!(year_month_range(ym(2024, 5), ym(2024, 5)).is_empty());
        assert!(year_month_range(ym(2024, 6), ym(2024, 5)).is_empty());
    }

    #[test]
    fn test_parse_year_month() {
        assert_eq!("2024-03".parse::<YearMonth>().unwrap(), ym(2024, 3));
        assert_eq!(ym(2024, 3).to_string(), "2024-03");
        assert!("2024-13".parse::<YearMonth>().is_err());
        assert!("202403".parse::<YearMonth>().is_err());
        assert!(YearMonth::new(2024, 0).is_none());
    }
}
