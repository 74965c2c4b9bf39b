//! Error types for the crawler.
//!
//! Missing optional data is never an error: extractors return `None`. The
//! enums here cover the fatal cases only.

use thiserror::Error;

use crate::models::DataType;

/// Cross-field inconsistencies detected while normalizing an entity
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Prize schedules of one race disagree on the currency unit
    #[error("prize unit mismatch in race {race}: expected {expected}, found {found}")]
    PrizeUnitMismatch {
        race: String,
        expected: String,
        found: String,
    },

    /// A month code is not `YYYYMM`
    #[error("invalid month code {code:?}, expected YYYYMM")]
    InvalidMonthCode { code: String },

    /// A horse prize line is not denominated in yen
    #[error("prize {label} of horse {horse} is in {unit}, expected 円")]
    HorsePrizeUnit {
        horse: String,
        label: String,
        unit: String,
    },
}

/// Page-level parse failures
#[derive(Error, Debug)]
pub enum ParseError {
    /// A node the page template always carries is absent
    #[error("{page} page: required node `{selector}` not found")]
    MissingNode {
        page: DataType,
        selector: &'static str,
    },

    /// A required attribute is absent on a located node
    #[error("{page} page: node `{selector}` has no `{attribute}` attribute")]
    MissingAttribute {
        page: DataType,
        selector: &'static str,
        attribute: &'static str,
    },

    /// A required field was present but could not be read
    #[error("{page} page: cannot read {field} from {text:?}")]
    InvalidField {
        page: DataType,
        field: &'static str,
        text: String,
    },

    /// Normalization rejected the parsed entity
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Errors raised by a page fetcher
#[derive(Error, Debug)]
pub enum FetchError {
    /// Browser protocol failure
    #[error("browser error: {0}")]
    Browser(#[from] chromiumoxide::error::CdpError),

    /// A strict wait ran out of time
    #[error("timed out after {secs}s waiting for {what}")]
    Timeout { what: String, secs: u64 },

    /// `switch_window` was given an index with no open window
    #[error("no window at index {0}")]
    NoWindow(usize),

    /// A script evaluated but reported failure
    #[error("script failed: {0}")]
    Script(String),

    /// The fetcher has no page for the requested navigation
    #[error("no page for {0}")]
    UnknownPage(String),

    /// `back` was called with an empty history
    #[error("navigation history is empty")]
    EmptyHistory,
}
