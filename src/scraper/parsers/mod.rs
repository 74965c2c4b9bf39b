//! HTML parsers for the JRA result pages.
//!
//! One parser per page template. Each turns a page into an entity plus the
//! references it links to, and never returns a partial entity.

pub mod horse;
pub mod jockey;
pub mod match_page;
pub mod month;
pub mod odds;
pub mod race;
pub mod trainer;

pub use horse::HorseParser;
pub use jockey::{JockeyParser, JockeySummaryParser};
pub use match_page::MatchParser;
pub use month::MonthParser;
pub use odds::OddsParser;
pub use race::RaceParser;
pub use trainer::{TrainerParser, TrainerSummaryParser};

use anyhow::Result;
use scraper::{ElementRef, Selector};
use serde::Serialize;
use tracing::error;

use crate::error::{ModelError, ParseError};
use crate::models::{DataType, Normalize, Reference, References, Summary};
use crate::scraper::archive::HtmlArchive;
use crate::scraper::extract::element_text;

/// What the caller knows about the page being parsed
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PageContext {
    pub code: String,
    pub name: Option<String>,
    pub father_code: Option<String>,
}

impl PageContext {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    pub fn with_father(mut self, father_code: impl Into<String>) -> Self {
        self.father_code = Some(father_code.into());
        self
    }
}

/// Which parser produced a result, and from what
#[derive(Debug, Clone, Serialize)]
pub struct ParseMeta {
    pub parser: &'static str,
    pub version: &'static str,
    pub context: PageContext,
}

/// Output of a page parser
#[derive(Debug, Clone)]
pub struct ParseResult<T> {
    pub entity: Option<T>,
    pub references: References,
    /// Summary rows, filled by the history pages
    pub history: Vec<Summary>,
    pub meta: ParseMeta,
}

impl<T> ParseResult<T> {
    pub fn new(kind: DataType, version: &'static str, context: &PageContext) -> Self {
        Self {
            entity: None,
            references: References::new(),
            history: Vec::new(),
            meta: ParseMeta {
                parser: kind.as_str(),
                version,
                context: context.clone(),
            },
        }
    }

    /// References of one category, in page order
    pub fn references(&self, kind: DataType) -> &[Reference] {
        self.references.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn push_reference(&mut self, reference: Reference) {
        self.references
            .entry(reference.category)
            .or_default()
            .push(reference);
    }
}

impl<T: Normalize> ParseResult<T> {
    /// Normalize the parsed entity and keep it
    pub fn set_entity(&mut self, entity: T) -> Result<(), ModelError> {
        self.entity = Some(entity.normalized()?);
        Ok(())
    }
}

/// A parser for one page template
pub trait PageParser {
    type Entity: Normalize;

    /// Page category, also the archive category
    const KIND: DataType;
    const VERSION: &'static str = "0.1";

    fn parse(html: &str, context: &PageContext) -> Result<ParseResult<Self::Entity>, ParseError>;
}

/// Archive the page, parse it, and archive it again under `failed` when
/// parsing does not succeed.
pub fn parse_and_archive<P: PageParser>(
    archive: &dyn HtmlArchive,
    html: &str,
    context: &PageContext,
) -> Result<ParseResult<P::Entity>> {
    archive.save(P::KIND, &context.code, html)?;

    match P::parse(html, context) {
        Ok(result) => Ok(result),
        Err(e) => {
            let saved = archive.save(DataType::Failed, &context.code, html)?;
            error!(
                parser = P::KIND.as_str(),
                code = %context.code,
                path = ?saved,
                "Parse failed: {}",
                e
            );
            Err(e.into())
        }
    }
}

// ==================== Selector helpers ====================

pub(crate) fn select_first<'a>(scope: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).unwrap();
    scope.select(&selector).next()
}

pub(crate) fn select_all<'a>(scope: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    let selector = Selector::parse(css).unwrap();
    scope.select(&selector).collect()
}

pub(crate) fn text_of(scope: ElementRef, css: &str) -> Option<String> {
    select_first(scope, css).map(|el| element_text(&el))
}

pub(crate) fn require<'a>(
    page: DataType,
    scope: ElementRef<'a>,
    css: &'static str,
) -> Result<ElementRef<'a>, ParseError> {
    select_first(scope, css).ok_or(ParseError::MissingNode {
        page,
        selector: css,
    })
}

pub(crate) fn require_attr<'a>(
    page: DataType,
    element: ElementRef<'a>,
    css: &'static str,
    attribute: &'static str,
) -> Result<&'a str, ParseError> {
    element
        .value()
        .attr(attribute)
        .ok_or(ParseError::MissingAttribute {
            page,
            selector: css,
            attribute,
        })
}

/// Turn empty strings into `None`
pub(crate) fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Shared HTML fixtures, kept next to the integration tests
#[cfg(test)]
pub(crate) mod fixtures {
    macro_rules! fixture {
        ($name:literal) => {
            include_str!(concat!(
                env!("CARGO_MANIFEST_DIR"),
                "/tests/fixtures/jra/",
                $name
            ))
        };
    }

    pub const MONTH: &str = fixture!("month.html");
    pub const MATCH: &str = fixture!("match.html");
    pub const RACE: &str = fixture!("race.html");
    pub const HORSE: &str = fixture!("horse.html");
    pub const JOCKEY: &str = fixture!("jockey.html");
    pub const JOCKEY_SUMMARY: &str = fixture!("jockey_summary.html");
    pub const TRAINER: &str = fixture!("trainer.html");
    pub const TRAINER_SUMMARY: &str = fixture!("trainer_summary.html");
    pub const ODDS: &str = fixture!("odds.html");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Match;
    use crate::scraper::archive::FileArchive;
    use tempfile::TempDir;

    #[test]
    fn test_set_entity_normalizes() {
        let mut result = ParseResult::new(DataType::Match, "0.1", &PageContext::new("M1"));
        result
            .set_entity(Match {
                code: "M1".to_string(),
                name: "5回中山2日".to_string(),
                ..Default::default()
            })
            .unwrap();

        let m = result.entity.as_ref().unwrap();
        assert_eq!((m.kai, m.place.as_str(), m.nichi), (5, "中山", 2));
    }

    #[test]
    fn test_failed_parse_is_archived_twice() {
        let tmp = TempDir::new().unwrap();
        let archive = FileArchive::new(tmp.path());
        let context = PageContext::new("pw01srl10062024050220241201/6F");

        let err = parse_and_archive::<MatchParser>(&archive, "<html><body></body></html>", &context)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ParseError>(),
            Some(ParseError::MissingNode { .. })
        ));

        assert!(tmp
            .path()
            .join("match")
            .join("pw01srl10062024050220241201_6F.html")
            .exists());
        let failed: Vec<_> = std::fs::read_dir(tmp.path().join("failed"))
            .unwrap()
            .collect();
        assert_eq!(failed.len(), 1);
    }

    #[test]
    fn test_successful_parse_carries_meta() {
        let tmp = TempDir::new().unwrap();
        let archive = FileArchive::new(tmp.path());
        let context = PageContext::new("202412");

        let result = parse_and_archive::<MonthParser>(&archive, fixtures::MONTH, &context).unwrap();
        assert_eq!(result.meta.parser, "month");
        assert_eq!(result.meta.version, "0.1");
        assert_eq!(result.meta.context, context);
        assert!(!tmp.path().join("failed").exists());
    }
}
