//! Parser for a meeting page (list of races of one day at one course).

use scraper::Html;
use tracing::{debug, info_span};

use super::{require, require_attr, select_all, PageContext, PageParser, ParseResult};
use crate::error::ParseError;
use crate::models::{DataType, Match, Reference};
use crate::scraper::extract::{
    element_text, extract_cname_code, extract_doaction_code, parse_jp_date,
};

const HEADER: &str = "table.basic.mt20 div.main";
const RACE_ROW: &str = "tbody tr";
const RACE_LINK: &str = "th.race_num a";
const RACE_NAME: &str = "td.race_name";
const ODDS_LINK: &str = "td.odds a";

/// Parser for a meeting page
pub struct MatchParser;

impl MatchParser {
    /// Split `2024年12月1日（日曜）5回中山2日` into date text and meeting name
    fn split_header(text: &str) -> (&str, &str) {
        let date = text.split('（').next().unwrap_or("").trim();
        let name = text.rsplit('）').next().unwrap_or("").trim();
        (date, name)
    }
}

impl PageParser for MatchParser {
    type Entity = Match;
    const KIND: DataType = DataType::Match;

    fn parse(html: &str, context: &PageContext) -> Result<ParseResult<Match>, ParseError> {
        let _span = info_span!("parse", parser = "match", code = %context.code).entered();
        let document = Html::parse_document(html);
        let root = document.root_element();
        let mut result = ParseResult::new(Self::KIND, Self::VERSION, context);

        let header = element_text(&require(Self::KIND, root, HEADER)?);
        let (date_text, name) = Self::split_header(&header);

        let rows = select_all(root, RACE_ROW);
        for row in &rows {
            let race_name = element_text(&require(Self::KIND, *row, RACE_NAME)?);

            let race_link = require(Self::KIND, *row, RACE_LINK)?;
            let href = require_attr(Self::KIND, race_link, RACE_LINK, "href")?;
            result.push_reference(Reference::link(
                DataType::Race,
                extract_cname_code(href),
                Some(race_name.clone()),
                href,
            ));

            let odds_link = require(Self::KIND, *row, ODDS_LINK)?;
            let action = require_attr(Self::KIND, odds_link, ODDS_LINK, "onclick")?;
            result.push_reference(Reference::action(
                DataType::OddsTan,
                extract_doaction_code(action),
                Some(race_name),
                action,
            ));
        }
        debug!("Found {} races", rows.len());

        let the_match = Match {
            code: context.code.clone(),
            name: if name.is_empty() {
                context.name.clone().unwrap_or_default()
            } else {
                name.to_string()
            },
            date: parse_jp_date(date_text),
            number_of_races: rows.len(),
            ..Default::default()
        };

        result.set_entity(the_match)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Target;
    use crate::scraper::parsers::fixtures;
    use chrono::NaiveDate;

    fn context() -> PageContext {
        PageContext::new("pw01srl10062024050220241201/6F").with_name(Some("5回中山2日".into()))
    }

    #[test]
    fn test_split_header() {
        assert_eq!(
            MatchParser::split_header("2024年12月1日（日曜）5回中山2日"),
            ("2024年12月1日", "5回中山2日")
        );
    }

    #[test]
    fn test_parse_match() {
        let result = MatchParser::parse(fixtures::MATCH, &context()).unwrap();
        let m = result.entity.as_ref().unwrap();

        assert_eq!(m.name, "5回中山2日");
        assert_eq!(m.date, NaiveDate::from_ymd_opt(2024, 12, 1));
        assert_eq!((m.kai, m.place.as_str(), m.nichi), (5, "中山", 2));
        assert_eq!(m.number_of_races, 2);
    }

    #[test]
    fn test_race_and_odds_references_align() {
        let result = MatchParser::parse(fixtures::MATCH, &context()).unwrap();
        let races = result.references(DataType::Race);
        let odds = result.references(DataType::OddsTan);

        assert_eq!(races.len(), 2);
        assert_eq!(odds.len(), races.len());
        assert_eq!(races[0].code.as_deref(), Some("pw01sde1006202405020120241201/2A"));
        assert_eq!(races[1].name.as_deref(), Some("2歳新馬"));
        assert!(matches!(
            &races[0].target,
            Target::Link(href) if href == "/JRADB/accessS.html?CNAME=pw01sde1006202405020120241201/2A"
        ));
        assert_eq!(odds[1].code.as_deref(), Some("pw151ou1006202405020220241201Z/CC"));
        assert_eq!(odds[1].name, races[1].name);
    }

    #[test]
    fn test_missing_header() {
        let err = MatchParser::parse("<html><body></body></html>", &context()).unwrap_err();
        assert!(matches!(err, ParseError::MissingNode { selector: HEADER, .. }));
    }
}
