//! Win-odds (単勝) sheet parser.

use scraper::Html;
use tracing::{debug, info_span};

use super::{require, select_all, text_of, PageContext, PageParser, ParseResult};
use crate::error::ParseError;
use crate::models::{DataType, OddsSheet};
use crate::scraper::extract::{element_text, parse_float, parse_int};

const ODDS_BODY: &str = "table.basic.narrow-xy.tanpuku tbody";
const NUM: &str = "td.num";

/// Parser for win-odds pages.
///
/// Scratched starters carry a marker instead of odds and map to `None`.
pub struct OddsParser;

impl PageParser for OddsParser {
    type Entity = OddsSheet;
    const KIND: DataType = DataType::OddsTan;

    fn parse(html: &str, context: &PageContext) -> Result<ParseResult<OddsSheet>, ParseError> {
        let _span = info_span!("parse", parser = "odds_tan", code = %context.code).entered();
        let document = Html::parse_document(html);
        let root = document.root_element();
        let mut result = ParseResult::new(Self::KIND, Self::VERSION, context);

        let body = require(Self::KIND, root, ODDS_BODY)?;
        let mut sheet = OddsSheet {
            code: context.code.clone(),
            race_code: context.father_code.clone(),
            ..Default::default()
        };

        for row in select_all(body, "tr") {
            let num_text = element_text(&require(Self::KIND, row, NUM)?);
            let num = parse_int(&num_text).ok_or(ParseError::InvalidField {
                page: Self::KIND,
                field: "starting number",
                text: num_text,
            })?;
            let odds = text_of(row, "td.odds_tan").and_then(|t| parse_float(&t));
            sheet.odds.insert(num, odds);
        }
        debug!("Parsed odds for {} starters", sheet.odds.len());

        result.set_entity(sheet)?;
        Ok(result)
    }
}
