//! Parser for the monthly search result (list of race meetings).

use scraper::Html;
use tracing::{debug, info_span};

use super::{require_attr, select_all, PageContext, PageParser, ParseResult};
use crate::error::ParseError;
use crate::models::{DataType, Month, Reference};
use crate::scraper::extract::{element_text, extract_doaction_code};

const MATCH_LINK: &str = "div.past_result_line_unit div.link_list.multi.div3.mid.center.narrow a";

/// Parser for the year-month search result page
pub struct MonthParser;

impl PageParser for MonthParser {
    type Entity = Month;
    const KIND: DataType = DataType::Month;

    fn parse(html: &str, context: &PageContext) -> Result<ParseResult<Month>, ParseError> {
        let _span = info_span!("parse", parser = "month", code = %context.code).entered();
        let document = Html::parse_document(html);
        let root = document.root_element();
        let mut result = ParseResult::new(Self::KIND, Self::VERSION, context);

        let links = select_all(root, MATCH_LINK);
        for link in &links {
            let action = require_attr(Self::KIND, *link, MATCH_LINK, "onclick")?;
            let name = element_text(link);
            result.push_reference(Reference::action(
                DataType::Match,
                extract_doaction_code(action),
                Some(name),
                action,
            ));
        }
        debug!("Found {} matches", links.len());

        let month = Month {
            code: context.code.clone(),
            number_of_matches: links.len(),
            ..Default::default()
        };

        result.set_entity(month)?;
        Ok(result)
    }
}
