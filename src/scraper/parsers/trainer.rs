//! Trainer profile and results-by-year parsers.

use scraper::{ElementRef, Html};
use tracing::{debug, info_span};

use super::jockey::{
    find_summary_link, parse_person_header, read_history_tables, read_record_block, HEADER,
};
use super::{non_empty, require, select_all, text_of, PageContext, PageParser, ParseResult};
use crate::error::ParseError;
use crate::models::{DataType, SummaryPeriod, Trainer};
use crate::scraper::extract::{parse_int, parse_jp_date};

/// Labels of the profile block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProfileLabel {
    BirthDate,
    Birthplace,
    LicenseYear,
    Affiliation,
    FirstStart,
    FirstWin,
}

impl ProfileLabel {
    fn from_label(label: &str) -> Option<Self> {
        match label {
            "生年月日" => Some(Self::BirthDate),
            "出身地" => Some(Self::Birthplace),
            "免許取得年" => Some(Self::LicenseYear),
            "所属" => Some(Self::Affiliation),
            "初出走" => Some(Self::FirstStart),
            "初勝利" => Some(Self::FirstWin),
            _ => None,
        }
    }
}

/// Parser for trainer profile pages
pub struct TrainerParser;

impl TrainerParser {
    fn parse_profile(root: ElementRef, trainer: &mut Trainer) {
        for term in select_all(root, "div.main.mt15 div.profile div.data dl") {
            let (Some(label), Some(value)) = (text_of(term, "dt"), text_of(term, "dd")) else {
                continue;
            };

            match ProfileLabel::from_label(&label) {
                Some(ProfileLabel::BirthDate) => trainer.birth_date = parse_jp_date(&value),
                Some(ProfileLabel::Birthplace) => trainer.birthplace = non_empty(value),
                Some(ProfileLabel::LicenseYear) => {
                    trainer.license_year = parse_int(&value.replace('年', ""))
                }
                Some(ProfileLabel::Affiliation) => trainer.affiliation = non_empty(value),
                Some(ProfileLabel::FirstStart) => trainer.first_start = non_empty(value),
                Some(ProfileLabel::FirstWin) => trainer.first_win = non_empty(value),
                None => debug!("Skipping profile label {}", label),
            }
        }
    }
}

impl PageParser for TrainerParser {
    type Entity = Trainer;
    const KIND: DataType = DataType::Trainer;

    fn parse(html: &str, context: &PageContext) -> Result<ParseResult<Trainer>, ParseError> {
        let _span = info_span!("parse", parser = "trainer", code = %context.code).entered();
        let document = Html::parse_document(html);
        let root = document.root_element();
        let mut result = ParseResult::new(Self::KIND, Self::VERSION, context);

        let (name, kana) = parse_person_header(require(Self::KIND, root, HEADER)?, "調教師情報");
        let mut trainer = Trainer {
            code: context.code.clone(),
            name,
            kana,
            ..Default::default()
        };
        Self::parse_profile(root, &mut trainer);

        trainer.this_year = read_record_block(
            Self::KIND,
            root,
            "#year_record",
            &context.code,
            SummaryPeriod::ThisYear,
        )?;
        trainer.total = read_record_block(
            Self::KIND,
            root,
            "#total_record",
            &context.code,
            SummaryPeriod::Total,
        )?;

        result.push_reference(find_summary_link(
            Self::KIND,
            root,
            DataType::TrainerSummary,
        )?);
        debug!(
            "Parsed {} summary rows",
            trainer.this_year.len() + trainer.total.len()
        );
        result.set_entity(trainer)?;
        Ok(result)
    }
}

/// Parser for a trainer's results-by-year page
pub struct TrainerSummaryParser;

impl PageParser for TrainerSummaryParser {
    type Entity = Trainer;
    const KIND: DataType = DataType::TrainerSummary;

    fn parse(html: &str, context: &PageContext) -> Result<ParseResult<Trainer>, ParseError> {
        let _span =
            info_span!("parse", parser = "trainer_summary", code = %context.code).entered();
        let mut result = ParseResult::new(Self::KIND, Self::VERSION, context);
        let owner = context.father_code.as_deref().unwrap_or(&context.code);
        result.history = read_history_tables(Self::KIND, DataType::Trainer, html, owner)?;
        Ok(result)
    }
}
