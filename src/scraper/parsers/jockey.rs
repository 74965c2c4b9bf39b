//! Jockey profile and results-by-year parsers.
//!
//! The summary table reader here is shared with the trainer pages, which use
//! the same table layout.

use scraper::{ElementRef, Html};
use tracing::{debug, info_span};

use super::{
    non_empty, require, select_all, select_first, text_of, PageContext, PageParser, ParseResult,
};
use crate::error::ParseError;
use crate::models::{DataType, Jockey, Reference, Summary, SummaryPeriod};
use crate::scraper::extract::{
    element_text, extract_doaction_code, parse_float, parse_int, parse_jp_date,
};

pub(crate) const HEADER: &str = "div.header_line.no-mb span.txt";
pub(crate) const SUMMARY_LINK: &str = "a[onclick]";
pub(crate) const SUMMARY_LINK_TEXT: &str = "年度別成績";
pub(crate) const HISTORY_TABLES: &str = "table.basic.narrow.mt15, table.basic.narrow.mt40";

/// Counts occupy the first seven cells, rates the next three
const SUMMARY_CELLS: usize = 10;
const RATE_TOLERANCE: f64 = 0.001;

/// Labels of the profile block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProfileLabel {
    BirthDate,
    Height,
    Weight,
    BloodType,
    FirstLicenseYear,
    LicenseType,
    Birthplace,
    Affiliation,
    Stable,
    FirstRide,
    FirstWin,
}

impl ProfileLabel {
    fn from_label(label: &str) -> Option<Self> {
        match label {
            "生年月日" => Some(Self::BirthDate),
            "身長" => Some(Self::Height),
            "体重" => Some(Self::Weight),
            "血液型" => Some(Self::BloodType),
            "初免許年" => Some(Self::FirstLicenseYear),
            "免許種類" => Some(Self::LicenseType),
            "出身地" => Some(Self::Birthplace),
            "所属" => Some(Self::Affiliation),
            "所属厩舎" => Some(Self::Stable),
            "初騎乗" => Some(Self::FirstRide),
            "初勝利" => Some(Self::FirstWin),
            _ => None,
        }
    }
}

/// Split the page heading into name and kana
pub(crate) fn parse_person_header(header: ElementRef, prefix: &str) -> (String, Option<String>) {
    let kana = text_of(header, "span.kana");
    let mut name = element_text(&header).replace(prefix, "");
    if let Some(kana) = &kana {
        name = name.replace(kana.as_str(), "");
    }
    let kana = kana.map(|k| k.replace(['（', '）'], ""));
    (name.trim().to_string(), kana.and_then(non_empty))
}

/// Reference to the results-by-year page linked from a profile page
pub(crate) fn find_summary_link(
    page: DataType,
    root: ElementRef,
    target: DataType,
) -> Result<Reference, ParseError> {
    select_all(root, SUMMARY_LINK)
        .into_iter()
        .find(|a| element_text(a).contains(SUMMARY_LINK_TEXT))
        .and_then(|a| {
            let action = a.value().attr("onclick")?;
            Some(Reference::action(
                target,
                extract_doaction_code(action),
                Some(element_text(&a)),
                action,
            ))
        })
        .ok_or(ParseError::MissingNode {
            page,
            selector: SUMMARY_LINK,
        })
}

/// Read one summary table: the title comes from `div.main`, each row with a
/// `th[scope=row]` label becomes one summary.
pub(crate) fn read_summary_table(
    page: DataType,
    table: ElementRef,
    owner_kind: DataType,
    owner_code: &str,
    period: SummaryPeriod,
) -> Result<Vec<Summary>, ParseError> {
    let title = text_of(table, "div.main").unwrap_or_default();
    let mut summaries = Vec::new();

    for row in select_all(table, "tr") {
        let Some(label) = select_first(row, "th[scope='row']") else {
            continue;
        };
        let cells: Vec<String> = select_all(row, "td").iter().map(element_text).collect();
        if cells.len() < SUMMARY_CELLS {
            return Err(ParseError::InvalidField {
                page,
                field: "summary row",
                text: element_text(&row),
            });
        }
        let count = |i: usize| {
            parse_int(&cells[i]).ok_or_else(|| ParseError::InvalidField {
                page,
                field: "summary count",
                text: cells[i].clone(),
            })
        };

        let summary = Summary {
            owner_kind,
            owner_code: owner_code.to_string(),
            period,
            title: title.clone(),
            kind: element_text(&label),
            places: [count(0)?, count(1)?, count(2)?, count(3)?, count(4)?],
            off_board: count(5)?,
            runs: count(6)?,
            win_rate: parse_float(&cells[7]),
            top2_rate: parse_float(&cells[8]),
            top3_rate: parse_float(&cells[9]),
        };
        if !summary.rates_consistent(RATE_TOLERANCE) {
            debug!(
                title = %summary.title,
                kind = %summary.kind,
                "Published rates diverge from counts"
            );
        }
        summaries.push(summary);
    }

    Ok(summaries)
}

/// Summary block with the given id, if the page carries it
pub(crate) fn read_record_block(
    page: DataType,
    root: ElementRef,
    css: &str,
    owner_code: &str,
    period: SummaryPeriod,
) -> Result<Vec<Summary>, ParseError> {
    match select_first(root, css) {
        Some(block) => read_summary_table(page, block, page, owner_code, period),
        None => {
            debug!("No {} block", css);
            Ok(Vec::new())
        }
    }
}

/// Read every results-by-year table of a history page
pub(crate) fn read_history_tables(
    page: DataType,
    owner_kind: DataType,
    html: &str,
    owner_code: &str,
) -> Result<Vec<Summary>, ParseError> {
    let document = Html::parse_document(html);
    let mut history = Vec::new();
    for table in select_all(document.root_element(), HISTORY_TABLES) {
        history.extend(read_summary_table(
            page,
            table,
            owner_kind,
            owner_code,
            SummaryPeriod::Past,
        )?);
    }
    Ok(history)
}

/// Parser for jockey profile pages
pub struct JockeyParser;

impl JockeyParser {
    fn parse_profile(root: ElementRef, jockey: &mut Jockey) {
        for term in select_all(root, "div.main.mt15 div.profile div.data dl") {
            let (Some(label), Some(dd)) = (text_of(term, "dt"), select_first(term, "dd")) else {
                continue;
            };
            let value = element_text(&dd);
            let unit = text_of(dd, "span.unit");
            let measure = || parse_float(&value.replace(unit.as_deref().unwrap_or(""), ""));

            match ProfileLabel::from_label(&label) {
                Some(ProfileLabel::BirthDate) => jockey.birth_date = parse_jp_date(&value),
                Some(ProfileLabel::Height) => {
                    jockey.height = measure();
                    jockey.height_unit = unit.clone();
                }
                Some(ProfileLabel::Weight) => {
                    jockey.weight = measure();
                    jockey.weight_unit = unit.clone();
                }
                Some(ProfileLabel::BloodType) => jockey.blood_type = non_empty(value),
                Some(ProfileLabel::FirstLicenseYear) => {
                    jockey.first_license_year = parse_int(&value.replace('年', ""))
                }
                Some(ProfileLabel::LicenseType) => jockey.license_type = non_empty(value),
                Some(ProfileLabel::Birthplace) => jockey.birthplace = non_empty(value),
                Some(ProfileLabel::Affiliation) => jockey.affiliation = non_empty(value),
                Some(ProfileLabel::Stable) => jockey.stable = non_empty(value),
                Some(ProfileLabel::FirstRide) => jockey.first_ride = non_empty(value),
                Some(ProfileLabel::FirstWin) => jockey.first_win = non_empty(value),
                None => debug!("Skipping profile label {}", label),
            }
        }
    }
}

impl PageParser for JockeyParser {
    type Entity = Jockey;
    const KIND: DataType = DataType::Jockey;

    fn parse(html: &str, context: &PageContext) -> Result<ParseResult<Jockey>, ParseError> {
        let _span = info_span!("parse", parser = "jockey", code = %context.code).entered();
        let document = Html::parse_document(html);
        let root = document.root_element();
        let mut result = ParseResult::new(Self::KIND, Self::VERSION, context);

        let (name, kana) = parse_person_header(require(Self::KIND, root, HEADER)?, "騎手情報");
        let mut jockey = Jockey {
            code: context.code.clone(),
            name,
            kana,
            ..Default::default()
        };
        Self::parse_profile(root, &mut jockey);

        jockey.this_year = read_record_block(
            Self::KIND,
            root,
            "#year_record",
            &context.code,
            SummaryPeriod::ThisYear,
        )?;
        jockey.total = read_record_block(
            Self::KIND,
            root,
            "#total_record",
            &context.code,
            SummaryPeriod::Total,
        )?;

        result.push_reference(find_summary_link(
            Self::KIND,
            root,
            DataType::JockeySummary,
        )?);
        result.set_entity(jockey)?;
        Ok(result)
    }
}

/// Parser for a jockey's results-by-year page.
///
/// The owning jockey's code is taken from the context's father code.
pub struct JockeySummaryParser;

impl PageParser for JockeySummaryParser {
    type Entity = Jockey;
    const KIND: DataType = DataType::JockeySummary;

    fn parse(html: &str, context: &PageContext) -> Result<ParseResult<Jockey>, ParseError> {
        let _span = info_span!("parse", parser = "jockey_summary", code = %context.code).entered();
        let mut result = ParseResult::new(Self::KIND, Self::VERSION, context);
        let owner = context.father_code.as_deref().unwrap_or(&context.code);
        result.history = read_history_tables(Self::KIND, DataType::Jockey, html, owner)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Target;
    use crate::scraper::parsers::fixtures;
    use chrono::NaiveDate;

    fn parse_fixture() -> ParseResult<Jockey> {
        JockeyParser::parse(fixtures::JOCKEY, &PageContext::new("pw04kmk001122/66")).unwrap()
    }

    #[test]
    fn test_parse_jockey_profile() {
        let result = parse_fixture();
        let jockey = result.entity.as_ref().unwrap();

        assert_eq!(jockey.name, "三浦 皇成");
        assert_eq!(jockey.kana.as_deref(), Some("ミウラ コウセイ"));
        assert_eq!(jockey.birth_date, NaiveDate::from_ymd_opt(1989, 12, 19));
        assert_eq!(jockey.height, Some(161.0));
        assert_eq!(jockey.height_unit.as_deref(), Some("センチメートル"));
        assert_eq!(jockey.weight, Some(49.6));
        assert_eq!(jockey.weight_unit.as_deref(), Some("キログラム"));
        assert_eq!(jockey.blood_type.as_deref(), Some("A"));
        assert_eq!(jockey.first_license_year, Some(2008));
        assert_eq!(jockey.license_type.as_deref(), Some("平地"));
        assert_eq!(jockey.birthplace.as_deref(), Some("東京都"));
        assert_eq!(jockey.affiliation.as_deref(), Some("美浦"));
        assert_eq!(jockey.stable.as_deref(), Some("フリー"));
        assert_eq!(jockey.first_ride.as_deref(), Some("2008年3月1日 1回中山1日 1R"));
        assert!(jockey.first_win.is_some());
    }

    #[test]
    fn test_parse_jockey_summaries() {
        let result = parse_fixture();
        let jockey = result.entity.as_ref().unwrap();

        assert_eq!(jockey.this_year.len(), 2);
        let flat = &jockey.this_year[0];
        assert_eq!(flat.title, "本年成績");
        assert_eq!(flat.kind, "平地");
        assert_eq!(flat.period, SummaryPeriod::ThisYear);
        assert_eq!(flat.places, [60, 50, 40, 30, 30]);
        assert_eq!(flat.off_board, 290);
        assert_eq!(flat.runs, 500);
        assert_eq!(flat.win_rate, Some(0.12));
        assert!(flat.rates_consistent(RATE_TOLERANCE));

        let jump = &jockey.this_year[1];
        assert_eq!(jump.runs, 0);
        assert_eq!(jump.win_rate, None);

        assert_eq!(jockey.total.len(), 1);
        assert_eq!(jockey.total[0].runs, 12_000);
        assert_eq!(jockey.total[0].period, SummaryPeriod::Total);
        assert!(jockey.history.is_empty());
    }

    #[test]
    fn test_summary_link() {
        let result = parse_fixture();
        let links = result.references(DataType::JockeySummary);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].code.as_deref(), Some("pw04kmk101122/A6"));
        assert!(matches!(&links[0].target, Target::Action(a) if a.starts_with("return doAction")));
    }

    #[test]
    fn test_summary_link_required() {
        let html = fixtures::JOCKEY.replace(SUMMARY_LINK_TEXT, "成績");
        let err = JockeyParser::parse(&html, &PageContext::new("J1")).unwrap_err();
        assert!(matches!(err, ParseError::MissingNode { selector: SUMMARY_LINK, .. }));
    }

    #[test]
    fn test_parse_jockey_history() {
        let context = PageContext::new("pw04kmk101122/A6").with_father("pw04kmk001122/66");
        let result = JockeySummaryParser::parse(fixtures::JOCKEY_SUMMARY, &context).unwrap();

        assert!(result.entity.is_none());
        assert_eq!(result.history.len(), 3);
        assert_eq!(result.history[0].title, "2024年");
        assert_eq!(result.history[2].title, "2023年");
        assert_eq!(result.history[2].places, [65, 55, 45, 40, 35]);
        assert!(result
            .history
            .iter()
            .all(|s| s.owner_code == "pw04kmk001122/66"
                && s.owner_kind == DataType::Jockey
                && s.period == SummaryPeriod::Past));

        let jockey = Jockey::default().with_history(result.history);
        assert_eq!(jockey.summaries().count(), 3);
    }

    #[test]
    fn test_short_summary_row() {
        let html = r#"<html><body><table class="basic narrow mt15">
            <caption><div class="main">2024年</div></caption>
            <tbody><tr><th scope="row">平地</th><td>1</td><td>2</td></tr></tbody>
            </table></body></html>"#;
        let err =
            JockeySummaryParser::parse(html, &PageContext::new("S1").with_father("J1")).unwrap_err();
        assert!(matches!(err, ParseError::InvalidField { field: "summary row", .. }));
    }

    #[test]
    fn test_unreadable_summary_count() {
        let html = fixtures::JOCKEY_SUMMARY.replacen("<td>70</td>", "<td>-</td>", 1);
        let err = JockeySummaryParser::parse(&html, &PageContext::new("S1").with_father("J1"))
            .unwrap_err();
        assert!(matches!(
            err,
            ParseError::InvalidField { field: "summary count", ref text, .. } if text == "-"
        ));
    }
}
