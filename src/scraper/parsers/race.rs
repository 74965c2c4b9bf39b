//! Parser for a race result page.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html};
use tracing::{debug, info_span};

use super::{
    non_empty, require, select_all, select_first, text_of, PageContext, PageParser, ParseResult,
};
use crate::error::ParseError;
use crate::models::{DataType, Prize, Race, RaceResult, Reference};
use crate::scraper::extract::{
    element_text, extract_cname_code, extract_doaction_code, own_text, parse_float, parse_int,
    parse_jp_date, parse_jp_time, parse_minsec, strip_brackets,
};

static DIGITS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

const HEADER: &str = "div.race_header";
const RESULT_ROW: &str = "table.basic.narrow-xy.striped tbody tr";
const NUM: &str = "td.num";
const MARGIN: &str = "td.margin";

/// Parser for race result pages
pub struct RaceParser;

/// References collected while reading the result table
#[derive(Default)]
struct RowLinks {
    horse: Option<Reference>,
    jockey: Option<Reference>,
    trainer: Option<Reference>,
}

impl RaceParser {
    fn parse_prizes(header: ElementRef) -> Vec<Prize> {
        select_all(header, "ul.prize div.prize_unit")
            .into_iter()
            .map(|unit_block| {
                let unit = text_of(unit_block, "span.unit").unwrap_or_default();
                let name = text_of(unit_block, "div.cell.cap")
                    .unwrap_or_default()
                    .replace(&unit, "");
                let amounts = select_all(unit_block, "span.num")
                    .iter()
                    .map(|num| parse_float(&element_text(num)))
                    .collect();
                Prize {
                    name,
                    unit: strip_brackets(&unit),
                    amounts,
                }
            })
            .collect()
    }

    /// `枠1白` -> (1, "白")
    fn parse_gate(alt: &str) -> (Option<i32>, Option<String>) {
        match DIGITS_RE.find(alt) {
            Some(digits) => {
                let color = alt.replace('枠', "").replace(digits.as_str(), "");
                (parse_int(digits.as_str()), non_empty(color))
            }
            None => (None, None),
        }
    }

    /// Body weight is the cell's own text, the change sits in a child span
    fn parse_body_weight(cell: ElementRef) -> (Option<i32>, Option<i32>) {
        let weight = parse_int(&own_text(&cell));
        let delta = cell
            .children()
            .filter_map(ElementRef::wrap)
            .next()
            .and_then(|span| parse_int(&strip_brackets(&element_text(&span))));
        (weight, delta)
    }

    fn parse_row(
        row: ElementRef,
        context: &PageContext,
    ) -> Result<(RaceResult, RowLinks), ParseError> {
        let mut links = RowLinks::default();

        let num_text = element_text(&require(Self::KIND, row, NUM)?);
        let num = parse_int(&num_text).ok_or(ParseError::InvalidField {
            page: Self::KIND,
            field: "starting number",
            text: num_text,
        })?;
        let margin = element_text(&require(Self::KIND, row, MARGIN)?);

        let (gate, gate_color) = select_first(row, "td.waku img[alt]")
            .and_then(|img| img.value().attr("alt"))
            .map(Self::parse_gate)
            .unwrap_or((None, None));

        let horse_link = select_first(row, "td.horse a");
        let horse_name = horse_link.map(|a| element_text(&a)).unwrap_or_default();
        let horse_code = horse_link
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| {
                let code = extract_cname_code(href);
                links.horse = Some(Reference::link(
                    DataType::Horse,
                    code.clone(),
                    Some(horse_name.clone()),
                    href,
                ));
                code
            });

        let jockey_link = select_first(row, "td.jockey a");
        let jockey_name = jockey_link.map(|a| element_text(&a)).unwrap_or_default();
        let jockey_code = jockey_link
            .and_then(|a| a.value().attr("onclick"))
            .and_then(|onclick| {
                let code = extract_doaction_code(onclick);
                links.jockey = Some(Reference::action(
                    DataType::Jockey,
                    code.clone(),
                    Some(jockey_name.clone()),
                    onclick,
                ));
                code
            });

        let trainer_link = select_first(row, "td.trainer a");
        let trainer_name = trainer_link.map(|a| element_text(&a)).unwrap_or_default();
        let trainer_code = trainer_link
            .and_then(|a| a.value().attr("onclick"))
            .and_then(|onclick| {
                let code = extract_doaction_code(onclick);
                links.trainer = Some(Reference::action(
                    DataType::Trainer,
                    code.clone(),
                    Some(trainer_name.clone()),
                    onclick,
                ));
                code
            });

        let (body_weight, body_weight_delta) = select_first(row, "td.h_weight")
            .map(Self::parse_body_weight)
            .unwrap_or((None, None));

        let result = RaceResult {
            race_code: context.code.clone(),
            order_text: text_of(row, "td.place").unwrap_or_default(),
            gate,
            gate_color,
            num,
            horse_code,
            horse_name,
            horse_icon: select_first(row, "td.horse span.horse_icon img[alt]")
                .and_then(|img| img.value().attr("alt"))
                .map(str::to_string),
            blinker: select_first(row, "td.horse div.icon.blinker").is_some(),
            sex_age: text_of(row, "td.age").unwrap_or_default(),
            carried_weight: text_of(row, "td.weight").and_then(|t| parse_float(&t)),
            jockey_code,
            jockey_name,
            time: text_of(row, "td.time").and_then(|t| parse_minsec(&t)),
            margin,
            corners_raw: select_all(row, "div.corner_list li")
                .iter()
                .map(|li| parse_int(&element_text(li)))
                .collect(),
            final_furlong: text_of(row, "td.f_time").and_then(|t| parse_float(&t)),
            body_weight,
            body_weight_delta,
            trainer_code,
            trainer_name,
            popularity: text_of(row, "td.pop").and_then(|t| parse_int(&t)),
            ..Default::default()
        };

        Ok((result, links))
    }
}

impl PageParser for RaceParser {
    type Entity = Race;
    const KIND: DataType = DataType::Race;

    fn parse(html: &str, context: &PageContext) -> Result<ParseResult<Race>, ParseError> {
        let _span = info_span!("parse", parser = "race", code = %context.code).entered();
        let document = Html::parse_document(html);
        let root = document.root_element();
        let mut result = ParseResult::new(Self::KIND, Self::VERSION, context);

        let header = require(Self::KIND, root, HEADER)?;
        let name = context.name.clone().unwrap_or_default();

        let date = text_of(header, "div.date_line div.cell.date")
            .and_then(|t| parse_jp_date(t.split('（').next().unwrap_or("")));
        let start_time =
            text_of(header, "div.date_line div.cell.time strong").and_then(|t| parse_jp_time(&t));

        let index = select_first(header, "div.race_title div.race_number img[alt]")
            .and_then(|img| img.value().attr("alt"))
            .and_then(|alt| parse_int(&alt.replace("レース", "")));
        let title = text_of(header, "div.race_title span.race_name")
            .filter(|title| *title != name)
            .unwrap_or_default();

        let course = select_first(header, "div.race_title div.cell.course");
        let course_detail = course
            .and_then(|cell| text_of(cell, "span.detail"))
            .map(|detail| strip_brackets(&detail));
        let surface = course_detail
            .as_ref()
            .and_then(|detail| detail.split('・').next())
            .map(str::to_string);

        let mut race = Race {
            code: context.code.clone(),
            match_code: context.father_code.clone(),
            name,
            title,
            index,
            date,
            start_time,
            weather: text_of(header, "li.weather span.txt"),
            turf_condition: text_of(header, "li.turf span.txt"),
            dirt_condition: text_of(header, "li.durt span.txt"),
            category: text_of(header, "div.race_title div.cell.category"),
            class: text_of(header, "div.race_title div.cell.class"),
            rule: text_of(header, "div.race_title div.cell.rule"),
            weight_rule: text_of(header, "div.race_title div.cell.weight"),
            course_detail,
            surface,
            distance: course.and_then(|cell| parse_int(&own_text(&cell))),
            distance_unit: course.and_then(|cell| text_of(cell, "span.unit")),
            prizes: Self::parse_prizes(header),
            ..Default::default()
        };

        for row in select_all(root, RESULT_ROW) {
            let (row_result, links) = Self::parse_row(row, context)?;
            race.results.push(row_result);
            for reference in [links.horse, links.jockey, links.trainer].into_iter().flatten() {
                result.push_reference(reference);
            }
        }
        debug!("Parsed {} result rows", race.results.len());

        result.set_entity(race)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::extract::ORDER_WITHDRAWN;
    use crate::scraper::parsers::fixtures;
    use chrono::{NaiveDate, NaiveTime};

    fn context() -> PageContext {
        PageContext::new("pw01sde1006202405020120241201/2A")
            .with_name(Some("2歳未勝利".into()))
            .with_father("pw01srl10062024050220241201/6F")
    }

    fn parse_fixture() -> ParseResult<Race> {
        RaceParser::parse(fixtures::RACE, &context()).unwrap()
    }

    #[test]
    fn test_parse_race_header() {
        let result = parse_fixture();
        let race = result.entity.as_ref().unwrap();

        assert_eq!(race.code, "pw01sde1006202405020120241201/2A");
        assert_eq!(race.match_code.as_deref(), Some("pw01srl10062024050220241201/6F"));
        assert_eq!(race.name, "2歳未勝利");
        assert_eq!(race.title, "メイクデビュー中山");
        assert_eq!(race.index, Some(1));
        assert_eq!(race.date, NaiveDate::from_ymd_opt(2024, 12, 1));
        assert_eq!(race.start_time, NaiveTime::from_hms_opt(10, 5, 0));
        assert_eq!(race.weather.as_deref(), Some("晴"));
        assert_eq!(race.turf_condition.as_deref(), Some("良"));
        assert_eq!(race.dirt_condition.as_deref(), Some("稍重"));
        assert_eq!(race.category.as_deref(), Some("2歳"));
        assert_eq!(race.class.as_deref(), Some("未勝利"));
        assert_eq!(race.rule.as_deref(), Some("（混合）［指定］"));
        assert_eq!(race.weight_rule.as_deref(), Some("馬齢"));
        assert_eq!(race.course_detail.as_deref(), Some("芝・右・外"));
        assert_eq!(race.surface.as_deref(), Some("芝"));
        assert_eq!(race.distance, Some(1200));
        assert_eq!(race.distance_unit.as_deref(), Some("メートル"));
    }

    #[test]
    fn test_parse_race_prizes() {
        let result = parse_fixture();
        let race = result.entity.as_ref().unwrap();

        assert_eq!(race.prizes.len(), 2);
        assert_eq!(race.prizes[0].name, "本賞金");
        assert_eq!(race.prizes[0].unit, "万円");
        assert_eq!(race.prizes[1].amounts, vec![Some(10.5), Some(3.0)]);
        assert_eq!(race.prize_unit.as_deref(), Some("万円"));
        assert_eq!(race.prize_totals, [560.5, 223.0, 140.0, 83.0, 55.0]);
    }

    #[test]
    fn test_blank_prize_cell_keeps_rank() {
        let html = fixtures::RACE.replace(
            r#"<li><span class="num">220</span></li>"#,
            r#"<li><span class="num"></span></li>"#,
        );
        let result = RaceParser::parse(&html, &context()).unwrap();
        let race = result.entity.as_ref().unwrap();

        assert_eq!(
            race.prizes[0].amounts,
            vec![Some(550.0), None, Some(140.0), Some(83.0), Some(55.0)]
        );
        assert_eq!(race.prize_totals, [560.5, 3.0, 140.0, 83.0, 55.0]);
    }

    #[test]
    fn test_parse_race_results() {
        let result = parse_fixture();
        let race = result.entity.as_ref().unwrap();
        assert_eq!(race.number_of_horses, 3);
        assert_eq!(race.max_corners, 2);

        let first = &race.results[0];
        assert_eq!(first.arrival_order, Some(1));
        assert_eq!((first.gate, first.gate_color.as_deref()), (Some(1), Some("白")));
        assert_eq!(first.num, 1);
        assert_eq!(first.horse_code.as_deref(), Some("pw01dud102022104401/B0"));
        assert_eq!(first.horse_name, "サンプルホース");
        assert_eq!((first.sex.as_str(), first.age), ("牝", 2));
        assert_eq!(first.carried_weight, Some(55.0));
        assert_eq!(first.jockey_code.as_deref(), Some("pw04kmk001122/66"));
        assert_eq!(first.time, Some(69.8));
        assert_eq!(first.margin, "");
        assert_eq!(first.corners, [2, 2, 0, 0]);
        assert_eq!(first.final_furlong, Some(34.9));
        assert_eq!((first.body_weight, first.body_weight_delta), (Some(448), Some(4)));
        assert_eq!(first.trainer_code.as_deref(), Some("pw05cmk001088/7B"));
        assert_eq!(first.popularity, Some(1));
        assert!(!first.blinker);
        assert_eq!(first.horse_icon, None);

        let second = &race.results[1];
        assert!(second.blinker);
        assert_eq!(second.horse_icon.as_deref(), Some("マル外"));
        assert_eq!((second.sex.as_str(), second.age), ("せん", 2));
        assert_eq!(second.margin, "1.3/4");
        assert_eq!(second.body_weight_delta, Some(-2));

        let scratched = &race.results[2];
        assert_eq!(scratched.arrival_order, Some(ORDER_WITHDRAWN));
        assert_eq!(scratched.time, None);
        assert_eq!(scratched.corners_raw, vec![None, None]);
        assert_eq!(scratched.corners, [0, 0, 0, 0]);
        assert_eq!((scratched.body_weight, scratched.body_weight_delta), (None, None));
        assert_eq!(scratched.popularity, None);
    }

    #[test]
    fn test_parse_race_references() {
        let result = parse_fixture();
        assert_eq!(result.references(DataType::Horse).len(), 3);
        assert_eq!(result.references(DataType::Jockey).len(), 3);

        // two starters share one trainer; references are not deduplicated
        let trainers = result.references(DataType::Trainer);
        assert_eq!(trainers.len(), 3);
        assert_eq!(trainers[0].code, trainers[1].code);
        assert_eq!(trainers[2].name.as_deref(), Some("木村 哲也"));
    }

    #[test]
    fn test_missing_margin_is_fatal() {
        let html = fixtures::RACE.replace("<td class=\"margin\">1.3/4</td>", "");
        let err = RaceParser::parse(&html, &context()).unwrap_err();
        assert!(matches!(err, ParseError::MissingNode { selector: MARGIN, .. }));
    }

    #[test]
    fn test_title_equal_to_name_is_cleared() {
        let ctx = context().with_name(Some("メイクデビュー中山".into()));
        let result = RaceParser::parse(fixtures::RACE, &ctx).unwrap();
        assert_eq!(result.entity.unwrap().title, "");
    }

    #[test]
    fn test_parse_gate() {
        assert_eq!(RaceParser::parse_gate("枠8桃"), (Some(8), Some("桃".to_string())));
        assert_eq!(RaceParser::parse_gate("なし"), (None, None));
    }
}
