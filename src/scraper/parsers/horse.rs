//! Parser for a horse detail page.

use scraper::{ElementRef, Html};
use tracing::{debug, info_span};

use super::{
    non_empty, require, select_all, select_first, text_of, PageContext, PageParser, ParseResult,
};
use crate::error::{ModelError, ParseError};
use crate::models::{DataType, Horse, HorsePrizes, HorseResult, Pedigree};
use crate::scraper::extract::{
    element_text, extract_cname_code, extract_doaction_code, own_text, parse_float, parse_int,
    parse_jp_date, parse_minsec, strip_brackets,
};

const HEADER: &str = "div.header_line.no-mb span.txt";
const NAME_EN: &str = "span.name_en";
const RESULT_TABLE: &str = "table.basic.narrow-xy.striped";
const RESULT_COLUMNS: usize = 13;

/// Labels of the profile block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProfileLabel {
    Father,
    Mother,
    MotherFather,
    MotherMother,
    Sex,
    BirthDate,
    Color,
    Owner,
    Trainer,
    Farm,
    Breeder,
}

impl ProfileLabel {
    fn from_label(label: &str) -> Option<Self> {
        match label {
            "父" => Some(Self::Father),
            "母" => Some(Self::Mother),
            "母の父" => Some(Self::MotherFather),
            "母の母" => Some(Self::MotherMother),
            "性別" => Some(Self::Sex),
            "生年月日" => Some(Self::BirthDate),
            "毛色" => Some(Self::Color),
            "馬主名" => Some(Self::Owner),
            "調教師名" => Some(Self::Trainer),
            "生産牧場" => Some(Self::Farm),
            "生産者" => Some(Self::Breeder),
            _ => None,
        }
    }
}

/// Labels of the prize block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PrizeLabel {
    Total,
    Additional,
    Local,
    Overseas,
    EarnedFlat,
    EarnedJump,
}

impl PrizeLabel {
    fn from_label(label: &str) -> Option<Self> {
        match label {
            "総賞金" => Some(Self::Total),
            "内付加賞" => Some(Self::Additional),
            "内地方賞金" => Some(Self::Local),
            "内海外賞金" => Some(Self::Overseas),
            "収得賞金（平地）" => Some(Self::EarnedFlat),
            "収得賞金（障害）" => Some(Self::EarnedJump),
            _ => None,
        }
    }
}

/// Parser for horse detail pages
pub struct HorseParser;

impl HorseParser {
    /// Ancestor cell: optional link plus name, ignoring the 産駒 block
    fn parse_pedigree(dd: ElementRef) -> Pedigree {
        let mut name = String::new();
        let mut code = None;
        for child in dd.children() {
            if let Some(text) = child.value().as_text() {
                name.push_str(text.trim());
            } else if let Some(el) = ElementRef::wrap(child) {
                if el.value().name() == "a" {
                    name.push_str(&element_text(&el));
                    code = el.value().attr("href").and_then(extract_cname_code);
                }
            }
        }
        Pedigree { code, name }
    }

    /// Trainer cell: `<a onclick=doAction(..)>name</a>（美浦）`
    fn parse_trainer(dd: ElementRef) -> (Option<String>, Option<String>, Option<String>) {
        let link = select_first(dd, "a[onclick]");
        let code = link
            .and_then(|a| a.value().attr("onclick"))
            .and_then(extract_doaction_code);
        let name = link.map(|a| element_text(&a)).or_else(|| non_empty(own_text(&dd)));
        let affiliation = if link.is_some() {
            non_empty(strip_brackets(&own_text(&dd)))
        } else {
            None
        };
        (code, name, affiliation)
    }

    fn parse_profile(root: ElementRef, horse: &mut Horse) {
        for item in select_all(root, "div.profile.mt20 li") {
            let Some(dd) = select_first(item, "dd") else {
                continue;
            };
            let value = element_text(&dd);
            let label = element_text(&item).replacen(&value, "", 1);

            match ProfileLabel::from_label(&label) {
                Some(ProfileLabel::Father) => horse.father = Some(Self::parse_pedigree(dd)),
                Some(ProfileLabel::Mother) => horse.mother = Some(Self::parse_pedigree(dd)),
                Some(ProfileLabel::MotherFather) => {
                    horse.mother_father = Some(Self::parse_pedigree(dd))
                }
                Some(ProfileLabel::MotherMother) => {
                    horse.mother_mother = Some(Self::parse_pedigree(dd))
                }
                Some(ProfileLabel::Sex) => horse.sex = non_empty(value),
                Some(ProfileLabel::BirthDate) => horse.birth_date = parse_jp_date(&value),
                Some(ProfileLabel::Color) => horse.color = non_empty(value),
                Some(ProfileLabel::Owner) => horse.owner = non_empty(value),
                Some(ProfileLabel::Trainer) => {
                    let (code, name, affiliation) = Self::parse_trainer(dd);
                    horse.trainer_code = code;
                    horse.trainer_name = name;
                    horse.trainer_affiliation = affiliation;
                }
                Some(ProfileLabel::Farm) => horse.farm = non_empty(value),
                Some(ProfileLabel::Breeder) => horse.breeder = non_empty(value),
                None => debug!("Skipping profile label {}", label),
            }
        }
    }

    fn parse_prizes(root: ElementRef, code: &str) -> Result<HorsePrizes, ModelError> {
        let mut prizes = HorsePrizes::default();
        for item in select_all(root, "div.prize.mt10 li.div2") {
            let label = text_of(item, "dt").unwrap_or_default();
            let unit = text_of(item, "dd span").unwrap_or_default();
            if unit != "円" {
                return Err(ModelError::HorsePrizeUnit {
                    horse: code.to_string(),
                    label,
                    unit,
                });
            }
            let amount = text_of(item, "dd").and_then(|t| parse_float(&t.replace(&unit, "")));

            match PrizeLabel::from_label(&label) {
                Some(PrizeLabel::Total) => prizes.total = amount,
                Some(PrizeLabel::Additional) => prizes.additional = amount,
                Some(PrizeLabel::Local) => prizes.local = amount,
                Some(PrizeLabel::Overseas) => prizes.overseas = amount,
                Some(PrizeLabel::EarnedFlat) => prizes.earned_flat = amount,
                Some(PrizeLabel::EarnedJump) => prizes.earned_jump = amount,
                None => debug!("Skipping prize label {}", label),
            }
        }
        Ok(prizes)
    }

    fn parse_result_row(row: ElementRef, code: &str) -> Result<HorseResult, ParseError> {
        let cells = select_all(row, "td");
        if cells.len() < RESULT_COLUMNS {
            return Err(ParseError::InvalidField {
                page: Self::KIND,
                field: "result row",
                text: element_text(&row),
            });
        }
        let text = |i: usize| element_text(&cells[i]);

        Ok(HorseResult {
            horse_code: code.to_string(),
            date: parse_jp_date(&text(0)),
            place: text(1),
            race_name: text(2),
            race_code: select_first(cells[2], "a[href]")
                .and_then(|a| a.value().attr("href"))
                .and_then(extract_cname_code),
            surface_distance: text(3),
            condition: text(4),
            number_of_horses: parse_int(&text(5)),
            popularity: parse_int(&text(6)),
            order_text: text(7),
            jockey_name: text(8),
            jockey_code: select_first(cells[8], "a[onclick]")
                .and_then(|a| a.value().attr("onclick"))
                .and_then(extract_doaction_code),
            carried_weight: parse_float(&text(9)),
            horse_weight: parse_float(&text(10)),
            time: parse_minsec(&text(11)),
            rt: text(12),
            ..Default::default()
        })
    }
}

impl PageParser for HorseParser {
    type Entity = Horse;
    const KIND: DataType = DataType::Horse;

    fn parse(html: &str, context: &PageContext) -> Result<ParseResult<Horse>, ParseError> {
        let _span = info_span!("parse", parser = "horse", code = %context.code).entered();
        let document = Html::parse_document(html);
        let root = document.root_element();
        let mut result = ParseResult::new(Self::KIND, Self::VERSION, context);

        let header = require(Self::KIND, root, HEADER)?;
        let name_en = element_text(&require(Self::KIND, header, NAME_EN)?);
        let rest = text_of(header, "span.rest");
        let mut name = element_text(&header)
            .replace("競走馬情報", "")
            .replace(&name_en, "");
        if let Some(rest) = &rest {
            name = name.replace(rest.as_str(), "");
        }

        let deregistered_on = text_of(root, "div.header_line.no-mb span.inner span.opt span")
            .map(|t| parse_jp_date(&t.replace("抹消年月日", "")));

        let mut horse = Horse {
            code: context.code.clone(),
            name,
            name_en: non_empty(name_en),
            rest,
            deregistered: deregistered_on.is_some(),
            deregistered_on: deregistered_on.flatten(),
            ..Default::default()
        };

        Self::parse_profile(root, &mut horse);
        horse.prizes = Self::parse_prizes(root, &context.code)?;

        let table = require(Self::KIND, root, RESULT_TABLE)?;
        for row in select_all(table, "tbody tr") {
            if select_first(row, "td.race").is_none() {
                continue;
            }
            horse.results.push(Self::parse_result_row(row, &context.code)?);
        }
        debug!("Parsed {} past races", horse.results.len());

        result.set_entity(horse)?;
        Ok(result)
    }
}
