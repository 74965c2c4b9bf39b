//! Entity models for the JRA result pages.
//!
//! Parsers build these through struct literals and hand them to
//! [`Normalize::normalized`] before returning, so every entity leaving a
//! parser has its derived fields filled in.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ModelError;
use crate::scraper::extract::{parse_arrival_order, split_sex_age};

/// Number of ranks carried by the aggregated prize table
pub const PRIZE_RANKS: usize = 5;
/// Number of corner slots kept per race result
pub const CORNER_SLOTS: usize = 4;

static MATCH_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)回(.+?)(\d+)日$").unwrap());

/// Kind of page, entity or ledger category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Base,
    Failed,
    Month,
    MatchList,
    Match,
    Race,
    Horse,
    Jockey,
    JockeySummary,
    Trainer,
    TrainerSummary,
    OddsTan,
}

impl DataType {
    pub const ALL: [DataType; 12] = [
        DataType::Base,
        DataType::Failed,
        DataType::Month,
        DataType::MatchList,
        DataType::Match,
        DataType::Race,
        DataType::Horse,
        DataType::Jockey,
        DataType::JockeySummary,
        DataType::Trainer,
        DataType::TrainerSummary,
        DataType::OddsTan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Base => "base",
            DataType::Failed => "failed",
            DataType::Month => "month",
            DataType::MatchList => "match_list",
            DataType::Match => "match",
            DataType::Race => "race",
            DataType::Horse => "horse",
            DataType::Jockey => "jockey",
            DataType::JockeySummary => "jockey_summary",
            DataType::Trainer => "trainer",
            DataType::TrainerSummary => "trainer_summary",
            DataType::OddsTan => "odds_tan",
        }
    }

    /// Whether archived pages of this kind keep timestamped snapshots
    /// instead of overwriting the previous copy
    pub fn keeps_history(&self) -> bool {
        !matches!(
            self,
            DataType::Month | DataType::MatchList | DataType::Match | DataType::Race
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown data type: {}", s))
    }
}

/// How a reference is followed: a plain link or an inline script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    Link(String),
    Action(String),
}

/// Outbound relation discovered on a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub category: DataType,
    pub code: Option<String>,
    pub name: Option<String>,
    pub target: Target,
}

impl Reference {
    pub fn link(category: DataType, code: Option<String>, name: Option<String>, path: &str) -> Self {
        Self {
            category,
            code,
            name,
            target: Target::Link(path.to_string()),
        }
    }

    pub fn action(
        category: DataType,
        code: Option<String>,
        name: Option<String>,
        script: &str,
    ) -> Self {
        Self {
            category,
            code,
            name,
            target: Target::Action(script.to_string()),
        }
    }

    /// Code usable as a ledger key; empty codes count as absent
    pub fn ledger_code(&self) -> Option<&str> {
        self.code.as_deref().filter(|code| !code.is_empty())
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}] {}",
            self.category,
            self.code.as_deref().unwrap_or("-"),
            self.name.as_deref().unwrap_or("")
        )
    }
}

/// References grouped by target category, page order preserved per group
pub type References = BTreeMap<DataType, Vec<Reference>>;

/// Derive normalized fields from the raw ones.
///
/// Implementations must be idempotent and free of I/O.
pub trait Normalize: Sized {
    fn normalize(&mut self) -> Result<(), ModelError>;

    fn normalized(mut self) -> Result<Self, ModelError> {
        self.normalize()?;
        Ok(self)
    }
}

// ==================== Month / Match ====================

/// One searched year-month
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Month {
    /// `YYYYMM`
    pub code: String,
    pub year: i32,
    pub month: u32,
    pub number_of_matches: usize,
}

impl Month {
    pub fn code_for(year: i32, month: u32) -> String {
        format!("{:04}{:02}", year, month)
    }
}

impl Normalize for Month {
    fn normalize(&mut self) -> Result<(), ModelError> {
        let parsed = match (self.code.len(), self.code.get(..4), self.code.get(4..)) {
            (6, Some(year), Some(month)) => year.parse::<i32>().ok().zip(month.parse::<u32>().ok()),
            _ => None,
        };
        match parsed {
            Some((year, month)) if (1..=12).contains(&month) => {
                self.year = year;
                self.month = month;
                Ok(())
            }
            _ => Err(ModelError::InvalidMonthCode {
                code: self.code.clone(),
            }),
        }
    }
}

/// Decomposed meeting name such as `5回中山2日`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchName {
    pub kai: i32,
    pub place: String,
    pub nichi: i32,
}

impl MatchName {
    pub fn parse(name: &str) -> Option<Self> {
        let caps = MATCH_NAME_RE.captures(name.trim())?;
        Some(Self {
            kai: caps[1].parse().ok()?,
            place: caps[2].to_string(),
            nichi: caps[3].parse().ok()?,
        })
    }
}

/// One race meeting day
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub code: String,
    pub name: String,
    pub date: Option<NaiveDate>,
    pub kai: i32,
    pub place: String,
    pub nichi: i32,
    pub number_of_races: usize,
}

impl Normalize for Match {
    fn normalize(&mut self) -> Result<(), ModelError> {
        let parsed = MatchName::parse(&self.name).unwrap_or_else(|| {
            warn!(code = %self.code, name = %self.name, "unrecognized match name");
            MatchName::default()
        });
        self.kai = parsed.kai;
        self.place = parsed.place;
        self.nichi = parsed.nichi;
        Ok(())
    }
}

// ==================== Race ====================

/// One prize schedule of a race (本賞金, 付加賞, ...)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prize {
    pub name: String,
    pub unit: String,
    /// Amount per rank, first place first; `None` for a blank cell
    pub amounts: Vec<Option<f64>>,
}

/// One row of a race result table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RaceResult {
    pub race_code: String,
    pub order_text: String,
    pub arrival_order: Option<i32>,
    pub gate: Option<i32>,
    pub gate_color: Option<String>,
    pub num: i32,
    pub horse_code: Option<String>,
    pub horse_name: String,
    pub horse_icon: Option<String>,
    pub blinker: bool,
    pub sex_age: String,
    pub sex: String,
    pub age: i32,
    pub carried_weight: Option<f64>,
    pub jockey_code: Option<String>,
    pub jockey_name: String,
    pub time: Option<f64>,
    pub margin: String,
    /// Corner positions as printed; `None` where a slot is blank
    pub corners_raw: Vec<Option<i32>>,
    pub corners: [i32; CORNER_SLOTS],
    pub final_furlong: Option<f64>,
    pub body_weight: Option<i32>,
    pub body_weight_delta: Option<i32>,
    pub trainer_code: Option<String>,
    pub trainer_name: String,
    pub popularity: Option<i32>,
    pub odds_tan: Option<f64>,
}

impl Normalize for RaceResult {
    fn normalize(&mut self) -> Result<(), ModelError> {
        self.arrival_order = parse_arrival_order(&self.order_text);
        let (sex, age) = split_sex_age(&self.sex_age);
        self.sex = sex;
        self.age = age;
        self.corners = [0; CORNER_SLOTS];
        for (slot, corner) in self.corners.iter_mut().zip(&self.corners_raw) {
            *slot = corner.unwrap_or(0);
        }
        Ok(())
    }
}

/// One race with its result table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Race {
    pub code: String,
    pub match_code: Option<String>,
    pub name: String,
    pub title: String,
    pub index: Option<i32>,
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub weather: Option<String>,
    pub turf_condition: Option<String>,
    pub dirt_condition: Option<String>,
    pub category: Option<String>,
    pub class: Option<String>,
    pub rule: Option<String>,
    pub weight_rule: Option<String>,
    pub course_detail: Option<String>,
    pub surface: Option<String>,
    pub distance: Option<i32>,
    pub distance_unit: Option<String>,
    pub prizes: Vec<Prize>,
    pub prize_unit: Option<String>,
    /// Sum over all schedules for ranks 1 to 5
    pub prize_totals: [f64; PRIZE_RANKS],
    pub number_of_horses: usize,
    pub max_corners: usize,
    pub results: Vec<RaceResult>,
}

impl Race {
    /// Aggregate prize schedules into per-rank totals.
    ///
    /// All schedules must share one unit.
    pub fn aggregate_prizes(&self) -> Result<(Option<String>, [f64; PRIZE_RANKS]), ModelError> {
        let mut totals = [0.0; PRIZE_RANKS];
        let mut unit: Option<&str> = None;
        for prize in &self.prizes {
            match unit {
                None => unit = Some(prize.unit.as_str()),
                Some(expected) if expected != prize.unit => {
                    return Err(ModelError::PrizeUnitMismatch {
                        race: self.code.clone(),
                        expected: expected.to_string(),
                        found: prize.unit.clone(),
                    });
                }
                Some(_) => {}
            }
            for (total, amount) in totals.iter_mut().zip(&prize.amounts) {
                *total += amount.unwrap_or(0.0);
            }
        }
        Ok((unit.map(str::to_string), totals))
    }
}

impl Normalize for Race {
    fn normalize(&mut self) -> Result<(), ModelError> {
        let (unit, totals) = self.aggregate_prizes()?;
        self.prize_unit = unit;
        self.prize_totals = totals;
        for result in &mut self.results {
            result.race_code = self.code.clone();
            result.normalize()?;
        }
        self.number_of_horses = self.results.len();
        self.max_corners = self
            .results
            .iter()
            .map(|result| result.corners_raw.len())
            .max()
            .unwrap_or(0);
        Ok(())
    }
}

/// Win odds per starting number for one race
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OddsSheet {
    pub code: String,
    pub race_code: Option<String>,
    pub odds: BTreeMap<i32, Option<f64>>,
}

impl Normalize for OddsSheet {
    fn normalize(&mut self) -> Result<(), ModelError> {
        Ok(())
    }
}

/// Copy each starter's win odds from the sheet into the race results.
///
/// Starters missing from the sheet get `None`.
pub fn merge_odds(mut race: Race, sheet: &OddsSheet) -> Race {
    for result in &mut race.results {
        result.odds_tan = sheet.odds.get(&result.num).copied().flatten();
    }
    race
}

// ==================== Horse ====================

/// Ancestor entry of a pedigree block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pedigree {
    pub code: Option<String>,
    pub name: String,
}

/// Career prize totals in yen
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HorsePrizes {
    pub total: Option<f64>,
    pub additional: Option<f64>,
    pub local: Option<f64>,
    pub overseas: Option<f64>,
    pub earned_flat: Option<f64>,
    pub earned_jump: Option<f64>,
}

/// One line of a horse's race history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HorseResult {
    pub horse_code: String,
    pub date: Option<NaiveDate>,
    pub place: String,
    pub race_name: String,
    pub race_code: Option<String>,
    pub surface_distance: String,
    pub condition: String,
    pub number_of_horses: Option<i32>,
    pub popularity: Option<i32>,
    pub order_text: String,
    pub arrival_order: Option<i32>,
    pub jockey_code: Option<String>,
    pub jockey_name: String,
    pub carried_weight: Option<f64>,
    pub horse_weight: Option<f64>,
    pub time: Option<f64>,
    pub rt: String,
}

impl Normalize for HorseResult {
    fn normalize(&mut self) -> Result<(), ModelError> {
        self.arrival_order = parse_arrival_order(&self.order_text);
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Horse {
    pub code: String,
    pub name: String,
    pub name_en: Option<String>,
    /// Rest status such as 放牧; empty when racing
    pub rest: Option<String>,
    pub deregistered: bool,
    pub deregistered_on: Option<NaiveDate>,
    pub father: Option<Pedigree>,
    pub mother: Option<Pedigree>,
    pub mother_father: Option<Pedigree>,
    pub mother_mother: Option<Pedigree>,
    pub sex: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub color: Option<String>,
    pub owner: Option<String>,
    pub trainer_code: Option<String>,
    pub trainer_name: Option<String>,
    pub trainer_affiliation: Option<String>,
    pub farm: Option<String>,
    pub breeder: Option<String>,
    pub prizes: HorsePrizes,
    pub results: Vec<HorseResult>,
}

impl Normalize for Horse {
    fn normalize(&mut self) -> Result<(), ModelError> {
        if self.deregistered_on.is_some() {
            self.deregistered = true;
        }
        for result in &mut self.results {
            result.horse_code = self.code.clone();
            result.normalize()?;
        }
        Ok(())
    }
}

// ==================== Jockey / Trainer ====================

/// Which block of a person page a summary row came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryPeriod {
    ThisYear,
    Total,
    Past,
}

impl SummaryPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryPeriod::ThisYear => "this_year",
            SummaryPeriod::Total => "total",
            SummaryPeriod::Past => "past",
        }
    }
}

impl FromStr for SummaryPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "this_year" => Ok(SummaryPeriod::ThisYear),
            "total" => Ok(SummaryPeriod::Total),
            "past" => Ok(SummaryPeriod::Past),
            _ => Err(format!("unknown summary period: {}", s)),
        }
    }
}

/// One row of a jockey/trainer results table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub owner_kind: DataType,
    pub owner_code: String,
    pub period: SummaryPeriod,
    /// Table title: 本年成績, 累計成績, 2024年, ...
    pub title: String,
    /// Row label: 平地, 障害, JRA合計, ...
    pub kind: String,
    /// Placings 1st to 5th
    pub places: [i32; 5],
    pub off_board: i32,
    pub runs: i32,
    pub win_rate: Option<f64>,
    pub top2_rate: Option<f64>,
    pub top3_rate: Option<f64>,
}

impl Summary {
    /// Whether the published rates agree with the counts within `tolerance`.
    ///
    /// Rows without runs or without rates are considered consistent.
    pub fn rates_consistent(&self, tolerance: f64) -> bool {
        if self.runs <= 0 {
            return true;
        }
        let runs = self.runs as f64;
        let wins = self.places[0] as f64;
        let top2 = wins + self.places[1] as f64;
        let top3 = top2 + self.places[2] as f64;
        [
            (self.win_rate, wins / runs),
            (self.top2_rate, top2 / runs),
            (self.top3_rate, top3 / runs),
        ]
        .iter()
        .all(|(published, computed)| {
            published.map_or(true, |rate| (rate - computed).abs() <= tolerance)
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Jockey {
    pub code: String,
    pub name: String,
    pub kana: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub height: Option<f64>,
    pub height_unit: Option<String>,
    pub weight: Option<f64>,
    pub weight_unit: Option<String>,
    pub blood_type: Option<String>,
    pub first_license_year: Option<i32>,
    pub license_type: Option<String>,
    pub birthplace: Option<String>,
    pub affiliation: Option<String>,
    pub stable: Option<String>,
    pub first_ride: Option<String>,
    pub first_win: Option<String>,
    pub this_year: Vec<Summary>,
    pub total: Vec<Summary>,
    pub history: Vec<Summary>,
}

impl Jockey {
    /// Attach the by-year summaries read from the history page
    pub fn with_history(mut self, history: Vec<Summary>) -> Self {
        self.history = history;
        self
    }

    pub fn summaries(&self) -> impl Iterator<Item = &Summary> {
        self.this_year.iter().chain(&self.total).chain(&self.history)
    }
}

impl Normalize for Jockey {
    fn normalize(&mut self) -> Result<(), ModelError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trainer {
    pub code: String,
    pub name: String,
    pub kana: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub birthplace: Option<String>,
    pub license_year: Option<i32>,
    pub affiliation: Option<String>,
    pub first_start: Option<String>,
    pub first_win: Option<String>,
    pub this_year: Vec<Summary>,
    pub total: Vec<Summary>,
    pub history: Vec<Summary>,
}

impl Trainer {
    /// Attach the by-year summaries read from the history page
    pub fn with_history(mut self, history: Vec<Summary>) -> Self {
        self.history = history;
        self
    }

    pub fn summaries(&self) -> impl Iterator<Item = &Summary> {
        self.this_year.iter().chain(&self.total).chain(&self.history)
    }
}

impl Normalize for Trainer {
    fn normalize(&mut self) -> Result<(), ModelError> {
        Ok(())
    }
}
