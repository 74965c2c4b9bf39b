//! SQLite repository for crawled entities and the visitation ledger
//!
//! Every `insert_*` writes the entity, its child rows and its ledger entry
//! in one transaction. Inserts are plain `INSERT`s: storing the same code
//! twice is an error, the crawler relies on the ledger to avoid it.

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::debug;

use super::ledger::{self, data_type_column, LedgerRecord, LedgerStat};
use super::schema::create_tables;
use crate::models::{
    DataType, Horse, HorsePrizes, HorseResult, Jockey, Match, Month, OddsSheet, Pedigree, Prize,
    Race, RaceResult, Summary, SummaryPeriod, Trainer, CORNER_SLOTS, PRIZE_RANKS,
};

/// Tables reported by [`CrawlRepository::table_counts`]
const COUNTED_TABLES: [&str; 11] = [
    "months",
    "matches",
    "races",
    "race_results",
    "odds_tan",
    "horses",
    "horse_results",
    "jockeys",
    "trainers",
    "summaries",
    "code_records",
];

fn date_to_sql(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.to_string())
}

fn date_from_sql(text: Option<String>) -> Option<NaiveDate> {
    text.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
}

fn json_column<T: DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parsed_column<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let text: String = row.get(idx)?;
    text.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn pedigree_columns(pedigree: &Option<Pedigree>) -> (Option<&str>, Option<&str>) {
    match pedigree {
        Some(p) => (p.code.as_deref(), Some(p.name.as_str())),
        None => (None, None),
    }
}

fn pedigree_from_sql(code: Option<String>, name: Option<String>) -> Option<Pedigree> {
    name.map(|name| Pedigree { code, name })
}

/// Repository for crawled JRA data
pub struct CrawlRepository {
    conn: Connection,
}

impl CrawlRepository {
    /// Create a new repository, initializing the database if needed
    pub fn new(db_path: &Path) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let conn = Connection::open(db_path).context("Failed to open database")?;

        // Enable foreign keys
        conn.execute("PRAGMA foreign_keys = ON", [])?;

        create_tables(&conn)?;

        Ok(Self { conn })
    }

    /// Create an in-memory repository
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        create_tables(&conn)?;
        Ok(Self { conn })
    }

    // ==================== Insert Operations ====================

    /// Insert a searched month
    pub fn insert_month(&self, month: &Month) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO months (code, year, month, number_of_matches) VALUES (?1, ?2, ?3, ?4)",
            params![
                month.code,
                month.year,
                month.month,
                month.number_of_matches as i64
            ],
        )
        .with_context(|| format!("Failed to insert month {}", month.code))?;
        ledger::record_code(&tx, &month.code, DataType::Month, None)?;
        tx.commit()?;
        Ok(())
    }

    /// Insert a meeting day
    pub fn insert_match(&self, m: &Match) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            r#"
            INSERT INTO matches (code, name, date, kai, place, nichi, number_of_races)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                m.code,
                m.name,
                date_to_sql(m.date),
                m.kai,
                m.place,
                m.nichi,
                m.number_of_races as i64
            ],
        )
        .with_context(|| format!("Failed to insert match {}", m.code))?;
        ledger::record_code(&tx, &m.code, DataType::Match, Some(&m.name))?;
        tx.commit()?;
        Ok(())
    }

    /// Insert a race with its prizes, result rows and optional odds sheet
    pub fn insert_race(&self, race: &Race, odds: Option<&OddsSheet>) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            r#"
            INSERT INTO races
            (code, match_code, name, title, race_index, date, start_time, weather,
             turf_condition, dirt_condition, category, class, rule, weight_rule,
             course_detail, surface, distance, distance_unit, prize_unit,
             prize_1, prize_2, prize_3, prize_4, prize_5, number_of_horses, max_corners)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                    ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26)
            "#,
            params![
                race.code,
                race.match_code,
                race.name,
                race.title,
                race.index,
                date_to_sql(race.date),
                race.start_time.map(|t| t.format("%H:%M:%S").to_string()),
                race.weather,
                race.turf_condition,
                race.dirt_condition,
                race.category,
                race.class,
                race.rule,
                race.weight_rule,
                race.course_detail,
                race.surface,
                race.distance,
                race.distance_unit,
                race.prize_unit,
                race.prize_totals[0],
                race.prize_totals[1],
                race.prize_totals[2],
                race.prize_totals[3],
                race.prize_totals[4],
                race.number_of_horses as i64,
                race.max_corners as i64,
            ],
        )
        .with_context(|| format!("Failed to insert race {}", race.code))?;

        for (position, prize) in race.prizes.iter().enumerate() {
            tx.execute(
                r#"
                INSERT INTO race_prizes (race_code, position, name, unit, amounts)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    race.code,
                    position as i64,
                    prize.name,
                    prize.unit,
                    serde_json::to_string(&prize.amounts)?
                ],
            )?;
        }

        for result in &race.results {
            tx.execute(
                r#"
                INSERT INTO race_results
                (race_code, order_text, arrival_order, gate, gate_color, num, horse_code,
                 horse_name, horse_icon, blinker, sex_age, sex, age, carried_weight,
                 jockey_code, jockey_name, time, margin, corners_raw,
                 corner_1, corner_2, corner_3, corner_4, final_furlong, body_weight,
                 body_weight_delta, trainer_code, trainer_name, popularity, odds_tan)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                        ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28,
                        ?29, ?30)
                "#,
                params![
                    race.code,
                    result.order_text,
                    result.arrival_order,
                    result.gate,
                    result.gate_color,
                    result.num,
                    result.horse_code,
                    result.horse_name,
                    result.horse_icon,
                    result.blinker,
                    result.sex_age,
                    result.sex,
                    result.age,
                    result.carried_weight,
                    result.jockey_code,
                    result.jockey_name,
                    result.time,
                    result.margin,
                    serde_json::to_string(&result.corners_raw)?,
                    result.corners[0],
                    result.corners[1],
                    result.corners[2],
                    result.corners[3],
                    result.final_furlong,
                    result.body_weight,
                    result.body_weight_delta,
                    result.trainer_code,
                    result.trainer_name,
                    result.popularity,
                    result.odds_tan,
                ],
            )
            .with_context(|| format!("Failed to insert result {} of race {}", result.num, race.code))?;
        }

        if let Some(sheet) = odds {
            for (num, value) in &sheet.odds {
                tx.execute(
                    "INSERT INTO odds_tan (code, race_code, num, odds) VALUES (?1, ?2, ?3, ?4)",
                    params![sheet.code, race.code, num, value],
                )
                .with_context(|| format!("Failed to insert odds {}", sheet.code))?;
            }
        }

        ledger::record_code(&tx, &race.code, DataType::Race, Some(&race.name))?;
        tx.commit()?;
        debug!(code = %race.code, results = race.results.len(), "Stored race");
        Ok(())
    }

    /// Insert a horse with its race history
    pub fn insert_horse(&self, horse: &Horse) -> Result<()> {
        let (father_code, father_name) = pedigree_columns(&horse.father);
        let (mother_code, mother_name) = pedigree_columns(&horse.mother);
        let (mf_code, mf_name) = pedigree_columns(&horse.mother_father);
        let (mm_code, mm_name) = pedigree_columns(&horse.mother_mother);

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            r#"
            INSERT INTO horses
            (code, name, name_en, rest, deregistered, deregistered_on,
             father_code, father_name, mother_code, mother_name,
             mother_father_code, mother_father_name, mother_mother_code, mother_mother_name,
             sex, birth_date, color, owner, trainer_code, trainer_name, trainer_affiliation,
             farm, breeder, prize_total, prize_additional, prize_local, prize_overseas,
             prize_earned_flat, prize_earned_jump)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                    ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29)
            "#,
            params![
                horse.code,
                horse.name,
                horse.name_en,
                horse.rest,
                horse.deregistered,
                date_to_sql(horse.deregistered_on),
                father_code,
                father_name,
                mother_code,
                mother_name,
                mf_code,
                mf_name,
                mm_code,
                mm_name,
                horse.sex,
                date_to_sql(horse.birth_date),
                horse.color,
                horse.owner,
                horse.trainer_code,
                horse.trainer_name,
                horse.trainer_affiliation,
                horse.farm,
                horse.breeder,
                horse.prizes.total,
                horse.prizes.additional,
                horse.prizes.local,
                horse.prizes.overseas,
                horse.prizes.earned_flat,
                horse.prizes.earned_jump,
            ],
        )
        .with_context(|| format!("Failed to insert horse {}", horse.code))?;

        for result in &horse.results {
            tx.execute(
                r#"
                INSERT INTO horse_results
                (horse_code, date, place, race_name, race_code, surface_distance, condition,
                 number_of_horses, popularity, order_text, arrival_order, jockey_code,
                 jockey_name, carried_weight, horse_weight, time, rt)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                "#,
                params![
                    horse.code,
                    date_to_sql(result.date),
                    result.place,
                    result.race_name,
                    result.race_code,
                    result.surface_distance,
                    result.condition,
                    result.number_of_horses,
                    result.popularity,
                    result.order_text,
                    result.arrival_order,
                    result.jockey_code,
                    result.jockey_name,
                    result.carried_weight,
                    result.horse_weight,
                    result.time,
                    result.rt,
                ],
            )?;
        }

        ledger::record_code(&tx, &horse.code, DataType::Horse, Some(&horse.name))?;
        tx.commit()?;
        Ok(())
    }

    /// Insert a jockey with all of its summary rows
    pub fn insert_jockey(&self, jockey: &Jockey) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            r#"
            INSERT INTO jockeys
            (code, name, kana, birth_date, height, height_unit, weight, weight_unit,
             blood_type, first_license_year, license_type, birthplace, affiliation,
             stable, first_ride, first_win)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
            params![
                jockey.code,
                jockey.name,
                jockey.kana,
                date_to_sql(jockey.birth_date),
                jockey.height,
                jockey.height_unit,
                jockey.weight,
                jockey.weight_unit,
                jockey.blood_type,
                jockey.first_license_year,
                jockey.license_type,
                jockey.birthplace,
                jockey.affiliation,
                jockey.stable,
                jockey.first_ride,
                jockey.first_win,
            ],
        )
        .with_context(|| format!("Failed to insert jockey {}", jockey.code))?;
        Self::insert_summaries(&tx, jockey.summaries())?;
        ledger::record_code(&tx, &jockey.code, DataType::Jockey, Some(&jockey.name))?;
        tx.commit()?;
        Ok(())
    }

    /// Insert a trainer with all of its summary rows
    pub fn insert_trainer(&self, trainer: &Trainer) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            r#"
            INSERT INTO trainers
            (code, name, kana, birth_date, birthplace, license_year, affiliation,
             first_start, first_win)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                trainer.code,
                trainer.name,
                trainer.kana,
                date_to_sql(trainer.birth_date),
                trainer.birthplace,
                trainer.license_year,
                trainer.affiliation,
                trainer.first_start,
                trainer.first_win,
            ],
        )
        .with_context(|| format!("Failed to insert trainer {}", trainer.code))?;
        Self::insert_summaries(&tx, trainer.summaries())?;
        ledger::record_code(&tx, &trainer.code, DataType::Trainer, Some(&trainer.name))?;
        tx.commit()?;
        Ok(())
    }

    fn insert_summaries<'a>(
        conn: &Connection,
        summaries: impl Iterator<Item = &'a Summary>,
    ) -> Result<()> {
        let mut stmt = conn.prepare(
            r#"
            INSERT INTO summaries
            (owner_kind, owner_code, period, title, kind, place_1, place_2, place_3,
             place_4, place_5, off_board, runs, win_rate, top2_rate, top3_rate)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
        )?;
        for s in summaries {
            stmt.execute(params![
                s.owner_kind.as_str(),
                s.owner_code,
                s.period.as_str(),
                s.title,
                s.kind,
                s.places[0],
                s.places[1],
                s.places[2],
                s.places[3],
                s.places[4],
                s.off_board,
                s.runs,
                s.win_rate,
                s.top2_rate,
                s.top3_rate,
            ])?;
        }
        Ok(())
    }

    // ==================== Ledger Operations ====================

    /// Look up a code, bumping its visit counter on a hit
    pub fn check_code(&self, code: &str, category: DataType) -> Result<Option<LedgerRecord>> {
        Ok(ledger::check_code(&self.conn, code, category)?)
    }

    /// Look up a code without counting a visit
    pub fn find_code(&self, code: &str, category: DataType) -> Result<Option<LedgerRecord>> {
        Ok(ledger::find_code(&self.conn, code, category)?)
    }

    pub fn ledger_stats(&self) -> Result<Vec<LedgerStat>> {
        Ok(ledger::stats(&self.conn)?)
    }

    // ==================== Query Operations ====================

    pub fn get_month_by_code(&self, code: &str) -> Result<Option<Month>> {
        let month = self
            .conn
            .query_row(
                "SELECT code, year, month, number_of_matches FROM months WHERE code = ?1",
                [code],
                |row| {
                    Ok(Month {
                        code: row.get(0)?,
                        year: row.get(1)?,
                        month: row.get(2)?,
                        number_of_matches: row.get::<_, i64>(3)? as usize,
                    })
                },
            )
            .optional()?;
        Ok(month)
    }

    pub fn get_match_by_code(&self, code: &str) -> Result<Option<Match>> {
        let m = self
            .conn
            .query_row(
                r#"
                SELECT code, name, date, kai, place, nichi, number_of_races
                FROM matches WHERE code = ?1
                "#,
                [code],
                |row| {
                    Ok(Match {
                        code: row.get(0)?,
                        name: row.get(1)?,
                        date: date_from_sql(row.get(2)?),
                        kai: row.get(3)?,
                        place: row.get(4)?,
                        nichi: row.get(5)?,
                        number_of_races: row.get::<_, i64>(6)? as usize,
                    })
                },
            )
            .optional()?;
        Ok(m)
    }

    /// Get a race with its prizes and result rows
    pub fn get_race_by_code(&self, code: &str) -> Result<Option<Race>> {
        let race = self
            .conn
            .query_row(
                r#"
                SELECT code, match_code, name, title, race_index, date, start_time, weather,
                       turf_condition, dirt_condition, category, class, rule, weight_rule,
                       course_detail, surface, distance, distance_unit, prize_unit,
                       prize_1, prize_2, prize_3, prize_4, prize_5,
                       number_of_horses, max_corners
                FROM races WHERE code = ?1
                "#,
                [code],
                |row| {
                    let start_time: Option<String> = row.get(6)?;
                    let mut prize_totals = [0.0; PRIZE_RANKS];
                    for (rank, total) in prize_totals.iter_mut().enumerate() {
                        *total = row.get(19 + rank)?;
                    }
                    Ok(Race {
                        code: row.get(0)?,
                        match_code: row.get(1)?,
                        name: row.get(2)?,
                        title: row.get(3)?,
                        index: row.get(4)?,
                        date: date_from_sql(row.get(5)?),
                        start_time: start_time
                            .and_then(|s| NaiveTime::parse_from_str(&s, "%H:%M:%S").ok()),
                        weather: row.get(7)?,
                        turf_condition: row.get(8)?,
                        dirt_condition: row.get(9)?,
                        category: row.get(10)?,
                        class: row.get(11)?,
                        rule: row.get(12)?,
                        weight_rule: row.get(13)?,
                        course_detail: row.get(14)?,
                        surface: row.get(15)?,
                        distance: row.get(16)?,
                        distance_unit: row.get(17)?,
                        prize_unit: row.get(18)?,
                        prize_totals,
                        number_of_horses: row.get::<_, i64>(24)? as usize,
                        max_corners: row.get::<_, i64>(25)? as usize,
                        ..Default::default()
                    })
                },
            )
            .optional()?;

        let Some(mut race) = race else {
            return Ok(None);
        };
        race.prizes = self.get_race_prizes(code)?;
        race.results = self.get_results_by_race_code(code)?;
        Ok(Some(race))
    }

    fn get_race_prizes(&self, race_code: &str) -> Result<Vec<Prize>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, unit, amounts FROM race_prizes WHERE race_code = ?1 ORDER BY position",
        )?;
        let prizes = stmt
            .query_map([race_code], |row| {
                Ok(Prize {
                    name: row.get(0)?,
                    unit: row.get(1)?,
                    amounts: json_column(row, 2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(prizes)
    }

    /// Get the result rows of a race, by starting number
    pub fn get_results_by_race_code(&self, race_code: &str) -> Result<Vec<RaceResult>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT race_code, order_text, arrival_order, gate, gate_color, num, horse_code,
                   horse_name, horse_icon, blinker, sex_age, sex, age, carried_weight,
                   jockey_code, jockey_name, time, margin, corners_raw,
                   corner_1, corner_2, corner_3, corner_4, final_furlong, body_weight,
                   body_weight_delta, trainer_code, trainer_name, popularity, odds_tan
            FROM race_results
            WHERE race_code = ?1
            ORDER BY num
            "#,
        )?;

        let results = stmt
            .query_map([race_code], |row| {
                let mut corners = [0; CORNER_SLOTS];
                for (slot, corner) in corners.iter_mut().enumerate() {
                    *corner = row.get(19 + slot)?;
                }
                Ok(RaceResult {
                    race_code: row.get(0)?,
                    order_text: row.get(1)?,
                    arrival_order: row.get(2)?,
                    gate: row.get(3)?,
                    gate_color: row.get(4)?,
                    num: row.get(5)?,
                    horse_code: row.get(6)?,
                    horse_name: row.get(7)?,
                    horse_icon: row.get(8)?,
                    blinker: row.get(9)?,
                    sex_age: row.get(10)?,
                    sex: row.get(11)?,
                    age: row.get(12)?,
                    carried_weight: row.get(13)?,
                    jockey_code: row.get(14)?,
                    jockey_name: row.get(15)?,
                    time: row.get(16)?,
                    margin: row.get(17)?,
                    corners_raw: json_column(row, 18)?,
                    corners,
                    final_furlong: row.get(23)?,
                    body_weight: row.get(24)?,
                    body_weight_delta: row.get(25)?,
                    trainer_code: row.get(26)?,
                    trainer_name: row.get(27)?,
                    popularity: row.get(28)?,
                    odds_tan: row.get(29)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(results)
    }

    /// Get a stored win-odds sheet
    pub fn get_odds(&self, code: &str) -> Result<Option<OddsSheet>> {
        let mut stmt = self
            .conn
            .prepare("SELECT race_code, num, odds FROM odds_tan WHERE code = ?1 ORDER BY num")?;
        let rows = stmt
            .query_map([code], |row| {
                let race_code: Option<String> = row.get(0)?;
                let num: i32 = row.get(1)?;
                let odds: Option<f64> = row.get(2)?;
                Ok((race_code, num, odds))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if rows.is_empty() {
            return Ok(None);
        }
        let mut sheet = OddsSheet {
            code: code.to_string(),
            race_code: rows[0].0.clone(),
            ..Default::default()
        };
        sheet.odds = rows.into_iter().map(|(_, num, odds)| (num, odds)).collect();
        Ok(Some(sheet))
    }

    /// Get a horse with its race history
    pub fn get_horse_by_code(&self, code: &str) -> Result<Option<Horse>> {
        let horse = self
            .conn
            .query_row(
                r#"
                SELECT code, name, name_en, rest, deregistered, deregistered_on,
                       father_code, father_name, mother_code, mother_name,
                       mother_father_code, mother_father_name,
                       mother_mother_code, mother_mother_name,
                       sex, birth_date, color, owner, trainer_code, trainer_name,
                       trainer_affiliation, farm, breeder, prize_total, prize_additional,
                       prize_local, prize_overseas, prize_earned_flat, prize_earned_jump
                FROM horses WHERE code = ?1
                "#,
                [code],
                |row| {
                    Ok(Horse {
                        code: row.get(0)?,
                        name: row.get(1)?,
                        name_en: row.get(2)?,
                        rest: row.get(3)?,
                        deregistered: row.get(4)?,
                        deregistered_on: date_from_sql(row.get(5)?),
                        father: pedigree_from_sql(row.get(6)?, row.get(7)?),
                        mother: pedigree_from_sql(row.get(8)?, row.get(9)?),
                        mother_father: pedigree_from_sql(row.get(10)?, row.get(11)?),
                        mother_mother: pedigree_from_sql(row.get(12)?, row.get(13)?),
                        sex: row.get(14)?,
                        birth_date: date_from_sql(row.get(15)?),
                        color: row.get(16)?,
                        owner: row.get(17)?,
                        trainer_code: row.get(18)?,
                        trainer_name: row.get(19)?,
                        trainer_affiliation: row.get(20)?,
                        farm: row.get(21)?,
                        breeder: row.get(22)?,
                        prizes: HorsePrizes {
                            total: row.get(23)?,
                            additional: row.get(24)?,
                            local: row.get(25)?,
                            overseas: row.get(26)?,
                            earned_flat: row.get(27)?,
                            earned_jump: row.get(28)?,
                        },
                        results: Vec::new(),
                    })
                },
            )
            .optional()?;

        let Some(mut horse) = horse else {
            return Ok(None);
        };
        horse.results = self.get_results_by_horse_code(code)?;
        Ok(Some(horse))
    }

    /// Get a horse's race history in page order
    pub fn get_results_by_horse_code(&self, horse_code: &str) -> Result<Vec<HorseResult>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT horse_code, date, place, race_name, race_code, surface_distance, condition,
                   number_of_horses, popularity, order_text, arrival_order, jockey_code,
                   jockey_name, carried_weight, horse_weight, time, rt
            FROM horse_results
            WHERE horse_code = ?1
            ORDER BY id
            "#,
        )?;

        let results = stmt
            .query_map([horse_code], |row| {
                Ok(HorseResult {
                    horse_code: row.get(0)?,
                    date: date_from_sql(row.get(1)?),
                    place: row.get(2)?,
                    race_name: row.get(3)?,
                    race_code: row.get(4)?,
                    surface_distance: row.get(5)?,
                    condition: row.get(6)?,
                    number_of_horses: row.get(7)?,
                    popularity: row.get(8)?,
                    order_text: row.get(9)?,
                    arrival_order: row.get(10)?,
                    jockey_code: row.get(11)?,
                    jockey_name: row.get(12)?,
                    carried_weight: row.get(13)?,
                    horse_weight: row.get(14)?,
                    time: row.get(15)?,
                    rt: row.get(16)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(results)
    }

    /// Get a jockey with its summaries
    pub fn get_jockey_by_code(&self, code: &str) -> Result<Option<Jockey>> {
        let jockey = self
            .conn
            .query_row(
                r#"
                SELECT code, name, kana, birth_date, height, height_unit, weight, weight_unit,
                       blood_type, first_license_year, license_type, birthplace, affiliation,
                       stable, first_ride, first_win
                FROM jockeys WHERE code = ?1
                "#,
                [code],
                |row| {
                    Ok(Jockey {
                        code: row.get(0)?,
                        name: row.get(1)?,
                        kana: row.get(2)?,
                        birth_date: date_from_sql(row.get(3)?),
                        height: row.get(4)?,
                        height_unit: row.get(5)?,
                        weight: row.get(6)?,
                        weight_unit: row.get(7)?,
                        blood_type: row.get(8)?,
                        first_license_year: row.get(9)?,
                        license_type: row.get(10)?,
                        birthplace: row.get(11)?,
                        affiliation: row.get(12)?,
                        stable: row.get(13)?,
                        first_ride: row.get(14)?,
                        first_win: row.get(15)?,
                        ..Default::default()
                    })
                },
            )
            .optional()?;

        let Some(mut jockey) = jockey else {
            return Ok(None);
        };
        for summary in self.get_summaries(DataType::Jockey, code)? {
            match summary.period {
                SummaryPeriod::ThisYear => jockey.this_year.push(summary),
                SummaryPeriod::Total => jockey.total.push(summary),
                SummaryPeriod::Past => jockey.history.push(summary),
            }
        }
        Ok(Some(jockey))
    }

    /// Get a trainer with its summaries
    pub fn get_trainer_by_code(&self, code: &str) -> Result<Option<Trainer>> {
        let trainer = self
            .conn
            .query_row(
                r#"
                SELECT code, name, kana, birth_date, birthplace, license_year, affiliation,
                       first_start, first_win
                FROM trainers WHERE code = ?1
                "#,
                [code],
                |row| {
                    Ok(Trainer {
                        code: row.get(0)?,
                        name: row.get(1)?,
                        kana: row.get(2)?,
                        birth_date: date_from_sql(row.get(3)?),
                        birthplace: row.get(4)?,
                        license_year: row.get(5)?,
                        affiliation: row.get(6)?,
                        first_start: row.get(7)?,
                        first_win: row.get(8)?,
                        ..Default::default()
                    })
                },
            )
            .optional()?;

        let Some(mut trainer) = trainer else {
            return Ok(None);
        };
        for summary in self.get_summaries(DataType::Trainer, code)? {
            match summary.period {
                SummaryPeriod::ThisYear => trainer.this_year.push(summary),
                SummaryPeriod::Total => trainer.total.push(summary),
                SummaryPeriod::Past => trainer.history.push(summary),
            }
        }
        Ok(Some(trainer))
    }

    /// Get every summary row of one jockey or trainer, in insertion order
    pub fn get_summaries(&self, owner_kind: DataType, owner_code: &str) -> Result<Vec<Summary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT owner_kind, owner_code, period, title, kind, place_1, place_2, place_3,
                   place_4, place_5, off_board, runs, win_rate, top2_rate, top3_rate
            FROM summaries
            WHERE owner_kind = ?1 AND owner_code = ?2
            ORDER BY id
            "#,
        )?;

        let summaries = stmt
            .query_map(params![owner_kind.as_str(), owner_code], |row| {
                Ok(Summary {
                    owner_kind: data_type_column(row, 0)?,
                    owner_code: row.get(1)?,
                    period: parsed_column(row, 2)?,
                    title: row.get(3)?,
                    kind: row.get(4)?,
                    places: [
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                        row.get(8)?,
                        row.get(9)?,
                    ],
                    off_board: row.get(10)?,
                    runs: row.get(11)?,
                    win_rate: row.get(12)?,
                    top2_rate: row.get(13)?,
                    top3_rate: row.get(14)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(summaries)
    }

    /// Row count of every stored table
    pub fn table_counts(&self) -> Result<Vec<(&'static str, i64)>> {
        COUNTED_TABLES
            .iter()
            .map(|table| -> Result<(&'static str, i64)> {
                let count: i64 = self.conn.query_row(
                    &format!("SELECT COUNT(*) FROM {}", table),
                    [],
                    |row| row.get(0),
                )?;
                Ok((*table, count))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn create_test_race() -> Race {
        Race {
            code: "pw01sde1006202405020120241201/2A".to_string(),
            match_code: Some("pw01srl10062024050220241201/6F".to_string()),
            name: "2歳未勝利".to_string(),
            index: Some(1),
            date: NaiveDate::from_ymd_opt(2024, 12, 1),
            start_time: NaiveTime::from_hms_opt(10, 5, 0),
            prizes: vec![Prize {
                name: "本賞金".to_string(),
                unit: "万円".to_string(),
                amounts: vec![Some(550.0), Some(220.0), Some(140.0), Some(83.0), Some(55.0)],
            }],
            prize_unit: Some("万円".to_string()),
            prize_totals: [550.0, 220.0, 140.0, 83.0, 55.0],
            number_of_horses: 2,
            max_corners: 2,
            results: vec![
                RaceResult {
                    race_code: "pw01sde1006202405020120241201/2A".to_string(),
                    order_text: "1".to_string(),
                    arrival_order: Some(1),
                    num: 1,
                    horse_code: Some("H1".to_string()),
                    horse_name: "サンプルホース".to_string(),
                    corners_raw: vec![Some(2), Some(1)],
                    corners: [2, 1, 0, 0],
                    odds_tan: Some(2.4),
                    ..Default::default()
                },
                RaceResult {
                    race_code: "pw01sde1006202405020120241201/2A".to_string(),
                    order_text: "取消".to_string(),
                    arrival_order: Some(-50),
                    num: 2,
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    fn create_test_summary(owner_kind: DataType, code: &str, period: SummaryPeriod) -> Summary {
        Summary {
            owner_kind,
            owner_code: code.to_string(),
            period,
            title: "本年成績".to_string(),
            kind: "平地".to_string(),
            places: [60, 50, 40, 30, 30],
            off_board: 290,
            runs: 500,
            win_rate: Some(0.12),
            top2_rate: Some(0.22),
            top3_rate: Some(0.3),
        }
    }

    #[test]
    fn test_insert_and_get_race() {
        let repo = CrawlRepository::in_memory().unwrap();
        let race = create_test_race();
        let sheet = OddsSheet {
            code: "O1".to_string(),
            race_code: Some(race.code.clone()),
            odds: BTreeMap::from([(1, Some(2.4)), (2, None)]),
        };
        repo.insert_race(&race, Some(&sheet)).unwrap();

        let loaded = repo.get_race_by_code(&race.code).unwrap().unwrap();
        assert_eq!(loaded, race);
        assert_eq!(repo.get_odds("O1").unwrap().unwrap(), sheet);
        assert!(repo.get_odds("O2").unwrap().is_none());
        assert!(repo.get_race_by_code("missing").unwrap().is_none());
    }

    #[test]
    fn test_insert_records_ledger() {
        let repo = CrawlRepository::in_memory().unwrap();
        let race = create_test_race();
        repo.insert_race(&race, None).unwrap();

        let record = repo.find_code(&race.code, DataType::Race).unwrap().unwrap();
        assert_eq!(record.count, 0);
        assert_eq!(record.name.as_deref(), Some("2歳未勝利"));

        let record = repo.check_code(&race.code, DataType::Race).unwrap().unwrap();
        assert_eq!(record.count, 1);
    }

    #[test]
    fn test_duplicate_insert_fails_and_rolls_back() {
        let repo = CrawlRepository::in_memory().unwrap();
        let race = create_test_race();
        repo.insert_race(&race, None).unwrap();
        assert!(repo.insert_race(&race, None).is_err());

        assert_eq!(repo.get_results_by_race_code(&race.code).unwrap().len(), 2);
        let counts: BTreeMap<_, _> = repo.table_counts().unwrap().into_iter().collect();
        assert_eq!(counts["races"], 1);
        assert_eq!(counts["code_records"], 1);
    }

    #[test]
    fn test_failed_child_insert_leaves_nothing() {
        let repo = CrawlRepository::in_memory().unwrap();
        let mut race = create_test_race();
        race.results[1].num = 1;
        assert!(repo.insert_race(&race, None).is_err());

        assert!(repo.get_race_by_code(&race.code).unwrap().is_none());
        assert!(repo.find_code(&race.code, DataType::Race).unwrap().is_none());
    }

    #[test]
    fn test_insert_and_get_horse() {
        let repo = CrawlRepository::in_memory().unwrap();
        let horse = Horse {
            code: "H1".to_string(),
            name: "サンプルホース".to_string(),
            deregistered: true,
            deregistered_on: NaiveDate::from_ymd_opt(2025, 3, 14),
            father: Some(Pedigree {
                code: Some("H0".to_string()),
                name: "フジキセキ".to_string(),
            }),
            mother: Some(Pedigree {
                code: None,
                name: "Limari".to_string(),
            }),
            prizes: HorsePrizes {
                total: Some(5_610_000.0),
                ..Default::default()
            },
            results: vec![HorseResult {
                horse_code: "H1".to_string(),
                date: NaiveDate::from_ymd_opt(2024, 12, 1),
                place: "中山".to_string(),
                race_name: "2歳未勝利".to_string(),
                order_text: "1".to_string(),
                arrival_order: Some(1),
                ..Default::default()
            }],
            ..Default::default()
        };
        repo.insert_horse(&horse).unwrap();

        assert_eq!(repo.get_horse_by_code("H1").unwrap().unwrap(), horse);
        assert!(repo.find_code("H1", DataType::Horse).unwrap().is_some());
    }

    #[test]
    fn test_insert_and_get_jockey_summaries() {
        let repo = CrawlRepository::in_memory().unwrap();
        let jockey = Jockey {
            code: "J1".to_string(),
            name: "三浦 皇成".to_string(),
            this_year: vec![create_test_summary(DataType::Jockey, "J1", SummaryPeriod::ThisYear)],
            total: vec![create_test_summary(DataType::Jockey, "J1", SummaryPeriod::Total)],
            history: vec![create_test_summary(DataType::Jockey, "J1", SummaryPeriod::Past)],
            ..Default::default()
        };
        repo.insert_jockey(&jockey).unwrap();

        assert_eq!(repo.get_jockey_by_code("J1").unwrap().unwrap(), jockey);
        assert_eq!(repo.get_summaries(DataType::Jockey, "J1").unwrap().len(), 3);
        assert!(repo.get_summaries(DataType::Trainer, "J1").unwrap().is_empty());
    }

    #[test]
    fn test_insert_and_get_trainer() {
        let repo = CrawlRepository::in_memory().unwrap();
        let trainer = Trainer {
            code: "T1".to_string(),
            name: "鹿戸 雄一".to_string(),
            license_year: Some(2007),
            total: vec![create_test_summary(DataType::Trainer, "T1", SummaryPeriod::Total)],
            ..Default::default()
        };
        repo.insert_trainer(&trainer).unwrap();
        assert_eq!(repo.get_trainer_by_code("T1").unwrap().unwrap(), trainer);
    }

    #[test]
    fn test_month_and_match() {
        let repo = CrawlRepository::in_memory().unwrap();
        let month = Month {
            code: "202412".to_string(),
            year: 2024,
            month: 12,
            number_of_matches: 3,
        };
        let m = Match {
            code: "M1".to_string(),
            name: "5回中山2日".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 12, 1),
            kai: 5,
            place: "中山".to_string(),
            nichi: 2,
            number_of_races: 12,
        };
        repo.insert_match(&m).unwrap();
        repo.insert_month(&month).unwrap();

        assert_eq!(repo.get_month_by_code("202412").unwrap().unwrap(), month);
        assert_eq!(repo.get_match_by_code("M1").unwrap().unwrap(), m);

        let stats = repo.ledger_stats().unwrap();
        assert_eq!(stats.len(), 2);
        assert!(stats.iter().all(|s| s.entries == 1 && s.visits == 0));
    }

    #[test]
    fn test_new_creates_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("keiba.db");
        let repo = CrawlRepository::new(&path).unwrap();
        assert!(path.exists());
        assert!(repo.table_counts().unwrap().iter().all(|(_, n)| *n == 0));
    }
}
