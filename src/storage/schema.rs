//! SQLite schema definitions for crawled JRA data
//!
//! Tables:
//! - months / matches / races: the crawl hierarchy
//! - race_prizes / race_results / odds_tan: children of a race
//! - horses / horse_results: horse profiles and their race history
//! - jockeys / trainers / summaries: person profiles and results tables
//! - code_records: the visitation ledger

use rusqlite::{Connection, Result};

/// Create all tables in the database
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS months (
            code TEXT PRIMARY KEY,
            year INTEGER NOT NULL,
            month INTEGER NOT NULL,
            number_of_matches INTEGER NOT NULL,
            created_at TEXT DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS matches (
            code TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            date TEXT,
            kai INTEGER NOT NULL,
            place TEXT NOT NULL,
            nichi INTEGER NOT NULL,
            number_of_races INTEGER NOT NULL,
            created_at TEXT DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS races (
            code TEXT PRIMARY KEY,
            match_code TEXT,
            name TEXT NOT NULL,
            title TEXT NOT NULL,
            race_index INTEGER,
            date TEXT,
            start_time TEXT,
            weather TEXT,
            turf_condition TEXT,
            dirt_condition TEXT,
            category TEXT,
            class TEXT,
            rule TEXT,
            weight_rule TEXT,
            course_detail TEXT,
            surface TEXT,
            distance INTEGER,
            distance_unit TEXT,
            prize_unit TEXT,
            prize_1 REAL NOT NULL,
            prize_2 REAL NOT NULL,
            prize_3 REAL NOT NULL,
            prize_4 REAL NOT NULL,
            prize_5 REAL NOT NULL,
            number_of_horses INTEGER NOT NULL,
            max_corners INTEGER NOT NULL,
            created_at TEXT DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS race_prizes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            race_code TEXT NOT NULL REFERENCES races(code),
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            unit TEXT NOT NULL,
            amounts TEXT NOT NULL,
            UNIQUE(race_code, position)
        );

        CREATE TABLE IF NOT EXISTS race_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            race_code TEXT NOT NULL REFERENCES races(code),
            order_text TEXT NOT NULL,
            arrival_order INTEGER,
            gate INTEGER,
            gate_color TEXT,
            num INTEGER NOT NULL,
            horse_code TEXT,
            horse_name TEXT NOT NULL,
            horse_icon TEXT,
            blinker INTEGER NOT NULL,
            sex_age TEXT NOT NULL,
            sex TEXT NOT NULL,
            age INTEGER NOT NULL,
            carried_weight REAL,
            jockey_code TEXT,
            jockey_name TEXT NOT NULL,
            time REAL,
            margin TEXT NOT NULL,
            corners_raw TEXT NOT NULL,
            corner_1 INTEGER NOT NULL,
            corner_2 INTEGER NOT NULL,
            corner_3 INTEGER NOT NULL,
            corner_4 INTEGER NOT NULL,
            final_furlong REAL,
            body_weight INTEGER,
            body_weight_delta INTEGER,
            trainer_code TEXT,
            trainer_name TEXT NOT NULL,
            popularity INTEGER,
            odds_tan REAL,
            UNIQUE(race_code, num)
        );

        CREATE TABLE IF NOT EXISTS odds_tan (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT NOT NULL,
            race_code TEXT,
            num INTEGER NOT NULL,
            odds REAL,
            UNIQUE(code, num)
        );

        CREATE TABLE IF NOT EXISTS horses (
            code TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            name_en TEXT,
            rest TEXT,
            deregistered INTEGER NOT NULL,
            deregistered_on TEXT,
            father_code TEXT,
            father_name TEXT,
            mother_code TEXT,
            mother_name TEXT,
            mother_father_code TEXT,
            mother_father_name TEXT,
            mother_mother_code TEXT,
            mother_mother_name TEXT,
            sex TEXT,
            birth_date TEXT,
            color TEXT,
            owner TEXT,
            trainer_code TEXT,
            trainer_name TEXT,
            trainer_affiliation TEXT,
            farm TEXT,
            breeder TEXT,
            prize_total REAL,
            prize_additional REAL,
            prize_local REAL,
            prize_overseas REAL,
            prize_earned_flat REAL,
            prize_earned_jump REAL,
            created_at TEXT DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS horse_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            horse_code TEXT NOT NULL REFERENCES horses(code),
            date TEXT,
            place TEXT NOT NULL,
            race_name TEXT NOT NULL,
            race_code TEXT,
            surface_distance TEXT NOT NULL,
            condition TEXT NOT NULL,
            number_of_horses INTEGER,
            popularity INTEGER,
            order_text TEXT NOT NULL,
            arrival_order INTEGER,
            jockey_code TEXT,
            jockey_name TEXT NOT NULL,
            carried_weight REAL,
            horse_weight REAL,
            time REAL,
            rt TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS jockeys (
            code TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            kana TEXT,
            birth_date TEXT,
            height REAL,
            height_unit TEXT,
            weight REAL,
            weight_unit TEXT,
            blood_type TEXT,
            first_license_year INTEGER,
            license_type TEXT,
            birthplace TEXT,
            affiliation TEXT,
            stable TEXT,
            first_ride TEXT,
            first_win TEXT,
            created_at TEXT DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS trainers (
            code TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            kana TEXT,
            birth_date TEXT,
            birthplace TEXT,
            license_year INTEGER,
            affiliation TEXT,
            first_start TEXT,
            first_win TEXT,
            created_at TEXT DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS summaries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_kind TEXT NOT NULL,
            owner_code TEXT NOT NULL,
            period TEXT NOT NULL,
            title TEXT NOT NULL,
            kind TEXT NOT NULL,
            place_1 INTEGER NOT NULL,
            place_2 INTEGER NOT NULL,
            place_3 INTEGER NOT NULL,
            place_4 INTEGER NOT NULL,
            place_5 INTEGER NOT NULL,
            off_board INTEGER NOT NULL,
            runs INTEGER NOT NULL,
            win_rate REAL,
            top2_rate REAL,
            top3_rate REAL
        );

        CREATE TABLE IF NOT EXISTS code_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT NOT NULL,
            category TEXT NOT NULL,
            name TEXT,
            count INTEGER NOT NULL DEFAULT 0,
            first_seen TEXT DEFAULT (datetime('now')),
            last_seen TEXT,
            UNIQUE(code, category)
        );

        CREATE INDEX IF NOT EXISTS idx_race_results_horse ON race_results(horse_code);
        CREATE INDEX IF NOT EXISTS idx_horse_results_horse ON horse_results(horse_code);
        CREATE INDEX IF NOT EXISTS idx_summaries_owner ON summaries(owner_kind, owner_code);
        "#,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tables_twice() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        create_tables(&conn).unwrap();

        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 12);
    }
}
