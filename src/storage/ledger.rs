//! Visitation ledger
//!
//! One row per `(code, category)` pair. A successful insert of an entity
//! records its code here in the same transaction; a later lookup bumps the
//! visit counter and tells the crawler to skip the page.

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Result, Row};
use serde::Serialize;
use tracing::{debug, warn};

use crate::models::DataType;

/// One ledger row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerRecord {
    pub code: String,
    pub category: DataType,
    pub name: Option<String>,
    /// Number of times the code was looked up after being recorded
    pub count: i64,
    pub first_seen: String,
    pub last_seen: Option<String>,
}

/// Per-category ledger totals
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerStat {
    pub category: DataType,
    pub entries: i64,
    pub visits: i64,
}

/// Read a text column holding a [`DataType`] name
pub(crate) fn data_type_column(row: &Row, idx: usize) -> Result<DataType> {
    let text: String = row.get(idx)?;
    text.parse::<DataType>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn row_to_record(row: &Row) -> Result<LedgerRecord> {
    Ok(LedgerRecord {
        code: row.get(0)?,
        category: data_type_column(row, 1)?,
        name: row.get(2)?,
        count: row.get(3)?,
        first_seen: row.get(4)?,
        last_seen: row.get(5)?,
    })
}

/// Record a freshly inserted code. Empty codes are ignored.
pub fn record_code(
    conn: &Connection,
    code: &str,
    category: DataType,
    name: Option<&str>,
) -> Result<()> {
    if code.is_empty() {
        warn!(%category, "Not recording empty code");
        return Ok(());
    }
    conn.execute(
        "INSERT INTO code_records (code, category, name) VALUES (?1, ?2, ?3)",
        params![code, category.as_str(), name],
    )?;
    debug!(%code, %category, "Recorded code");
    Ok(())
}

/// Look up a code without touching its counter
pub fn find_code(conn: &Connection, code: &str, category: DataType) -> Result<Option<LedgerRecord>> {
    if code.is_empty() {
        return Ok(None);
    }
    conn.query_row(
        "SELECT code, category, name, count, first_seen, last_seen
         FROM code_records WHERE code = ?1 AND category = ?2",
        params![code, category.as_str()],
        row_to_record,
    )
    .optional()
}

/// Look up a code, bumping its counter by one on a hit
pub fn check_code(
    conn: &Connection,
    code: &str,
    category: DataType,
) -> Result<Option<LedgerRecord>> {
    if code.is_empty() {
        return Ok(None);
    }
    let updated = conn.execute(
        "UPDATE code_records SET count = count + 1, last_seen = datetime('now')
         WHERE code = ?1 AND category = ?2",
        params![code, category.as_str()],
    )?;
    if updated == 0 {
        return Ok(None);
    }
    find_code(conn, code, category)
}

/// Entry and visit totals for every category present in the ledger
pub fn stats(conn: &Connection) -> Result<Vec<LedgerStat>> {
    let mut stmt = conn.prepare(
        "SELECT category, COUNT(*), COALESCE(SUM(count), 0)
         FROM code_records GROUP BY category ORDER BY category",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(LedgerStat {
                category: data_type_column(row, 0)?,
                entries: row.get(1)?,
                visits: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::create_tables;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        conn
    }

    #[test]
    fn test_check_unknown_code() {
        let conn = conn();
        assert!(check_code(&conn, "H1", DataType::Horse).unwrap().is_none());
        assert!(find_code(&conn, "H1", DataType::Horse).unwrap().is_none());
    }

    #[test]
    fn test_check_increments_by_one() {
        let conn = conn();
        record_code(&conn, "H1", DataType::Horse, Some("サンプルホース")).unwrap();
        assert_eq!(find_code(&conn, "H1", DataType::Horse).unwrap().unwrap().count, 0);

        let first = check_code(&conn, "H1", DataType::Horse).unwrap().unwrap();
        assert_eq!(first.count, 1);
        assert_eq!(first.name.as_deref(), Some("サンプルホース"));
        assert!(first.last_seen.is_some());

        let second = check_code(&conn, "H1", DataType::Horse).unwrap().unwrap();
        assert_eq!(second.count, 2);
    }

    #[test]
    fn test_category_scopes_code() {
        let conn = conn();
        record_code(&conn, "X1", DataType::Jockey, None).unwrap();
        assert!(check_code(&conn, "X1", DataType::Trainer).unwrap().is_none());
        assert!(check_code(&conn, "X1", DataType::Jockey).unwrap().is_some());
    }

    #[test]
    fn test_empty_code_never_recorded() {
        let conn = conn();
        record_code(&conn, "", DataType::Horse, None).unwrap();
        assert!(check_code(&conn, "", DataType::Horse).unwrap().is_none());
        assert!(stats(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_record_fails() {
        let conn = conn();
        record_code(&conn, "R1", DataType::Race, None).unwrap();
        assert!(record_code(&conn, "R1", DataType::Race, None).is_err());
    }

    #[test]
    fn test_stats() {
        let conn = conn();
        record_code(&conn, "H1", DataType::Horse, None).unwrap();
        record_code(&conn, "H2", DataType::Horse, None).unwrap();
        record_code(&conn, "J1", DataType::Jockey, None).unwrap();
        check_code(&conn, "H1", DataType::Horse).unwrap();
        check_code(&conn, "H1", DataType::Horse).unwrap();

        let stats = stats(&conn).unwrap();
        assert_eq!(stats.len(), 2);
        let horse = stats.iter().find(|s| s.category == DataType::Horse).unwrap();
        assert_eq!((horse.entries, horse.visits), (2, 2));
        let jockey = stats.iter().find(|s| s.category == DataType::Jockey).unwrap();
        assert_eq!((jockey.entries, jockey.visits), (1, 0));
    }
}
