//! Schema for the durable frontier table

/// SQL schema for the work table
///
/// `url_hash` carries a 64-bit digest of the URL so dedup lookups hit an
/// index instead of scanning URL text; matches are always re-verified
/// against the literal URL.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS spider_work (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    host_id INTEGER,
    url TEXT NOT NULL,
    status TEXT NOT NULL,
    depth INTEGER NOT NULL,
    source_id INTEGER,
    parser_id INTEGER,
    last_update TEXT NOT NULL,
    url_hash INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_work_url_hash ON spider_work(url_hash);
CREATE INDEX IF NOT EXISTS idx_work_status ON spider_work(status);
"#;

/// Initializes the frontier schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_initializes() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(initialize_schema(&conn).is_ok());
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        assert!(initialize_schema(&conn).is_ok());
    }

    #[test]
    fn test_work_table_exists_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='spider_work'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
