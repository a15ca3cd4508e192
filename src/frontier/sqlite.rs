//! Durable frontier backend on SQLite
//!
//! Records live in a single `spider_work` table. Dedup goes through an
//! indexed `url_hash` lookup followed by a literal URL comparison, so a
//! hash collision can never cause a false duplicate. Claiming pulls a
//! bounded batch of Waiting rows into an in-memory read-ahead cache,
//! marking them Active in the same locked section; ordering among
//! equally-eligible rows is storage-defined.
//!
//! A single process owns the database: concurrent dedup/claim races
//! between independent crawler processes sharing one table are not
//! defended against.

use crate::frontier::schema::initialize_schema;
use crate::frontier::{Frontier, FrontierError, WorkRecord, WorkStatus};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use url::Url;

/// Maximum URL length the work table accepts
pub const MAX_URL_LEN: usize = 255;

/// SQLite frontier backend
pub struct SqliteFrontier {
    state: Mutex<SqliteState>,
    cache_capacity: usize,
}

struct SqliteState {
    conn: Option<Connection>,
    initialized: bool,
    cache: VecDeque<WorkRecord>,
}

/// 64-bit dedup digest of a URL (first 8 bytes of its SHA-256)
fn url_hash(url: &str) -> i64 {
    let digest = Sha256::digest(url.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(prefix)
}

impl SqliteFrontier {
    /// Opens (creating if necessary) the work database at `path`
    pub fn new(path: &Path, cache_capacity: usize) -> Result<Self, FrontierError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        Ok(Self::with_connection(conn, cache_capacity))
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory(cache_capacity: usize) -> Result<Self, FrontierError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::with_connection(conn, cache_capacity))
    }

    fn with_connection(conn: Connection, cache_capacity: usize) -> Self {
        Self {
            state: Mutex::new(SqliteState {
                conn: Some(conn),
                initialized: false,
                cache: VecDeque::with_capacity(cache_capacity),
            }),
            cache_capacity,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SqliteState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Pulls up to `cache_capacity` Waiting rows into the cache, claiming
    /// them (status -> Active) in the same locked section so no row can
    /// be handed out twice.
    fn refill_cache(state: &mut SqliteState, capacity: usize) -> Result<(), FrontierError> {
        if !state.cache.is_empty() {
            return Ok(());
        }
        let conn = state.conn.as_ref().ok_or(FrontierError::NotInitialized)?;

        let mut fetched = Vec::new();
        {
            let mut stmt = conn.prepare(
                "SELECT id, host_id, url, status, depth, source_id, parser_id, last_update
                 FROM spider_work WHERE status = 'W' ORDER BY id LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![capacity as i64], row_to_raw)?;
            for row in rows {
                let raw = row?;
                match raw.into_record() {
                    Some(record) => fetched.push(record),
                    None => tracing::warn!("skipping work row with unparseable URL"),
                }
            }
        }

        let now = Utc::now().to_rfc3339();
        for record in &mut fetched {
            conn.execute(
                "UPDATE spider_work SET status = 'A', last_update = ?1 WHERE id = ?2",
                params![now, record.id],
            )?;
            record.status = WorkStatus::Active;
        }
        state.cache.extend(fetched);
        Ok(())
    }
}

/// Row image before URL parsing
struct RawRecord {
    id: i64,
    host_id: Option<i64>,
    url: String,
    status: String,
    depth: i64,
    source_id: Option<i64>,
    parser_id: Option<i64>,
    last_update: String,
}

impl RawRecord {
    fn into_record(self) -> Option<WorkRecord> {
        let url = Url::parse(&self.url).ok()?;
        let status = self
            .status
            .chars()
            .next()
            .and_then(WorkStatus::from_char)
            .unwrap_or(WorkStatus::Waiting);
        let last_update = DateTime::parse_from_rfc3339(&self.last_update)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        Some(WorkRecord {
            id: self.id,
            host_id: self.host_id,
            url,
            status,
            depth: u32::try_from(self.depth).unwrap_or(0),
            source_id: self.source_id,
            parser_id: self.parser_id,
            last_update,
        })
    }
}

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok(RawRecord {
        id: row.get(0)?,
        host_id: row.get(1)?,
        url: row.get(2)?,
        status: row.get(3)?,
        depth: row.get(4)?,
        source_id: row.get(5)?,
        parser_id: row.get(6)?,
        last_update: row.get(7)?,
    })
}

impl Frontier for SqliteFrontier {
    fn init(&self) -> Result<(), FrontierError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        if state.initialized {
            return Err(FrontierError::AlreadyInitialized);
        }
        let conn = state.conn.as_ref().ok_or(FrontierError::NotInitialized)?;
        initialize_schema(conn)?;
        state.initialized = true;
        Ok(())
    }

    fn add(
        &self,
        url: &Url,
        source: Option<&WorkRecord>,
        status: WorkStatus,
    ) -> Result<bool, FrontierError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        if !state.initialized {
            return Err(FrontierError::NotInitialized);
        }
        let conn = state.conn.as_ref().ok_or(FrontierError::NotInitialized)?;

        let url_string = url.as_str();
        if url_string.len() > MAX_URL_LEN {
            tracing::debug!("rejecting over-long URL ({} chars): {}", url_string.len(), url);
            return Ok(false);
        }
        let hash = url_hash(url_string);

        // The hash narrows the search; the literal comparison decides.
        {
            let mut stmt =
                conn.prepare("SELECT url FROM spider_work WHERE url_hash = ?1")?;
            let mut rows = stmt.query(params![hash])?;
            while let Some(row) = rows.next()? {
                let existing: String = row.get(0)?;
                if existing == url_string {
                    return Ok(false);
                }
            }
        }

        let depth = source.map(|s| s.depth + 1).unwrap_or(0);
        let source_id = source.map(|s| s.id);
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO spider_work
             (host_id, url, status, depth, source_id, parser_id, last_update, url_hash)
             VALUES (NULL, ?1, ?2, ?3, ?4, NULL, ?5, ?6)",
            params![
                url_string,
                status.as_char().to_string(),
                depth,
                source_id,
                now,
                hash
            ],
        )?;
        Ok(true)
    }

    fn is_empty(&self) -> Result<bool, FrontierError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        if !state.initialized {
            return Err(FrontierError::NotInitialized);
        }
        Self::refill_cache(state, self.cache_capacity)?;
        Ok(state.cache.is_empty())
    }

    fn get_work(&self) -> Result<Option<WorkRecord>, FrontierError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        if !state.initialized {
            return Err(FrontierError::NotInitialized);
        }
        Self::refill_cache(state, self.cache_capacity)?;
        Ok(state.cache.pop_front())
    }

    fn update_status(&self, id: i64, status: WorkStatus) -> Result<(), FrontierError> {
        let guard = self.lock();
        let conn = guard.conn.as_ref().ok_or(FrontierError::NotInitialized)?;

        let current: Option<String> = conn
            .query_row(
                "SELECT status FROM spider_work WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let current = current
            .and_then(|s| s.chars().next())
            .and_then(WorkStatus::from_char)
            .ok_or(FrontierError::RecordNotFound(id))?;
        if !current.can_transition_to(status) {
            return Err(FrontierError::InvalidTransition {
                from: current,
                to: status,
            });
        }

        conn.execute(
            "UPDATE spider_work SET status = ?1, last_update = ?2 WHERE id = ?3",
            params![status.as_char().to_string(), Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    fn clear(&self) -> Result<(), FrontierError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let conn = state.conn.as_ref().ok_or(FrontierError::NotInitialized)?;
        conn.execute("DELETE FROM spider_work", [])?;
        state.cache.clear();
        Ok(())
    }

    fn shutdown(&self) {
        let mut guard = self.lock();
        if let Some(conn) = guard.conn.take() {
            let processed: i64 = conn
                .query_row("SELECT COUNT(*) FROM spider_work", [], |row| row.get(0))
                .unwrap_or(0);
            tracing::info!("frontier shutdown: {} records in work table", processed);
        }
        guard.cache.clear();
    }

    fn snapshot(&self) -> Result<Vec<WorkRecord>, FrontierError> {
        let guard = self.lock();
        let conn = guard.conn.as_ref().ok_or(FrontierError::NotInitialized)?;
        let mut stmt = conn.prepare(
            "SELECT id, host_id, url, status, depth, source_id, parser_id, last_update
             FROM spider_work ORDER BY id",
        )?;
        let rows = stmt.query_map([], row_to_raw)?;
        let mut records = Vec::new();
        for row in rows {
            if let Some(record) = row?.into_record() {
                records.push(record);
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frontier() -> SqliteFrontier {
        let f = SqliteFrontier::new_in_memory(8).unwrap();
        f.init().unwrap();
        f
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn init_twice_fails() {
        let f = SqliteFrontier::new_in_memory(8).unwrap();
        f.init().unwrap();
        assert!(matches!(f.init(), Err(FrontierError::AlreadyInitialized)));
    }

    #[test]
    fn add_is_idempotent_by_url() {
        let f = frontier();
        assert!(f.add(&url("http://a/"), None, WorkStatus::Waiting).unwrap());
        assert!(!f.add(&url("http://a/"), None, WorkStatus::Waiting).unwrap());
        assert_eq!(f.snapshot().unwrap().len(), 1);
    }

    #[test]
    fn hash_collision_does_not_fake_a_duplicate() {
        let f = frontier();
        let new_url = url("http://collider.test/page");

        // Plant a row whose url_hash equals the new URL's digest but
        // whose text differs: only the literal comparison may decide.
        {
            let guard = f.lock();
            let conn = guard.conn.as_ref().unwrap();
            conn.execute(
                "INSERT INTO spider_work
                 (host_id, url, status, depth, source_id, parser_id, last_update, url_hash)
                 VALUES (NULL, 'http://other.test/', 'W', 0, NULL, NULL, ?1, ?2)",
                params![Utc::now().to_rfc3339(), url_hash(new_url.as_str())],
            )
            .unwrap();
        }

        assert!(f.add(&new_url, None, WorkStatus::Waiting).unwrap());
        assert_eq!(f.snapshot().unwrap().len(), 2);
    }

    #[test]
    fn over_long_url_rejected() {
        let f = frontier();
        let long = format!("http://a/{}", "x".repeat(MAX_URL_LEN));
        assert!(!f.add(&url(&long), None, WorkStatus::Waiting).unwrap());
        assert!(f.snapshot().unwrap().is_empty());
    }

    #[test]
    fn get_work_claims_and_marks_active() {
        let f = frontier();
        f.add(&url("http://a/"), None, WorkStatus::Waiting).unwrap();

        let claimed = f.get_work().unwrap().unwrap();
        assert_eq!(claimed.status, WorkStatus::Active);

        let persisted = &f.snapshot().unwrap()[0];
        assert_eq!(persisted.status, WorkStatus::Active);
        assert!(f.get_work().unwrap().is_none());
    }

    #[test]
    fn claim_does_not_hand_out_the_same_record_twice() {
        let f = frontier();
        for i in 0..20 {
            f.add(&url(&format!("http://a/{}", i)), None, WorkStatus::Waiting)
                .unwrap();
        }
        let mut seen = std::collections::HashSet::new();
        while let Some(record) = f.get_work().unwrap() {
            assert!(seen.insert(record.id), "record {} claimed twice", record.id);
        }
        assert_eq!(seen.len(), 20);
    }

    #[test]
    fn records_added_in_terminal_status_are_not_claimed() {
        let f = frontier();
        f.add(&url("http://a/"), None, WorkStatus::Waiting).unwrap();
        let seed = f.get_work().unwrap().unwrap();
        f.add(&url("http://b/"), Some(&seed), WorkStatus::Success)
            .unwrap();

        assert!(f.get_work().unwrap().is_none());
        assert!(f.is_empty().unwrap());
    }

    #[test]
    fn depth_and_source_tracked() {
        let f = frontier();
        f.add(&url("http://a/"), None, WorkStatus::Waiting).unwrap();
        let seed = f.get_work().unwrap().unwrap();
        f.add(&url("http://a/child"), Some(&seed), WorkStatus::Waiting)
            .unwrap();

        let child = f.get_work().unwrap().unwrap();
        assert_eq!(child.depth, 1);
        assert_eq!(child.source_id, Some(seed.id));
    }

    #[test]
    fn update_status_enforces_monotonic_transitions() {
        let f = frontier();
        f.add(&url("http://a/"), None, WorkStatus::Waiting).unwrap();
        let claimed = f.get_work().unwrap().unwrap();

        f.update_status(claimed.id, WorkStatus::Success).unwrap();
        assert!(matches!(
            f.update_status(claimed.id, WorkStatus::Active),
            Err(FrontierError::InvalidTransition { .. })
        ));
        assert!(matches!(
            f.update_status(9999, WorkStatus::Success),
            Err(FrontierError::RecordNotFound(9999))
        ));
    }

    #[test]
    fn is_empty_refills_cache_as_side_effect() {
        let f = frontier();
        f.add(&url("http://a/"), None, WorkStatus::Waiting).unwrap();

        assert!(!f.is_empty().unwrap());
        // The row is now cached and claimed; the table shows it Active.
        assert_eq!(f.snapshot().unwrap()[0].status, WorkStatus::Active);
        assert!(f.get_work().unwrap().is_some());
        assert!(f.is_empty().unwrap());
    }

    #[test]
    fn cache_is_bounded() {
        let f = SqliteFrontier::new_in_memory(3).unwrap();
        f.init().unwrap();
        for i in 0..10 {
            f.add(&url(&format!("http://a/{}", i)), None, WorkStatus::Waiting)
                .unwrap();
        }
        assert!(!f.is_empty().unwrap());
        // Only one cache batch has been claimed so far.
        let active = f
            .snapshot()
            .unwrap()
            .iter()
            .filter(|r| r.status == WorkStatus::Active)
            .count();
        assert_eq!(active, 3);
    }

    #[test]
    fn clear_removes_everything() {
        let f = frontier();
        f.add(&url("http://a/"), None, WorkStatus::Waiting).unwrap();
        f.clear().unwrap();
        assert!(f.snapshot().unwrap().is_empty());
        assert!(f.is_empty().unwrap());
    }
}
