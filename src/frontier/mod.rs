//! The crawl frontier: a de-duplicated, status-tracked store of work
//!
//! A frontier is essentially a list of URLs along with their processing
//! status: waiting, active, successfully completed, or failed. Two
//! backends are provided: an in-memory list for single-run crawls and a
//! durable SQLite table with a bounded read-ahead cache. Backends are
//! selected by a factory keyed on configuration, resolved once at
//! startup.

mod memory;
mod schema;
mod sqlite;

pub use memory::MemoryFrontier;
pub use sqlite::SqliteFrontier;

use crate::config::Config;
use crate::ConfigError;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Processing status of a work record
///
/// Transitions are monotonic: Waiting -> Active -> {Success, Error},
/// never reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkStatus {
    /// Waiting to be processed
    Waiting,
    /// Currently being processed
    Active,
    /// Successfully processed
    Success,
    /// Unsuccessfully processed
    Error,
}

impl WorkStatus {
    /// Single-character encoding used by the durable backend
    pub fn as_char(self) -> char {
        match self {
            WorkStatus::Waiting => 'W',
            WorkStatus::Active => 'A',
            WorkStatus::Success => 'S',
            WorkStatus::Error => 'E',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'W' => Some(WorkStatus::Waiting),
            'A' => Some(WorkStatus::Active),
            'S' => Some(WorkStatus::Success),
            'E' => Some(WorkStatus::Error),
            _ => None,
        }
    }

    /// Whether a transition from `self` to `next` is allowed
    pub fn can_transition_to(self, next: WorkStatus) -> bool {
        matches!(
            (self, next),
            (WorkStatus::Waiting, WorkStatus::Active)
                | (WorkStatus::Active, WorkStatus::Success)
                | (WorkStatus::Active, WorkStatus::Error)
        )
    }
}

impl std::fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// One unit of crawl work: a URL plus its tracking metadata
///
/// Identity is assigned by the frontier at insertion. Depth is 0 for
/// seed records and `source.depth + 1` otherwise, fixed at creation.
#[derive(Debug, Clone)]
pub struct WorkRecord {
    pub id: i64,
    /// Reserved host grouping column carried by the durable backend
    pub host_id: Option<i64>,
    pub url: Url,
    pub status: WorkStatus,
    pub depth: u32,
    /// Identity of the record this URL was discovered on
    pub source_id: Option<i64>,
    /// Reserved identifier of the parser used to scan this page
    pub parser_id: Option<i64>,
    pub last_update: DateTime<Utc>,
}

impl std::fmt::Display for WorkRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.url, self.id)
    }
}

/// Errors from frontier backends
#[derive(Debug, Error)]
pub enum FrontierError {
    #[error("frontier is already initialized")]
    AlreadyInitialized,

    #[error("frontier is not initialized")]
    NotInitialized,

    #[error("record not found: {0}")]
    RecordNotFound(i64),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: WorkStatus, to: WorkStatus },

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// The de-duplicated, status-tracked store of discovered work
///
/// Implementations must guarantee atomicity of `add`
/// (check-duplicate-then-insert) and `get_work` (claim-next-waiting)
/// under concurrent callers: workers call `add` concurrently while the
/// scheduler calls `get_work`.
pub trait Frontier: Send + Sync {
    /// One-time setup. Fails with `AlreadyInitialized` on a second call.
    fn init(&self) -> Result<(), FrontierError>;

    /// Inserts a new record unless one with an equal URL already exists.
    ///
    /// Dedup is exact: a hash-indexed backend re-verifies the literal URL
    /// so hash collisions cannot cause false positives. Depth is computed
    /// from `source`; enforcing a maximum depth is the scheduler's
    /// responsibility, not the frontier's. Returns false on duplicate or
    /// rejection.
    fn add(
        &self,
        url: &Url,
        source: Option<&WorkRecord>,
        status: WorkStatus,
    ) -> Result<bool, FrontierError>;

    /// True iff no Waiting record is currently available.
    ///
    /// A durable backend may refill its bounded read-ahead cache here;
    /// callers must tolerate that side effect.
    fn is_empty(&self) -> Result<bool, FrontierError>;

    /// Atomically claims one Waiting record, transitioning it to Active.
    ///
    /// Returns None when nothing is available. No two calls ever claim
    /// the same record.
    fn get_work(&self) -> Result<Option<WorkRecord>, FrontierError>;

    /// Marks a terminal (or claimed) status for a record.
    fn update_status(&self, id: i64, status: WorkStatus) -> Result<(), FrontierError>;

    /// Removes all records.
    fn clear(&self) -> Result<(), FrontierError>;

    /// Releases backend resources. Safe to call more than once.
    fn shutdown(&self);

    /// Full dump of all records, for diagnostics and tests.
    fn snapshot(&self) -> Result<Vec<WorkRecord>, FrontierError>;
}

/// Builds and initializes the frontier backend named by the configuration
///
/// Resolved once at startup; an unknown selector or an unavailable
/// database is a fatal `ConfigError`.
pub fn create_frontier(config: &Config) -> Result<Arc<dyn Frontier>, ConfigError> {
    let frontier: Arc<dyn Frontier> = match config.frontier.backend.as_str() {
        "memory" => Arc::new(MemoryFrontier::new()),
        "sqlite" => {
            // Read-ahead cache sized a little beyond the pool queue so a
            // full pool never starves the scheduler of claimable work.
            let cache_capacity = config.pool.queue_size as usize + 10;
            let backend =
                SqliteFrontier::new(Path::new(&config.frontier.database_path), cache_capacity)
                    .map_err(|e| ConfigError::Backend(e.to_string()))?;
            Arc::new(backend)
        }
        other => return Err(ConfigError::UnknownBackend(other.to_string())),
    };
    frontier
        .init()
        .map_err(|e| ConfigError::Backend(e.to_string()))?;
    Ok(frontier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_char_round_trip() {
        for status in [
            WorkStatus::Waiting,
            WorkStatus::Active,
            WorkStatus::Success,
            WorkStatus::Error,
        ] {
            assert_eq!(WorkStatus::from_char(status.as_char()), Some(status));
        }
        assert_eq!(WorkStatus::from_char('X'), None);
    }

    #[test]
    fn status_transitions_are_monotonic() {
        use WorkStatus::*;
        assert!(Waiting.can_transition_to(Active));
        assert!(Active.can_transition_to(Success));
        assert!(Active.can_transition_to(Error));

        assert!(!Active.can_transition_to(Waiting));
        assert!(!Success.can_transition_to(Active));
        assert!(!Error.can_transition_to(Waiting));
        assert!(!Success.can_transition_to(Error));
    }

    #[test]
    fn factory_rejects_unknown_backend() {
        let mut config = Config::default();
        config.frontier.backend = "carrier-pigeon".to_string();
        assert!(matches!(
            create_frontier(&config),
            Err(ConfigError::UnknownBackend(_))
        ));
    }

    #[test]
    fn factory_builds_memory_backend() {
        let config = Config::default();
        let frontier = create_frontier(&config).unwrap();
        assert!(frontier.is_empty().unwrap());
    }
}
