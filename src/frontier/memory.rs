//! In-memory frontier backend
//!
//! An append-only sequence of records plus a monotonically advancing
//! claim cursor. Claiming never revisits earlier positions, so records
//! left in a non-terminal state (e.g. Error) are never retried. Dedup is
//! a linear scan over all existing records: O(n) per add, acceptable for
//! the crawl sizes this backend is meant for.

use crate::frontier::{Frontier, FrontierError, WorkRecord, WorkStatus};
use chrono::Utc;
use std::sync::Mutex;
use url::Url;

/// In-memory frontier backend
pub struct MemoryFrontier {
    state: Mutex<MemoryState>,
}

struct MemoryState {
    initialized: bool,
    records: Vec<WorkRecord>,
    /// Index of the next position the claim cursor will examine
    next_waiting: usize,
}

impl MemoryFrontier {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                initialized: false,
                records: Vec::new(),
                next_waiting: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A poisoned lock means a panic while holding it; the state is
        // still structurally sound, so keep serving.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryFrontier {
    fn default() -> Self {
        Self::new()
    }
}

impl Frontier for MemoryFrontier {
    fn init(&self) -> Result<(), FrontierError> {
        let mut state = self.lock();
        if state.initialized {
            return Err(FrontierError::AlreadyInitialized);
        }
        state.initialized = true;
        Ok(())
    }

    fn add(
        &self,
        url: &Url,
        source: Option<&WorkRecord>,
        status: WorkStatus,
    ) -> Result<bool, FrontierError> {
        let mut state = self.lock();
        if !state.initialized {
            return Err(FrontierError::NotInitialized);
        }
        if state.records.iter().any(|r| r.url == *url) {
            return Ok(false);
        }
        let record = WorkRecord {
            id: state.records.len() as i64,
            host_id: None,
            url: url.clone(),
            status,
            depth: source.map(|s| s.depth + 1).unwrap_or(0),
            source_id: source.map(|s| s.id),
            parser_id: None,
            last_update: Utc::now(),
        };
        state.records.push(record);
        Ok(true)
    }

    fn is_empty(&self) -> Result<bool, FrontierError> {
        let state = self.lock();
        if !state.initialized {
            return Err(FrontierError::NotInitialized);
        }
        let cursor = state.next_waiting;
        Ok(!state.records[cursor.min(state.records.len())..]
            .iter()
            .any(|r| r.status == WorkStatus::Waiting))
    }

    fn get_work(&self) -> Result<Option<WorkRecord>, FrontierError> {
        let mut state = self.lock();
        if !state.initialized {
            return Err(FrontierError::NotInitialized);
        }
        while state.next_waiting < state.records.len() {
            let index = state.next_waiting;
            state.next_waiting += 1;
            let record = &mut state.records[index];
            if record.status == WorkStatus::Waiting {
                record.status = WorkStatus::Active;
                record.last_update = Utc::now();
                return Ok(Some(record.clone()));
            }
        }
        Ok(None)
    }

    fn update_status(&self, id: i64, status: WorkStatus) -> Result<(), FrontierError> {
        let mut state = self.lock();
        let record = usize::try_from(id)
            .ok()
            .and_then(|i| state.records.get_mut(i))
            .ok_or(FrontierError::RecordNotFound(id))?;
        if !record.status.can_transition_to(status) {
            return Err(FrontierError::InvalidTransition {
                from: record.status,
                to: status,
            });
        }
        record.status = status;
        record.last_update = Utc::now();
        Ok(())
    }

    fn clear(&self) -> Result<(), FrontierError> {
        let mut state = self.lock();
        state.records.clear();
        state.next_waiting = 0;
        Ok(())
    }

    fn shutdown(&self) {
        let state = self.lock();
        let mut waiting = 0usize;
        let mut success = 0usize;
        let mut error = 0usize;
        let mut active = 0usize;
        for record in &state.records {
            tracing::debug!("{:4} {:?} {} {}", record.id, record.source_id, record.status, record.url);
            match record.status {
                WorkStatus::Waiting => waiting += 1,
                WorkStatus::Active => active += 1,
                WorkStatus::Success => success += 1,
                WorkStatus::Error => error += 1,
            }
        }
        tracing::info!(
            "frontier shutdown: {} records ({} success, {} error, {} waiting, {} active)",
            state.records.len(),
            success,
            error,
            waiting,
            active
        );
    }

    fn snapshot(&self) -> Result<Vec<WorkRecord>, FrontierError> {
        Ok(self.lock().records.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frontier() -> MemoryFrontier {
        let f = MemoryFrontier::new();
        f.init().unwrap();
        f
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn init_twice_fails() {
        let f = MemoryFrontier::new();
        f.init().unwrap();
        assert!(matches!(f.init(), Err(FrontierError::AlreadyInitialized)));
    }

    #[test]
    fn add_before_init_fails() {
        let f = MemoryFrontier::new();
        let result = f.add(&url("http://a/"), None, WorkStatus::Waiting);
        assert!(matches!(result, Err(FrontierError::NotInitialized)));
    }

    #[test]
    fn add_is_idempotent_by_url() {
        let f = frontier();
        assert!(f.add(&url("http://a/"), None, WorkStatus::Waiting).unwrap());
        assert!(!f.add(&url("http://a/"), None, WorkStatus::Waiting).unwrap());
        assert_eq!(f.snapshot().unwrap().len(), 1);
    }

    #[test]
    fn duplicate_rejected_regardless_of_status() {
        let f = frontier();
        f.add(&url("http://a/"), None, WorkStatus::Waiting).unwrap();
        let claimed = f.get_work().unwrap().unwrap();
        f.update_status(claimed.id, WorkStatus::Success).unwrap();
        // Completed records still block re-insertion.
        assert!(!f.add(&url("http://a/"), None, WorkStatus::Waiting).unwrap());
    }

    #[test]
    fn depth_is_zero_for_seeds_and_incremented_for_children() {
        let f = frontier();
        f.add(&url("http://a/"), None, WorkStatus::Waiting).unwrap();
        let seed = f.get_work().unwrap().unwrap();
        assert_eq!(seed.depth, 0);

        f.add(&url("http://a/child"), Some(&seed), WorkStatus::Waiting)
            .unwrap();
        let child = f.get_work().unwrap().unwrap();
        assert_eq!(child.depth, 1);
        assert_eq!(child.source_id, Some(seed.id));
    }

    #[test]
    fn get_work_claims_each_record_once() {
        let f = frontier();
        f.add(&url("http://a/"), None, WorkStatus::Waiting).unwrap();
        f.add(&url("http://b/"), None, WorkStatus::Waiting).unwrap();

        let first = f.get_work().unwrap().unwrap();
        let second = f.get_work().unwrap().unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(first.status, WorkStatus::Active);
        assert!(f.get_work().unwrap().is_none());
    }

    #[test]
    fn claim_cursor_never_revisits_error_records() {
        let f = frontier();
        f.add(&url("http://a/"), None, WorkStatus::Waiting).unwrap();
        let claimed = f.get_work().unwrap().unwrap();
        f.update_status(claimed.id, WorkStatus::Error).unwrap();

        // The failed record is behind the cursor and is never retried.
        assert!(f.get_work().unwrap().is_none());
        assert!(f.is_empty().unwrap());
    }

    #[test]
    fn get_work_skips_records_inserted_in_terminal_status() {
        let f = frontier();
        f.add(&url("http://a/"), None, WorkStatus::Waiting).unwrap();
        let seed = f.get_work().unwrap().unwrap();
        // A redirect target is recorded as already completed.
        f.add(&url("http://b/"), Some(&seed), WorkStatus::Success)
            .unwrap();

        assert!(f.get_work().unwrap().is_none());
        assert!(f.is_empty().unwrap());
    }

    #[test]
    fn is_empty_reflects_waiting_records_only() {
        let f = frontier();
        assert!(f.is_empty().unwrap());
        f.add(&url("http://a/"), None, WorkStatus::Waiting).unwrap();
        assert!(!f.is_empty().unwrap());
        f.get_work().unwrap().unwrap();
        assert!(f.is_empty().unwrap());
    }

    #[test]
    fn invalid_transition_rejected() {
        let f = frontier();
        f.add(&url("http://a/"), None, WorkStatus::Waiting).unwrap();
        let claimed = f.get_work().unwrap().unwrap();
        f.update_status(claimed.id, WorkStatus::Success).unwrap();

        let result = f.update_status(claimed.id, WorkStatus::Waiting);
        assert!(matches!(
            result,
            Err(FrontierError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn update_status_unknown_id_fails() {
        let f = frontier();
        assert!(matches!(
            f.update_status(42, WorkStatus::Success),
            Err(FrontierError::RecordNotFound(42))
        ));
    }

    #[test]
    fn clear_resets_records_and_cursor() {
        let f = frontier();
        f.add(&url("http://a/"), None, WorkStatus::Waiting).unwrap();
        f.get_work().unwrap().unwrap();
        f.clear().unwrap();
        assert!(f.snapshot().unwrap().is_empty());
        assert!(f.is_empty().unwrap());

        f.add(&url("http://a/"), None, WorkStatus::Waiting).unwrap();
        assert!(f.get_work().unwrap().is_some());
    }
}
