//! Per-connection operation registry

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Lifecycle state of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Pending,
    Running,
    Canceled,
    Completed,
}

impl OperationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationState::Canceled | OperationState::Completed)
    }
}

/// A single operation and its lifecycle state
///
/// The state only moves forward: `Pending -> Running -> Completed`, or to
/// `Canceled` from either non-terminal state.
#[derive(Debug)]
pub struct OperationRecord {
    pub id: String,
    state: Mutex<OperationState>,
}

impl OperationRecord {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            state: Mutex::new(OperationState::Pending),
        }
    }

    pub fn state(&self) -> OperationState {
        *self.state.lock()
    }

    pub fn is_canceled(&self) -> bool {
        self.state() == OperationState::Canceled
    }

    /// Mark as running. Returns false if the record had already left `Pending`.
    pub fn start(&self) -> bool {
        self.transition(|s| s == OperationState::Pending, OperationState::Running)
    }

    /// Mark as completed. Returns false unless the record was running.
    pub fn complete(&self) -> bool {
        self.transition(|s| s == OperationState::Running, OperationState::Completed)
    }

    /// Mark as canceled. Returns false if the record was already terminal.
    pub fn cancel(&self) -> bool {
        self.transition(|s| !s.is_terminal(), OperationState::Canceled)
    }

    fn transition(&self, allowed: impl Fn(OperationState) -> bool, to: OperationState) -> bool {
        let mut state = self.state.lock();
        if allowed(*state) {
            *state = to;
            true
        } else {
            false
        }
    }
}

/// Operations started on one connection, keyed by operation id
///
/// Ids are caller-chosen and not required to be unique, so one id may map to
/// several records.
#[derive(Debug, Default)]
pub struct OperationRegistry {
    operations: DashMap<String, Vec<Arc<OperationRecord>>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new operation
    ///
    /// Finished records are dropped first, under every id, so the table only
    /// holds live operations plus whatever finished since the last register.
    pub fn register(&self, id: &str) -> Arc<OperationRecord> {
        self.prune();
        let record = Arc::new(OperationRecord::new(id));
        self.operations
            .entry(id.to_string())
            .or_default()
            .push(Arc::clone(&record));
        record
    }

    fn prune(&self) {
        self.operations.retain(|_, records| {
            records.retain(|r| !r.state().is_terminal());
            !records.is_empty()
        });
    }

    /// Cancel every live operation with this id
    ///
    /// Returns the number of records that moved to `Canceled`.
    pub fn cancel(&self, id: &str) -> usize {
        self.operations
            .get(id)
            .map(|records| records.iter().filter(|r| r.cancel()).count())
            .unwrap_or(0)
    }

    /// Cancel everything on this connection
    pub fn cancel_all(&self) -> usize {
        self.operations
            .iter()
            .map(|entry| entry.value().iter().filter(|r| r.cancel()).count())
            .sum()
    }

    /// Current state of the most recent record for an id
    pub fn state(&self, id: &str) -> Option<OperationState> {
        self.operations
            .get(id)
            .and_then(|records| records.last().map(|r| r.state()))
    }

    /// Number of records held, finished or not
    pub fn len(&self) -> usize {
        self.operations.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of non-terminal operations
    pub fn active_count(&self) -> usize {
        self.operations
            .iter()
            .map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|r| !r.state().is_terminal())
                    .count()
            })
            .sum()
    }
}
