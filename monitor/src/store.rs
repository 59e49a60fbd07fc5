//! Last-known status per tracked target.
//!
//! The store keeps two views: `committed`, the statuses as of the end of the
//! previous cycle, and `pending`, the statuses recorded during the cycle in
//! progress. [`StatusStore::previous`] only ever reads the committed view, so
//! a partially updated cycle can never leak into a comparison.
//! [`StatusStore::commit`] folds the pending view in once the cycle ends.

use std::collections::HashMap;

use tracing::warn;

use crate::types::{BuildStatus, StatusKey};

#[derive(Debug, Clone, Default)]
pub struct StatusStore {
    committed: HashMap<StatusKey, BuildStatus>,
    pending: HashMap<StatusKey, BuildStatus>,
}

impl StatusStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Status of `key` at the end of the previous cycle.
    #[must_use]
    pub fn previous(&self, key: StatusKey) -> BuildStatus {
        self.committed.get(&key).copied().unwrap_or_default()
    }

    /// Records the status observed for `key` in the current cycle.
    ///
    /// Only the first record per key and cycle is kept.
    pub fn record(&mut self, key: StatusKey, status: BuildStatus) {
        if let Some(existing) = self.pending.get(&key) {
            warn!(
                key = ?key,
                kept = ?existing,
                ignored = ?status,
                "Status already recorded this cycle"
            );
            return;
        }
        self.pending.insert(key, status);
    }

    /// Ends the current cycle, making recorded statuses visible to
    /// [`previous`](Self::previous).
    pub fn commit(&mut self) {
        self.committed.extend(self.pending.drain());
    }

    /// Forgets every project entry, keeping the index aggregate.
    ///
    /// Used when the project directory is rebuilt and slots change meaning.
    pub fn reset_projects(&mut self) {
        self.committed.retain(|key, _| matches!(key, StatusKey::Index));
        self.pending.retain(|key, _| matches!(key, StatusKey::Index));
    }
}
