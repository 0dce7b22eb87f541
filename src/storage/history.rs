use super::{KeyValueStorage, StorageError};
use crate::condition::Condition;
use crate::config::StorageRules;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Common-filter preset remembered for one index set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonFilterEntry {
    #[serde(alias = "indexSetId", alias = "index_id")]
    pub index_set_id: String,
    #[serde(default)]
    pub addition: Vec<Condition>,
    /// Last use, epoch milliseconds; drives eviction.
    #[serde(alias = "time")]
    pub timestamp: i64,
}

/// Bounded per-index-set history, least recently used evicted first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonFilterHistory {
    entries: Vec<CommonFilterEntry>,
    limit: usize,
}

impl CommonFilterHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            limit,
        }
    }

    /// Read the stored list; unreadable data starts an empty history.
    pub fn load(storage: &dyn KeyValueStorage, rules: &StorageRules) -> Self {
        let mut history = Self::new(rules.history_limit);
        let raw = match storage.get(&rules.history_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return history,
            Err(err) => {
                warn!(error = %err, "cannot read common filter history");
                return history;
            }
        };

        match serde_json::from_str::<Vec<CommonFilterEntry>>(&raw) {
            Ok(entries) => {
                for entry in entries {
                    history.upsert(entry);
                }
            }
            Err(err) => warn!(error = %err, "common filter history is corrupt, starting over"),
        }
        history
    }

    pub fn save(
        &self,
        storage: &mut dyn KeyValueStorage,
        rules: &StorageRules,
    ) -> Result<(), StorageError> {
        storage.set(&rules.history_key, serde_json::to_string(&self.entries)?)
    }

    /// Insert or refresh the entry for its index set. Returns the entry
    /// evicted to stay within the limit, if any.
    pub fn upsert(&mut self, entry: CommonFilterEntry) -> Option<CommonFilterEntry> {
        self.entries
            .retain(|existing| existing.index_set_id != entry.index_set_id);
        self.entries.push(entry);

        if self.entries.len() <= self.limit {
            return None;
        }
        let oldest = self
            .entries
            .iter()
            .enumerate()
            .min_by_key(|(_, entry)| entry.timestamp)
            .map(|(idx, _)| idx)?;
        Some(self.entries.remove(oldest))
    }

    /// Mark an entry as used at `timestamp`.
    pub fn touch(&mut self, index_set_id: &str, timestamp: i64) -> bool {
        match self
            .entries
            .iter_mut()
            .find(|entry| entry.index_set_id == index_set_id)
        {
            Some(entry) => {
                entry.timestamp = timestamp;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, index_set_id: &str) -> Option<&CommonFilterEntry> {
        self.entries
            .iter()
            .find(|entry| entry.index_set_id == index_set_id)
    }

    pub fn entries(&self) -> &[CommonFilterEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
