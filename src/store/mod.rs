//! The query store: one canonical [`QueryState`] per page session.
//!
//! Every mutation goes through a method here. A mutation that actually
//! changes the state bumps the generation; a merge started at an older
//! generation is discarded when it completes.

pub mod drill;
pub mod merge;
pub mod params;
pub mod state;

pub use drill::{DrillDown, DrillOperator, append_clauses};
pub use merge::{
    CompileData, CompileError, CompileResponse, LocalCompiler, MergeError, MergeOutcome,
    MergeTicket, QueryCompiler, merge_keyword,
};
pub use params::{ApiCondition, RetrieveParams, retrieve_params};
pub use state::{Pagination, QueryState};

use crate::codec::to_api_condition;
use crate::condition::{Condition, FieldInfo, SearchMode};
use crate::config::EngineConfig;
use crate::resolver::{DatePickerValue, ResolveError, TimeRange, UrlQuery};
use crate::serializer::{self, SerializedQuery};
use crate::storage::{
    CommonFilterEntry, KeyValueStorage, PersistedDefaults, StorageError, load_defaults,
    save_defaults,
};
use chrono::{DateTime, Utc};
use merge::SingleFlight;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct QueryStore {
    state: QueryState,
    fields: Vec<FieldInfo>,
    config: EngineConfig,
    generation: u64,
    merge: SingleFlight,
}

impl QueryStore {
    pub fn new(state: QueryState, config: EngineConfig) -> Self {
        Self {
            state,
            fields: Vec::new(),
            config,
            generation: 0,
            merge: SingleFlight::default(),
        }
    }

    /// Build the initial state from a URL, falling back to the persisted
    /// defaults in `storage` and then to `config`.
    pub fn load(
        query: &UrlQuery,
        storage: &mut dyn KeyValueStorage,
        config: EngineConfig,
        now: DateTime<Utc>,
    ) -> Self {
        let persisted = load_defaults(storage, &config.storage);
        let state = QueryState::from_url(query, &persisted, &config, now);
        Self::new(state, config)
    }

    pub fn state(&self) -> &QueryState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    /// Replace the field schema of the current index set.
    pub fn set_fields(&mut self, fields: Vec<FieldInfo>) {
        self.fields = fields;
        self.generation += 1;
    }

    fn schema_type(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|info| info.field_name == field)
            .map(|info| info.field_type.as_str())
            .filter(|field_type| !field_type.is_empty())
    }

    // Swap in `next` only if it differs, so no-op mutations keep in-flight
    // merges valid.
    fn commit(&mut self, mut next: QueryState) -> bool {
        next.reconcile_mode();
        if next == self.state {
            return false;
        }
        self.state = next;
        self.generation += 1;
        debug!(generation = self.generation, "query state updated");
        true
    }

    /// Append a condition unless an identical clause is already present.
    pub fn add_condition(&mut self, mut condition: Condition) -> bool {
        if self.state.conditions.iter().any(|c| c.same_clause(&condition)) {
            debug!(field = %condition.field, "condition already present");
            return false;
        }
        if condition.field_type.is_none()
            && let Some(field_type) = self.schema_type(&condition.field)
        {
            condition.field_type = Some(field_type.to_string());
        }
        let mut next = self.state.clone();
        next.conditions.push(condition);
        self.commit(next)
    }

    /// Add clicked field values to the query. In `ui` mode each becomes a
    /// condition typed by the field schema; in `sql` mode each is appended to
    /// the keyword. Clauses already present are skipped.
    pub fn drill_down(&mut self, items: &[DrillDown]) -> bool {
        let mut next = self.state.clone();
        match next.search_mode {
            SearchMode::Ui => {
                for item in items {
                    let condition = item.to_condition(self.schema_type(&item.field));
                    if !next.conditions.iter().any(|c| c.same_clause(&condition)) {
                        next.conditions.push(condition);
                    }
                }
            }
            SearchMode::Sql => {
                let clauses: Vec<String> = items.iter().map(DrillDown::to_clause).collect();
                let Some(keyword) = append_clauses(&next.keyword, &clauses) else {
                    debug!("drill-down clauses already in the keyword");
                    return false;
                };
                next.keyword = keyword;
            }
        }
        self.commit(next)
    }

    pub fn remove_condition(&mut self, index: usize) -> Option<Condition> {
        if index >= self.state.conditions.len() {
            return None;
        }
        let mut next = self.state.clone();
        let removed = next.conditions.remove(index);
        self.commit(next);
        Some(removed)
    }

    pub fn set_condition_disabled(&mut self, index: usize, disabled: bool) -> bool {
        let mut next = self.state.clone();
        let Some(condition) = next.conditions.get_mut(index) else {
            return false;
        };
        condition.disabled = Some(disabled);
        self.commit(next)
    }

    /// Blank input clears the keyword. In `ui` mode the keyword is folded
    /// into a full-text condition right away.
    pub fn set_keyword(&mut self, keyword: &str) -> bool {
        let mut next = self.state.clone();
        next.keyword = if keyword.trim().is_empty() {
            "*".to_string()
        } else {
            keyword.to_string()
        };
        self.commit(next)
    }

    pub fn set_search_mode(&mut self, mode: SearchMode) -> bool {
        let mut next = self.state.clone();
        next.search_mode = mode;
        self.commit(next)
    }

    pub fn set_time_range(
        &mut self,
        picker: DatePickerValue,
        now: DateTime<Utc>,
    ) -> Result<bool, ResolveError> {
        let range = TimeRange::from_picker(picker, now)?;
        let mut next = self.state.clone();
        next.time_range = range;
        Ok(self.commit(next))
    }

    pub fn set_pagination(&mut self, begin: u32, size: u32) -> bool {
        let mut next = self.state.clone();
        next.pagination = Pagination { begin, size };
        self.commit(next)
    }

    /// Search several index sets at once; an empty list leaves union mode.
    pub fn set_union_index_ids(&mut self, ids: Vec<String>) -> bool {
        let mut next = self.state.clone();
        next.is_union_search = !ids.is_empty();
        next.union_index_ids = ids;
        self.commit(next)
    }

    pub fn exit_union_search(&mut self) -> bool {
        self.set_union_index_ids(Vec::new())
    }

    /// Replace the conditions with a remembered common filter.
    pub fn apply_common_filter(&mut self, entry: &CommonFilterEntry) -> bool {
        let mut next = self.state.clone();
        next.conditions = entry.addition.clone();
        self.commit(next)
    }

    /// Snapshot the active conditions as a common filter for `index_set_id`.
    pub fn common_filter_entry(
        &self,
        index_set_id: &str,
        now: DateTime<Utc>,
    ) -> CommonFilterEntry {
        CommonFilterEntry {
            index_set_id: index_set_id.to_string(),
            addition: self
                .state
                .active_conditions(&self.config.query)
                .cloned()
                .collect(),
            timestamp: now.timestamp_millis(),
        }
    }

    pub fn query_params(&self) -> RetrieveParams {
        retrieve_params(&self.state, &self.fields, &self.config.query)
    }

    pub fn url_params(&self) -> SerializedQuery {
        serializer::serialize(&self.state)
    }

    pub fn url_query_string(&self) -> String {
        serializer::query_string(&self.state)
    }

    pub fn persisted_defaults(&self) -> PersistedDefaults {
        PersistedDefaults {
            search_mode: Some(self.state.search_mode),
            start_time: Some(self.state.time_range.picker.start.clone()),
            end_time: Some(self.state.time_range.picker.end.clone()),
            page_size: Some(self.state.pagination.size),
        }
    }

    pub fn persist_defaults(&self, storage: &mut dyn KeyValueStorage) -> Result<(), StorageError> {
        save_defaults(storage, &self.config.storage, &self.persisted_defaults())
    }

    /// `sql` mode still holding active conditions that belong in the keyword.
    pub fn needs_merge(&self) -> bool {
        self.state.search_mode == SearchMode::Sql
            && self
                .state
                .active_conditions(&self.config.query)
                .next()
                .is_some()
    }

    /// Start a merge for the current generation. `None` when no merge is
    /// needed or one for this generation is already running.
    pub fn begin_merge(&mut self) -> Option<MergeTicket> {
        if !self.needs_merge() {
            return None;
        }
        if !self.merge.try_acquire(self.generation) {
            debug!(generation = self.generation, "merge already in flight");
            return None;
        }
        let addition = self
            .state
            .active_conditions(&self.config.query)
            .map(|condition| to_api_condition(condition, self.schema_type(&condition.field)))
            .collect();
        Some(MergeTicket {
            generation: self.generation,
            addition,
        })
    }

    pub fn merge_in_flight(&self) -> bool {
        self.merge.is_in_flight()
    }

    /// Give up a ticket without applying anything.
    pub fn abandon_merge(&mut self, ticket: &MergeTicket) {
        self.merge.release(ticket.generation);
    }

    /// Apply a compile response for `ticket`.
    pub fn complete_merge(
        &mut self,
        ticket: MergeTicket,
        response: CompileResponse,
    ) -> Result<MergeOutcome, MergeError> {
        self.merge.release(ticket.generation);

        if ticket.generation != self.generation {
            warn!(
                ticket = ticket.generation,
                current = self.generation,
                "discarding merge result for an outdated query"
            );
            return Ok(MergeOutcome::Stale);
        }
        if !response.result {
            return Err(MergeError::Rejected(response.message));
        }

        let keyword = merge_keyword(&response.data.querystring, &self.state.keyword);
        let rules = &self.config.query;
        let mut next = self.state.clone();
        next.conditions
            .retain(|c| c.is_disabled() || c.field == rules.ip_selector_field);
        next.keyword = keyword;
        next.search_mode = SearchMode::Sql;
        self.commit(next);

        info!(keyword = %self.state.keyword, "conditions merged into keyword");
        Ok(MergeOutcome::Applied)
    }

    /// Run a whole merge against `compiler`.
    pub fn merge_with(&mut self, compiler: &dyn QueryCompiler) -> Result<MergeOutcome, MergeError> {
        if !self.needs_merge() {
            return Ok(MergeOutcome::NotNeeded);
        }
        let Some(ticket) = self.begin_merge() else {
            return Ok(MergeOutcome::InFlight);
        };
        match compiler.compile(ticket.addition()) {
            Ok(response) => self.complete_merge(ticket, response),
            Err(err) => {
                self.abandon_merge(&ticket);
                Err(err.into())
            }
        }
    }
}
