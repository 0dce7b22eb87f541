use crate::codec::FULL_TEXT_FIELD;
use crate::condition::{Condition, SearchMode};
use crate::config::{EngineConfig, QueryRules};
use crate::resolver::{
    DatePickerValue, QueryResolver, RawPair, ResolvedQuery, TimeRange, UrlField, UrlQuery,
    is_meaningful_keyword,
};
use crate::storage::PersistedDefaults;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

/// Operator given to a keyword folded into the condition list.
const FOLDED_KEYWORD_OPERATOR: &str = "contains match phrase";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub begin: u32,
    pub size: u32,
}

/// The canonical query of one page session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryState {
    pub conditions: Vec<Condition>,
    pub keyword: String,
    pub search_mode: SearchMode,
    pub time_range: TimeRange,
    pub pagination: Pagination,
    pub union_index_ids: Vec<String>,
    pub is_union_search: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub biz_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub space_uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// URL segments nobody resolves, written back verbatim.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<RawPair>,
}

impl QueryState {
    /// Hard defaults only.
    pub fn with_defaults(config: &EngineConfig, now: DateTime<Utc>) -> Self {
        Self::from_resolved(&ResolvedQuery::default(), &PersistedDefaults::default(), config, now)
    }

    /// URL value, then persisted default, then hard default.
    pub fn from_url(
        query: &UrlQuery,
        persisted: &PersistedDefaults,
        config: &EngineConfig,
        now: DateTime<Utc>,
    ) -> Self {
        let resolver = QueryResolver::new(config, now);
        let resolved = resolver.resolve_all(query);
        let mut state = Self::from_resolved(&resolved, persisted, config, now);
        state.extra = resolver.unregistered(query);
        state
    }

    pub fn from_resolved(
        resolved: &ResolvedQuery,
        persisted: &PersistedDefaults,
        config: &EngineConfig,
        now: DateTime<Utc>,
    ) -> Self {
        let keyword = resolved
            .text(UrlField::Keyword)
            .filter(|keyword| is_meaningful_keyword(keyword))
            .unwrap_or("*")
            .to_string();

        let search_mode = resolved
            .search_mode()
            .or(persisted.search_mode)
            .unwrap_or(config.defaults.search_mode);

        let union_index_ids = resolved
            .list(UrlField::UnionList)
            .map(<[String]>::to_vec)
            .unwrap_or_default();

        let text = |field: UrlField| resolved.text(field).map(str::to_string);

        let mut state = Self {
            conditions: resolved.conditions().map(<[Condition]>::to_vec).unwrap_or_default(),
            keyword,
            search_mode,
            time_range: resolve_time_range(resolved, persisted, config, now),
            pagination: Pagination {
                begin: 0,
                size: persisted.page_size.unwrap_or(config.defaults.page_size),
            },
            is_union_search: !union_index_ids.is_empty(),
            union_index_ids,
            biz_id: text(UrlField::BizId),
            space_uid: text(UrlField::SpaceUid),
            timezone: text(UrlField::Timezone),
            format: text(UrlField::Format),
            extra: Vec::new(),
        };
        state.reconcile_mode();
        state
    }

    /// Conditions that actually constrain the search.
    pub fn active_conditions<'a>(
        &'a self,
        rules: &'a QueryRules,
    ) -> impl Iterator<Item = &'a Condition> + 'a {
        self.conditions
            .iter()
            .filter(move |c| !c.is_disabled() && c.field != rules.ip_selector_field)
    }

    pub fn has_keyword(&self) -> bool {
        is_meaningful_keyword(&self.keyword)
    }

    /// In `ui` mode a leftover keyword becomes a full-text condition. In `sql`
    /// mode the conditions stay until they are compiled into the keyword by a
    /// merge. Running this twice changes nothing.
    pub(crate) fn reconcile_mode(&mut self) {
        if self.search_mode != SearchMode::Ui || !self.has_keyword() {
            return;
        }

        let folded = Condition::new(
            FULL_TEXT_FIELD,
            FOLDED_KEYWORD_OPERATOR,
            &[self.keyword.trim()],
        );
        if !self.conditions.iter().any(|c| c.same_clause(&folded)) {
            debug!(keyword = %self.keyword, "folding keyword into a full-text condition");
            self.conditions.push(folded);
        }
        self.keyword = "*".to_string();
    }
}

fn resolve_time_range(
    resolved: &ResolvedQuery,
    persisted: &PersistedDefaults,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> TimeRange {
    if let (Some(picker), Some(start), Some(end)) = (
        resolved.picker(),
        resolved.timestamp(UrlField::StartTime),
        resolved.timestamp(UrlField::EndTime),
    ) {
        return TimeRange {
            start,
            end,
            picker: picker.clone(),
        };
    }

    let mut candidates = Vec::with_capacity(2);
    if persisted.start_time.is_some() || persisted.end_time.is_some() {
        candidates.push(DatePickerValue::new(
            persisted
                .start_time
                .clone()
                .unwrap_or_else(|| config.defaults.start_time.clone()),
            persisted
                .end_time
                .clone()
                .unwrap_or_else(|| config.defaults.end_time.clone()),
        ));
    }
    candidates.push(DatePickerValue::new(
        config.defaults.start_time.clone(),
        config.defaults.end_time.clone(),
    ));

    for picker in candidates {
        match TimeRange::from_picker(picker, now) {
            Ok(range) => return range,
            Err(err) => warn!(error = %err, "ignoring unusable default time range"),
        }
    }
    TimeRange::last_minutes(15, now)
}
