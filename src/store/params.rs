use super::QueryState;
use crate::codec::{is_wildcard_match, to_api};
use crate::condition::{Condition, FieldInfo, SearchMode};
use crate::config::QueryRules;
use serde::Serialize;

const BOOLEAN_OPERATORS: [&str; 2] = ["is true", "is false"];

/// Condition in the exact shape the search API expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiCondition {
    pub field: String,
    pub operator: String,
    pub value: Vec<String>,
}

/// Parameters ready to send with a search request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrieveParams {
    pub start_time: i64,
    pub end_time: i64,
    pub addition: Vec<ApiCondition>,
    pub keyword: String,
    pub search_mode: SearchMode,
    pub begin: u32,
    pub size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bk_biz_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub index_set_ids: Vec<String>,
}

fn api_condition(
    condition: &Condition,
    fields: &[FieldInfo],
    rules: &QueryRules,
) -> ApiCondition {
    let info = fields.iter().find(|info| info.field_name == condition.field);
    let field_type = info
        .map(|info| info.field_type.as_str())
        .filter(|field_type| !field_type.is_empty());
    let operator = to_api(condition, field_type);

    let mut value = condition.value.clone();
    if BOOLEAN_OPERATORS.contains(&condition.operator.as_str()) {
        value = vec![String::new()];
    } else if is_wildcard_match(&operator, None)
        && let Some(info) = info
        && rules.case_folding_field_types.contains(&info.field_type)
        && !info.is_case_sensitive.unwrap_or(true)
    {
        value = value.iter().map(|v| v.to_lowercase()).collect();
    }

    ApiCondition {
        field: condition.field.clone(),
        operator,
        value,
    }
}

/// Derive request parameters from `state`. Pure: the same inputs always give
/// the same output.
pub fn retrieve_params(
    state: &QueryState,
    fields: &[FieldInfo],
    rules: &QueryRules,
) -> RetrieveParams {
    let (addition, keyword) = match state.search_mode {
        SearchMode::Sql => {
            let keyword = if state.keyword.trim().is_empty() {
                "*".to_string()
            } else {
                state.keyword.clone()
            };
            (Vec::new(), keyword)
        }
        SearchMode::Ui => {
            let addition = state
                .active_conditions(rules)
                .map(|condition| api_condition(condition, fields, rules))
                .collect();
            (addition, "*".to_string())
        }
    };

    RetrieveParams {
        start_time: state.time_range.start,
        end_time: state.time_range.end,
        addition,
        keyword,
        search_mode: state.search_mode,
        begin: state.pagination.begin,
        size: state.pagination.size,
        bk_biz_id: state.biz_id.clone(),
        format: state.format.clone(),
        index_set_ids: if state.is_union_search {
            state.union_index_ids.clone()
        } else {
            Vec::new()
        },
    }
}
