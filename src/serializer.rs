//! Query state back to URL parameters.
//!
//! Values come out unencoded; [`build_query_string`] is the single place
//! that percent-encodes, so nothing is ever encoded twice. Unregistered
//! segments never pass through it: [`query_string`] appends them verbatim.

use crate::codec::to_api_condition;
use crate::resolver::{UrlField, is_meaningful_keyword};
use crate::store::QueryState;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::Value;
use std::collections::BTreeMap;

/// Characters `encodeURIComponent` leaves alone.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Serialized URL parameters, unencoded, in key order.
pub type SerializedQuery = BTreeMap<String, String>;

/// Default formatting rule: empty values are omitted, objects and arrays
/// become JSON, scalars pass through raw.
pub fn format_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) if items.is_empty() => None,
        Value::Object(map) if map.is_empty() => None,
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).ok(),
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
    }
}

fn optional_text(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .and_then(|text| format_value(&Value::String(text.to_string())))
}

fn field_value(state: &QueryState, field: UrlField) -> Option<String> {
    match field {
        UrlField::Addition => {
            let addition: Vec<_> = state
                .conditions
                .iter()
                .map(|condition| to_api_condition(condition, None))
                .collect();
            serde_json::to_value(addition)
                .ok()
                .and_then(|value| format_value(&value))
        }
        UrlField::Keyword => is_meaningful_keyword(&state.keyword)
            .then(|| format_value(&Value::String(state.keyword.clone())))
            .flatten(),
        UrlField::StartTime => format_value(&Value::String(state.time_range.picker.start.clone())),
        UrlField::EndTime => format_value(&Value::String(state.time_range.picker.end.clone())),
        // Carried by start_time/end_time.
        UrlField::DatePickerValue => None,
        UrlField::SearchMode => Some(state.search_mode.as_str().to_string()),
        UrlField::UnionList => {
            if !state.is_union_search {
                return None;
            }
            let ids: Vec<Value> = state
                .union_index_ids
                .iter()
                .map(|id| Value::String(id.clone()))
                .collect();
            format_value(&Value::Array(ids))
        }
        UrlField::BizId => optional_text(&state.biz_id),
        UrlField::SpaceUid => optional_text(&state.space_uid),
        UrlField::Timezone => optional_text(&state.timezone),
        UrlField::Format => optional_text(&state.format),
    }
}

/// Serialize the registered fields of `state`.
pub fn serialize(state: &QueryState) -> SerializedQuery {
    UrlField::ALL
        .into_iter()
        .filter_map(|field| {
            field_value(state, field).map(|value| (field.key().to_string(), value))
        })
        .collect()
}

pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

/// `key=value&...`, each component percent-encoded exactly once.
pub fn build_query_string(params: &SerializedQuery) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", encode_component(key), encode_component(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// The shareable link for `state`: registered fields encoded once, then the
/// unregistered segments exactly as they arrived.
pub fn query_string(state: &QueryState) -> String {
    let registered = build_query_string(&serialize(state));
    std::iter::once(registered.as_str())
        .chain(state.extra.iter().map(|pair| pair.text.as_str()))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_rule() {
        assert_eq!(format_value(&json!("")), None);
        assert_eq!(format_value(&json!([])), None);
        assert_eq!(format_value(&json!({})), None);
        assert_eq!(format_value(&json!(null)), None);
        assert_eq!(format_value(&json!("a b")), Some("a b".to_string()));
        assert_eq!(format_value(&json!(12)), Some("12".to_string()));
        assert_eq!(format_value(&json!(["1"])), Some("[\"1\"]".to_string()));
        assert_eq!(format_value(&json!({"a": 1})), Some("{\"a\":1}".to_string()));
    }

    #[test]
    fn test_encode_component_matches_browser_behaviour() {
        assert_eq!(encode_component("a b&c=d"), "a%20b%26c%3Dd");
        assert_eq!(encode_component("(x)*!~'._-"), "(x)*!~'._-");
        assert_eq!(encode_component("日"), "%E6%97%A5");
        assert_eq!(encode_component("50%"), "50%25");
    }

    #[test]
    fn test_build_query_string_is_ordered() {
        let mut params = SerializedQuery::new();
        params.insert("keyword".to_string(), "a:b".to_string());
        params.insert("addition".to_string(), "[]".to_string());
        assert_eq!(build_query_string(&params), "addition=%5B%5D&keyword=a%3Ab");
    }
}
