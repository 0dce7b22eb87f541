use super::error::ResolveError;
use super::time_range::{DatePickerValue, to_timestamp};
use super::url_query::{RawValue, UrlQuery};
use crate::codec::hydrate;
use crate::condition::{Condition, SearchMode};
use crate::config::DefaultRules;
use crate::decode::{decode_once, parse_json_with_decode_retry};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

/// URL keys the resolver understands. Anything else is carried through
/// untouched by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UrlField {
    Addition,
    Keyword,
    StartTime,
    EndTime,
    DatePickerValue,
    SearchMode,
    UnionList,
    BizId,
    SpaceUid,
    Timezone,
    Format,
}

impl UrlField {
    pub const ALL: [UrlField; 11] = [
        UrlField::Addition,
        UrlField::Keyword,
        UrlField::StartTime,
        UrlField::EndTime,
        UrlField::DatePickerValue,
        UrlField::SearchMode,
        UrlField::UnionList,
        UrlField::BizId,
        UrlField::SpaceUid,
        UrlField::Timezone,
        UrlField::Format,
    ];

    pub const fn key(self) -> &'static str {
        match self {
            UrlField::Addition => "addition",
            UrlField::Keyword => "keyword",
            UrlField::StartTime => "start_time",
            UrlField::EndTime => "end_time",
            UrlField::DatePickerValue => "datePickerValue",
            UrlField::SearchMode => "search_mode",
            UrlField::UnionList => "unionList",
            UrlField::BizId => "bizId",
            UrlField::SpaceUid => "spaceUid",
            UrlField::Timezone => "timezone",
            UrlField::Format => "format",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.key() == key)
    }

    /// Resolver applied to this field's raw value.
    pub fn resolver(self) -> FieldResolver {
        match self {
            UrlField::Addition => resolve_addition,
            UrlField::SearchMode => resolve_search_mode,
            UrlField::StartTime => resolve_start_time,
            UrlField::EndTime => resolve_end_time,
            UrlField::DatePickerValue => resolve_date_picker,
            UrlField::UnionList => resolve_id_list,
            UrlField::Keyword
            | UrlField::BizId
            | UrlField::SpaceUid
            | UrlField::Timezone
            | UrlField::Format => resolve_generic,
        }
    }
}

/// Typed store value produced by a resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedValue {
    Conditions(Vec<Condition>),
    Text(String),
    List(Vec<String>),
    SearchMode(SearchMode),
    Timestamp(i64),
    Picker(DatePickerValue),
}

/// Everything a resolver may consult besides its own raw value.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    pub query: &'a UrlQuery,
    pub now: DateTime<Utc>,
    pub defaults: &'a DefaultRules,
    pub decode_depth: usize,
}

/// `Ok(None)` means the field is absent and contributes nothing.
pub type FieldResolver =
    fn(&ResolveContext<'_>, Option<&RawValue>) -> Result<Option<ResolvedValue>, ResolveError>;

fn resolve_generic(
    _ctx: &ResolveContext<'_>,
    raw: Option<&RawValue>,
) -> Result<Option<ResolvedValue>, ResolveError> {
    Ok(raw.map(|raw| match raw {
        RawValue::Single(value) => ResolvedValue::Text(decode_once(value)),
        RawValue::Multi(values) => {
            ResolvedValue::List(values.iter().map(|value| decode_once(value)).collect())
        }
    }))
}

/// Conditions from the `addition` JSON, hydrated with their exact operators.
pub fn parse_addition(raw: &RawValue, decode_depth: usize) -> Vec<Condition> {
    raw.values()
        .into_iter()
        .flat_map(|value| {
            let parsed =
                parse_json_with_decode_retry(value, Value::Array(Vec::new()), decode_depth);
            match parsed {
                Value::Array(entries) => entries,
                Value::Object(_) => vec![parsed],
                other => {
                    warn!(value = %other, "addition is neither a list nor an object, ignoring");
                    Vec::new()
                }
            }
        })
        .filter_map(|entry| match serde_json::from_value::<Condition>(entry) {
            Ok(condition) => Some(hydrate(&condition, true)),
            Err(err) => {
                warn!(error = %err, "dropping malformed addition entry");
                None
            }
        })
        .collect()
}

fn resolve_addition(
    ctx: &ResolveContext<'_>,
    raw: Option<&RawValue>,
) -> Result<Option<ResolvedValue>, ResolveError> {
    Ok(raw.map(|raw| ResolvedValue::Conditions(parse_addition(raw, ctx.decode_depth))))
}

/// Whether a keyword carries an actual expression (not blank, not `*`).
pub fn is_meaningful_keyword(keyword: &str) -> bool {
    let trimmed = keyword.trim();
    !trimmed.is_empty() && trimmed != "*"
}

/// A recognised `ui`/`sql` value is trusted. Anything else is inferred: a
/// meaningful keyword selects `sql` (even when conditions are present too)
/// and a non-empty addition selects `ui`; with neither the field stays
/// unresolved.
fn resolve_search_mode(
    ctx: &ResolveContext<'_>,
    raw: Option<&RawValue>,
) -> Result<Option<ResolvedValue>, ResolveError> {
    if let Some(raw) = raw {
        let value = decode_once(raw.first());
        if !value.trim().is_empty() {
            match SearchMode::from_raw(&value) {
                Some(mode) => return Ok(Some(ResolvedValue::SearchMode(mode))),
                None => warn!(value = %value, "unknown search mode, inferring from the query"),
            }
        }
    }

    let has_keyword = ctx
        .query
        .get(UrlField::Keyword.key())
        .is_some_and(|keyword| is_meaningful_keyword(&decode_once(keyword.first())));
    let has_addition = ctx
        .query
        .get(UrlField::Addition.key())
        .is_some_and(|addition| !parse_addition(addition, ctx.decode_depth).is_empty());

    Ok(match (has_keyword, has_addition) {
        (true, _) => Some(ResolvedValue::SearchMode(SearchMode::Sql)),
        (false, true) => Some(ResolvedValue::SearchMode(SearchMode::Ui)),
        (false, false) => None,
    })
}

/// Start and end are resolved as a pair: a missing side takes the default.
fn picker_pair(ctx: &ResolveContext<'_>) -> Option<DatePickerValue> {
    let read = |field: UrlField| {
        ctx.query
            .get(field.key())
            .map(|raw| decode_once(raw.first()))
            .filter(|value| !value.trim().is_empty())
    };

    match (read(UrlField::StartTime), read(UrlField::EndTime)) {
        (None, None) => None,
        (start, end) => Some(DatePickerValue::new(
            start.unwrap_or_else(|| ctx.defaults.start_time.clone()),
            end.unwrap_or_else(|| ctx.defaults.end_time.clone()),
        )),
    }
}

fn resolve_start_time(
    ctx: &ResolveContext<'_>,
    _raw: Option<&RawValue>,
) -> Result<Option<ResolvedValue>, ResolveError> {
    picker_pair(ctx)
        .map(|pair| to_timestamp(&pair.start, ctx.now).map(ResolvedValue::Timestamp))
        .transpose()
}

fn resolve_end_time(
    ctx: &ResolveContext<'_>,
    _raw: Option<&RawValue>,
) -> Result<Option<ResolvedValue>, ResolveError> {
    picker_pair(ctx)
        .map(|pair| to_timestamp(&pair.end, ctx.now).map(ResolvedValue::Timestamp))
        .transpose()
}

fn resolve_date_picker(
    ctx: &ResolveContext<'_>,
    _raw: Option<&RawValue>,
) -> Result<Option<ResolvedValue>, ResolveError> {
    Ok(picker_pair(ctx).map(ResolvedValue::Picker))
}

fn json_id(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Index-set ids from a JSON array, a scalar, or a repeated key.
fn resolve_id_list(
    ctx: &ResolveContext<'_>,
    raw: Option<&RawValue>,
) -> Result<Option<ResolvedValue>, ResolveError> {
    let Some(raw) = raw else {
        return Ok(None);
    };

    let ids = raw
        .values()
        .into_iter()
        .flat_map(|value| {
            let decoded = decode_once(value);
            match parse_json_with_decode_retry(value, Value::String(decoded), ctx.decode_depth) {
                Value::Array(items) => items.into_iter().filter_map(json_id).collect::<Vec<_>>(),
                other => json_id(other).into_iter().collect::<Vec<_>>(),
            }
        })
        .collect();

    Ok(Some(ResolvedValue::List(ids)))
}
