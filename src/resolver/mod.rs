//! URL query parameters to typed store values
//!
//! Each registered key has its own resolver. A resolver that fails only
//! removes its own field from the result; a hand-edited or outdated link
//! still yields every other value.
//!
//! # Registered keys
//!
//! ```text
//! addition          JSON list of conditions (API operators)
//! keyword           free-text expression
//! start_time        picker value, resolved together with end_time
//! end_time          picker value, resolved together with start_time
//! datePickerValue   derived from the start/end pair
//! search_mode       ui | sql (inferred when absent)
//! unionList         JSON list of index-set ids
//! bizId spaceUid timezone format   passed through
//! ```

pub mod error;
pub mod fields;
pub mod time_range;
pub mod url_query;

pub use error::ResolveError;
pub use fields::{
    FieldResolver, ResolveContext, ResolvedValue, UrlField, is_meaningful_keyword, parse_addition,
};
pub use time_range::{DatePickerValue, TimeRange, to_timestamp};
pub use url_query::{RawPair, RawValue, UrlQuery};

use crate::condition::{Condition, SearchMode};
use crate::config::EngineConfig;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::warn;

/// Output of [`QueryResolver::resolve_all`], keyed by field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedQuery {
    values: BTreeMap<UrlField, ResolvedValue>,
}

impl ResolvedQuery {
    pub fn get(&self, field: UrlField) -> Option<&ResolvedValue> {
        self.values.get(&field)
    }

    pub fn contains(&self, field: UrlField) -> bool {
        self.values.contains_key(&field)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn conditions(&self) -> Option<&[Condition]> {
        match self.get(UrlField::Addition)? {
            ResolvedValue::Conditions(conditions) => Some(conditions),
            _ => None,
        }
    }

    pub fn search_mode(&self) -> Option<SearchMode> {
        match self.get(UrlField::SearchMode)? {
            ResolvedValue::SearchMode(mode) => Some(*mode),
            _ => None,
        }
    }

    pub fn timestamp(&self, field: UrlField) -> Option<i64> {
        match self.get(field)? {
            ResolvedValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    pub fn picker(&self) -> Option<&DatePickerValue> {
        match self.get(UrlField::DatePickerValue)? {
            ResolvedValue::Picker(picker) => Some(picker),
            _ => None,
        }
    }

    /// Scalar text; a repeated key yields its first value.
    pub fn text(&self, field: UrlField) -> Option<&str> {
        match self.get(field)? {
            ResolvedValue::Text(text) => Some(text),
            ResolvedValue::List(values) => values.first().map(String::as_str),
            _ => None,
        }
    }

    pub fn list(&self, field: UrlField) -> Option<&[String]> {
        match self.get(field)? {
            ResolvedValue::List(values) => Some(values),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (UrlField, &ResolvedValue)> {
        self.values.iter().map(|(field, value)| (*field, value))
    }
}

/// Applies the per-field resolvers to a parsed URL query.
#[derive(Debug, Clone)]
pub struct QueryResolver<'a> {
    config: &'a EngineConfig,
    now: DateTime<Utc>,
}

impl<'a> QueryResolver<'a> {
    pub fn new(config: &'a EngineConfig, now: DateTime<Utc>) -> Self {
        Self { config, now }
    }

    pub fn resolve_all(&self, query: &UrlQuery) -> ResolvedQuery {
        let ctx = ResolveContext {
            query,
            now: self.now,
            defaults: &self.config.defaults,
            decode_depth: self.config.url.json_decode_depth,
        };

        let mut values = BTreeMap::new();
        for field in UrlField::ALL {
            let resolver = field.resolver();
            match resolver(&ctx, query.get(field.key())) {
                Ok(Some(value)) => {
                    values.insert(field, value);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(field = field.key(), error = %err, "dropping unresolvable url field");
                }
            }
        }

        ResolvedQuery { values }
    }

    /// Segments whose key the resolver does not own, verbatim and in link
    /// order, for carrying through.
    pub fn unregistered(&self, query: &UrlQuery) -> Vec<RawPair> {
        query
            .pairs()
            .iter()
            .filter(|pair| UrlField::from_key(&pair.key).is_none())
            .cloned()
            .collect()
    }
}
