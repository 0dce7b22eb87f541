use crate::decode::decode_once;
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

/// Form encoding writes a space as `+`; normalize it before percent-decoding.
fn form_to_percent(raw: &str) -> String {
    raw.replace('+', "%20")
}

/// One `key=value` segment exactly as it appeared in the link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawPair {
    /// Decoded key, used for lookups.
    pub key: String,
    /// The segment verbatim, written back unchanged.
    pub text: String,
}

impl RawPair {
    /// `None` for segments whose key decodes to nothing.
    pub fn parse(segment: &str) -> Option<Self> {
        let raw_key = segment.split_once('=').map_or(segment, |(key, _)| key);
        let key = decode_once(&form_to_percent(raw_key));
        (!key.is_empty()).then(|| Self {
            key,
            text: segment.to_string(),
        })
    }

    /// Value still encoded, with form-encoded spaces normalized to `%20`.
    pub fn raw_value(&self) -> String {
        self.text
            .split_once('=')
            .map(|(_, value)| form_to_percent(value))
            .unwrap_or_default()
    }
}

/// A query-string value before any field-specific decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    Single(String),
    /// The key appeared more than once.
    Multi(Vec<String>),
}

impl RawValue {
    pub fn first(&self) -> &str {
        match self {
            RawValue::Single(value) => value,
            RawValue::Multi(values) => values.first().map(String::as_str).unwrap_or(""),
        }
    }

    pub fn values(&self) -> Vec<&str> {
        match self {
            RawValue::Single(value) => vec![value.as_str()],
            RawValue::Multi(values) => values.iter().map(String::as_str).collect(),
        }
    }

    fn push(&mut self, value: String) {
        match self {
            RawValue::Single(first) => {
                *self = RawValue::Multi(vec![std::mem::take(first), value]);
            }
            RawValue::Multi(values) => values.push(value),
        }
    }
}

/// Parsed URL query: decoded keys mapped to still-encoded values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlQuery {
    params: BTreeMap<String, RawValue>,
    pairs: Vec<RawPair>,
}

impl UrlQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `a=1&b=2`, with or without a leading `?`.
    pub fn parse(query: &str) -> Self {
        let mut parsed = Self::new();
        let query = query.strip_prefix('?').unwrap_or(query);

        for pair in query
            .split('&')
            .filter(|segment| !segment.is_empty())
            .filter_map(RawPair::parse)
        {
            parsed.add_value(pair.key.clone(), pair.raw_value());
            parsed.pairs.push(pair);
        }

        parsed
    }

    /// Append a raw value; a repeated key turns into a multi-value.
    pub fn insert(&mut self, key: impl Into<String>, raw_value: impl Into<String>) {
        let key = key.into();
        let raw_value = raw_value.into();
        self.pairs.push(RawPair {
            key: key.clone(),
            text: format!("{key}={raw_value}"),
        });
        self.add_value(key, raw_value);
    }

    fn add_value(&mut self, key: String, raw_value: String) {
        match self.params.entry(key) {
            Entry::Occupied(mut existing) => existing.get_mut().push(raw_value),
            Entry::Vacant(slot) => {
                slot.insert(RawValue::Single(raw_value));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&RawValue> {
        self.params.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawValue)> {
        self.params.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Every segment in link order, repeats included.
    pub fn pairs(&self) -> &[RawPair] {
        &self.pairs
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}
