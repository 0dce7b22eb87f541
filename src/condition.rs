use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Boolean join applied between the values of one condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Relation {
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
}

impl Relation {
    /// Case-insensitive parse; anything but `and`/`or` is treated as absent.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "AND" => Some(Relation::And),
            "OR" => Some(Relation::Or),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::And => "AND",
            Relation::Or => "OR",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Relation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Relation::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown relation '{raw}'")))
    }
}

/// Structured conditions (`ui`) versus a free-text keyword expression (`sql`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "Value")]
pub enum SearchMode {
    #[default]
    Ui,
    Sql,
}

impl SearchMode {
    /// Accepts `ui`/`sql` and the persisted numeric search type (`0`/`1`).
    pub fn from_raw(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ui" | "0" => Some(SearchMode::Ui),
            "sql" | "1" => Some(SearchMode::Sql),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Ui => "ui",
            SearchMode::Sql => "sql",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<Value> for SearchMode {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let raw = match &value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            other => return Err(format!("unsupported search mode value: {other}")),
        };
        SearchMode::from_raw(&raw).ok_or_else(|| format!("unknown search mode '{raw}'"))
    }
}

/// One filter clause as it travels through the URL, the store and the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: String,
    /// Always a list, even when the source carried a scalar.
    #[serde(default, deserialize_with = "string_list")]
    pub value: Vec<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_relation"
    )]
    pub relation: Option<Relation>,
    #[serde(
        rename = "isInclude",
        alias = "is_include",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "strict_bool"
    )]
    pub is_include: Option<bool>,
    #[serde(
        rename = "fieldType",
        alias = "field_type",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub field_type: Option<String>,
    #[serde(
        rename = "hiddenValues",
        alias = "hidden_values",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "optional_string_list"
    )]
    pub hidden_values: Option<Vec<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "strict_bool"
    )]
    pub disabled: Option<bool>,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: impl Into<String>, value: &[&str]) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value: value.iter().map(|v| v.to_string()).collect(),
            relation: None,
            is_include: None,
            field_type: None,
            hidden_values: None,
            disabled: None,
        }
    }

    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relation = Some(relation);
        self
    }

    pub fn with_include(mut self, is_include: bool) -> Self {
        self.is_include = Some(is_include);
        self
    }

    pub fn with_field_type(mut self, field_type: impl Into<String>) -> Self {
        self.field_type = Some(field_type.into());
        self
    }

    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = Some(disabled);
        self
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.unwrap_or(false)
    }

    /// Same field, operator and values; presentation flags are ignored.
    pub fn same_clause(&self, other: &Condition) -> bool {
        self.field == other.field && self.operator == other.operator && self.value == other.value
    }
}

/// Field metadata of the active index set, as delivered by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub field_name: String,
    #[serde(default)]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_case_sensitive: Option<bool>,
}

impl FieldInfo {
    pub fn new(field_name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            field_type: field_type.into(),
            is_case_sensitive: None,
        }
    }

    pub fn case_sensitive(mut self, sensitive: bool) -> Self {
        self.is_case_sensitive = Some(sensitive);
        self
    }
}

fn scalar_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn value_to_list(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.into_iter().map(scalar_to_string).collect(),
        Value::Null => Vec::new(),
        scalar => vec![scalar_to_string(scalar)],
    }
}

fn string_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(value_to_list(Value::deserialize(deserializer)?))
}

fn optional_string_list<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Vec<String>>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        other => Ok(Some(value_to_list(other))),
    }
}

fn lenient_relation<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Relation>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(raw) => Relation::parse(&raw),
        _ => None,
    })
}

// Only a real JSON boolean counts as explicit; "true" strings fall back to inference.
fn strict_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    Ok(Value::deserialize(deserializer)?.as_bool())
}
