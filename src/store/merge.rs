use crate::codec::{ContainsOperator, FULL_TEXT_FIELD};
use crate::condition::{Condition, Relation};
use crate::resolver::is_meaningful_keyword;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error("Compile request failed: {0}")]
    Transport(String),

    #[error("Operator '{operator}' on field '{field}' has no keyword form")]
    UnsupportedOperator { field: String, operator: String },

    #[error("Operator '{operator}' on field '{field}' needs a value")]
    MissingValue { field: String, operator: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("Backend refused to compile conditions: {0}")]
    Rejected(String),

    #[error(transparent)]
    Compile(#[from] CompileError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileData {
    #[serde(default)]
    pub querystring: String,
}

/// Response of the conditions-to-keyword endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileResponse {
    pub result: bool,
    #[serde(default)]
    pub data: CompileData,
    #[serde(default)]
    pub message: String,
}

impl CompileResponse {
    pub fn ok(querystring: impl Into<String>) -> Self {
        Self {
            result: true,
            data: CompileData {
                querystring: querystring.into(),
            },
            message: String::new(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            result: false,
            data: CompileData::default(),
            message: message.into(),
        }
    }
}

/// Compiles conditions into a keyword expression, remotely or locally.
pub trait QueryCompiler {
    fn compile(&self, addition: &[Condition]) -> Result<CompileResponse, CompileError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Nothing to fold: not in `sql` mode or no active conditions.
    NotNeeded,
    /// A merge for the current generation is already running.
    InFlight,
    /// The compiled keyword replaced the conditions.
    Applied,
    /// The state changed while compiling; the result was dropped.
    Stale,
}

/// Permission to run one merge for one state generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeTicket {
    pub(crate) generation: u64,
    pub(crate) addition: Vec<Condition>,
}

impl MergeTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Conditions to send to the compiler, operators in API form.
    pub fn addition(&self) -> &[Condition] {
        &self.addition
    }
}

/// At most one in-flight merge per generation.
#[derive(Debug, Clone, Default)]
pub(crate) struct SingleFlight {
    in_flight: Option<u64>,
}

impl SingleFlight {
    pub(crate) fn try_acquire(&mut self, generation: u64) -> bool {
        if self.in_flight == Some(generation) {
            return false;
        }
        self.in_flight = Some(generation);
        true
    }

    pub(crate) fn release(&mut self, generation: u64) {
        if self.in_flight == Some(generation) {
            self.in_flight = None;
        }
    }

    pub(crate) fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }
}

/// Combine a compiled querystring with the keyword already typed.
pub fn merge_keyword(querystring: &str, keyword: &str) -> String {
    let compiled = querystring.trim();
    let keyword = keyword.trim();
    match (compiled.is_empty(), is_meaningful_keyword(keyword)) {
        (true, true) => keyword.to_string(),
        (true, false) => "*".to_string(),
        (false, false) => compiled.to_string(),
        (false, true) => format!("{compiled} AND ({keyword})"),
    }
}

/// Offline compiler producing Lucene-style expressions.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalCompiler;

impl QueryCompiler for LocalCompiler {
    fn compile(&self, addition: &[Condition]) -> Result<CompileResponse, CompileError> {
        let clauses = addition
            .iter()
            .map(compile_condition)
            .collect::<Result<Vec<_>, _>>()?;
        let querystring = clauses
            .into_iter()
            .filter(|clause| !clause.is_empty())
            .collect::<Vec<_>>()
            .join(" AND ");
        Ok(CompileResponse::ok(querystring))
    }
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn join_terms(terms: Vec<String>, relation: Relation) -> String {
    match terms.len() {
        0 => String::new(),
        1 => terms.into_iter().next().unwrap_or_default(),
        _ => format!("({})", terms.join(&format!(" {relation} "))),
    }
}

fn negate(expr: String) -> String {
    if expr.is_empty() {
        expr
    } else {
        format!("NOT {expr}")
    }
}

fn compile_condition(condition: &Condition) -> Result<String, CompileError> {
    let field = condition.field.as_str();
    let operator = condition.operator.as_str();
    let values = &condition.value;

    if field == FULL_TEXT_FIELD {
        let terms = values.iter().map(|v| quote(v)).collect();
        return Ok(join_terms(terms, condition.relation.unwrap_or(Relation::Or)));
    }

    if let Some(contains) =
        ContainsOperator::from_api(operator).or_else(|| ContainsOperator::from_phrase(operator))
    {
        let relation = condition.relation.unwrap_or(contains.relation());
        let wildcard = condition.is_include.unwrap_or(contains.is_wildcard());
        let terms = values
            .iter()
            .map(|v| {
                if wildcard {
                    format!("{field}: {v}")
                } else {
                    format!("{field}: {}", quote(v))
                }
            })
            .collect();
        let expr = join_terms(terms, relation);
        return Ok(if contains.is_negated() { negate(expr) } else { expr });
    }

    let or_terms = |render: &dyn Fn(&str) -> String| {
        join_terms(values.iter().map(|v| render(v)).collect(), Relation::Or)
    };

    match operator {
        "=" => Ok(or_terms(&|v| format!("{field}: {}", quote(v)))),
        "!=" => Ok(negate(or_terms(&|v| format!("{field}: {}", quote(v))))),
        "contains" => Ok(or_terms(&|v| format!("{field}: *{v}*"))),
        "not contains" => Ok(negate(or_terms(&|v| format!("{field}: *{v}*")))),
        "exists" => Ok(format!("{field}: *")),
        "does not exists" | "not exists" => Ok(format!("NOT {field}: *")),
        "is true" => Ok(format!("{field}: true")),
        "is false" => Ok(format!("{field}: false")),
        ">" | ">=" | "<" | "<=" => values
            .first()
            .map(|v| format!("{field}: {operator}{v}"))
            .ok_or_else(|| CompileError::MissingValue {
                field: field.to_string(),
                operator: operator.to_string(),
            }),
        _ => Err(CompileError::UnsupportedOperator {
            field: field.to_string(),
            operator: operator.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(conditions: &[Condition]) -> String {
        LocalCompiler.compile(conditions).unwrap().data.querystring
    }

    #[test]
    fn test_contains_family_respects_relation_and_wildcard() {
        let cond = Condition::new("msg", "contains match phrase", &["a", "b"]);
        assert_eq!(compile(&[cond]), r#"(msg: "a" OR msg: "b")"#);

        let cond = Condition::new("msg", "&!=~", &["a*", "b*"]);
        assert_eq!(compile(&[cond]), "NOT (msg: a* AND msg: b*)");
    }

    #[test]
    fn test_conditions_are_joined_with_and() {
        let conditions = vec![
            Condition::new("level", "=", &["ERROR"]),
            Condition::new("host", "exists", &[]),
            Condition::new("latency", ">=", &["100"]),
        ];
        assert_eq!(
            compile(&conditions),
            r#"level: "ERROR" AND host: * AND latency: >=100"#
        );
    }

    #[test]
    fn test_quotes_are_escaped() {
        let cond = Condition::new("msg", "is", &[r#"say "hi""#]);
        assert_eq!(compile(&[cond]), r#"msg: "say \"hi\"""#);
    }

    #[test]
    fn test_unknown_operator_is_an_error() {
        let cond = Condition::new("msg", "between", &["1", "2"]);
        assert!(matches!(
            LocalCompiler.compile(&[cond]),
            Err(CompileError::UnsupportedOperator { .. })
        ));
    }

    #[test]
    fn test_merge_keyword() {
        assert_eq!(merge_keyword("a: 1", "*"), "a: 1");
        assert_eq!(merge_keyword("a: 1", "b OR c"), "a: 1 AND (b OR c)");
        assert_eq!(merge_keyword("", "b"), "b");
        assert_eq!(merge_keyword(" ", " "), "*");
    }

    #[test]
    fn test_single_flight() {
        let mut flight = SingleFlight::default();
        assert!(flight.try_acquire(1));
        assert!(!flight.try_acquire(1));
        assert!(flight.try_acquire(2), "a newer generation may start");
        flight.release(1);
        assert!(flight.is_in_flight(), "releasing an old generation keeps the new one");
        flight.release(2);
        assert!(!flight.is_in_flight());
    }
}
