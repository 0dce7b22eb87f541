//! Drill-down: a clicked `is` / `is not` on a field value, turned into a
//! clause of the current search mode.

use crate::condition::Condition;
use crate::resolver::is_meaningful_keyword;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrillOperator {
    Is,
    IsNot,
}

impl DrillOperator {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "is" => Some(DrillOperator::Is),
            "is not" => Some(DrillOperator::IsNot),
            _ => None,
        }
    }

    pub fn is_negated(self) -> bool {
        self == DrillOperator::IsNot
    }
}

/// A field value the user asked to filter on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrillDown {
    pub field: String,
    pub operator: DrillOperator,
    pub value: Vec<String>,
}

impl DrillDown {
    pub fn new(field: impl Into<String>, operator: DrillOperator, value: &[&str]) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.iter().map(|v| v.to_string()).collect(),
        }
    }

    /// Condition for `ui` mode. The operator depends on the field type:
    /// text fields match the phrase, booleans compare against the clicked
    /// value (and carry no values), everything else is an exact match.
    pub fn to_condition(&self, field_type: Option<&str>) -> Condition {
        let negated = self.operator.is_negated();
        let (operator, value) = match field_type {
            Some("text") => {
                let operator = if negated {
                    "not contains match phrase"
                } else {
                    "contains match phrase"
                };
                (operator, self.value.clone())
            }
            Some("boolean") => {
                let clicked_true = self
                    .value
                    .first()
                    .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));
                let operator = if clicked_true != negated {
                    "is true"
                } else {
                    "is false"
                };
                (operator, Vec::new())
            }
            _ => (if negated { "!=" } else { "=" }, self.value.clone()),
        };

        let mut condition = Condition::new(self.field.clone(), operator, &[]);
        condition.value = value;
        condition.field_type = field_type.map(str::to_string);
        condition
    }

    /// Keyword clause for `sql` mode: `field: "v"` or `NOT field: "v"`.
    pub fn to_clause(&self) -> String {
        let clause = format!("{}: \"{}\"", self.field, self.value.join(","));
        if self.operator.is_negated() {
            format!("NOT {clause}")
        } else {
            clause
        }
    }
}

/// Append `clauses` to `keyword` joined with `AND`, skipping any clause the
/// keyword already contains. `None` when nothing new was added.
pub fn append_clauses(keyword: &str, clauses: &[String]) -> Option<String> {
    let existing = if is_meaningful_keyword(keyword) {
        keyword.trim()
    } else {
        ""
    };

    let mut parts: Vec<&str> = Vec::new();
    if !existing.is_empty() {
        parts.push(existing);
    }
    let before = parts.len();
    for clause in clauses {
        if existing.contains(clause.as_str()) || parts.contains(&clause.as_str()) {
            continue;
        }
        parts.push(clause);
    }

    (parts.len() > before).then(|| parts.join(" AND "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ui_operator_follows_field_type() {
        let is = DrillDown::new("msg", DrillOperator::Is, &["boom"]);
        let is_not = DrillDown::new("msg", DrillOperator::IsNot, &["boom"]);

        assert_eq!(is.to_condition(Some("text")).operator, "contains match phrase");
        assert_eq!(is_not.to_condition(Some("text")).operator, "not contains match phrase");
        assert_eq!(is.to_condition(Some("keyword")).operator, "=");
        assert_eq!(is_not.to_condition(None).operator, "!=");
        assert_eq!(is.to_condition(Some("text")).value, vec!["boom"]);
    }

    #[test]
    fn test_boolean_drill_clears_values() {
        let is = DrillDown::new("ok", DrillOperator::Is, &["true"]);
        let condition = is.to_condition(Some("boolean"));
        assert_eq!(condition.operator, "is true");
        assert!(condition.value.is_empty());

        let is_not = DrillDown::new("ok", DrillOperator::IsNot, &["True"]);
        assert_eq!(is_not.to_condition(Some("boolean")).operator, "is false");

        let is_false = DrillDown::new("ok", DrillOperator::Is, &["false"]);
        assert_eq!(is_false.to_condition(Some("boolean")).operator, "is false");
    }

    #[test]
    fn test_sql_clauses() {
        assert_eq!(
            DrillDown::new("level", DrillOperator::Is, &["ERROR"]).to_clause(),
            r#"level: "ERROR""#
        );
        assert_eq!(
            DrillDown::new("level", DrillOperator::IsNot, &["ERROR"]).to_clause(),
            r#"NOT level: "ERROR""#
        );
    }

    #[test]
    fn test_append_clauses_skips_known_clauses() {
        let clause = r#"level: "ERROR""#.to_string();
        assert_eq!(append_clauses("*", &[clause.clone()]), Some(clause.clone()));
        assert_eq!(
            append_clauses("timeout ", &[clause.clone()]),
            Some(r#"timeout AND level: "ERROR""#.to_string())
        );
        assert_eq!(append_clauses(r#"level: "ERROR" AND x"#, &[clause.clone()]), None);
        assert_eq!(
            append_clauses("", &[clause.clone(), clause.clone()]),
            Some(clause)
        );
    }

    #[test]
    fn test_operator_parse() {
        assert_eq!(DrillOperator::parse(" IS NOT "), Some(DrillOperator::IsNot));
        assert_eq!(DrillOperator::parse("is"), Some(DrillOperator::Is));
        assert_eq!(DrillOperator::parse("="), None);
    }
}
