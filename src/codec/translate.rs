use super::operator::ContainsOperator;
use crate::condition::{Condition, Relation};
use serde::Serialize;

/// Field name that addresses the whole document rather than one column.
pub const FULL_TEXT_FIELD: &str = "*";

/// Field types that distinguish phrase containment from wildcard matching.
pub const CONTAINS_FIELD_TYPES: [&str; 2] = ["text", "string"];

/// Operators that carry wildcard semantics on the wire.
pub const WILDCARD_OPERATORS: [&str; 4] = ["&!=~", "!=~", "&=~", "=~"];

/// Operators that join their values with OR unless told otherwise.
pub const OR_OPERATORS: [&str; 4] = [
    "contains match phrase",
    "=~",
    "not contains match phrase",
    "!=~",
];

/// UI-side view of an API operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UiOperator {
    pub operator: String,
    pub relation: Relation,
    #[serde(rename = "isInclude")]
    pub is_include: bool,
}

pub fn supports_contains(field_type: &str) -> bool {
    CONTAINS_FIELD_TYPES.contains(&field_type)
}

/// Wildcard flag: an explicit boolean wins, otherwise operator membership.
pub fn is_wildcard_match(operator: &str, is_include: Option<bool>) -> bool {
    is_include.unwrap_or_else(|| WILDCARD_OPERATORS.contains(&operator))
}

/// Relation: an explicit value wins, otherwise OR for the OR-joined operators.
pub fn infer_relation(operator: &str, explicit: Option<Relation>) -> Relation {
    explicit.unwrap_or(if OR_OPERATORS.contains(&operator) {
        Relation::Or
    } else {
        Relation::And
    })
}

fn compose_phrase(relation: Relation, negated: bool, wildcard: bool) -> String {
    let mut phrase = String::new();
    if relation == Relation::And {
        phrase.push_str("and ");
    }
    phrase.push_str(if negated { "is not " } else { "is " });
    if wildcard {
        phrase.push_str("match");
    }
    phrase.trim().to_string()
}

/// Translate a condition's operator into the API vocabulary.
///
/// `field_type` falls back to the condition's own `fieldType`. Full-text
/// conditions, non-text fields and operators outside the contains family are
/// returned unchanged.
pub fn to_api(condition: &Condition, field_type: Option<&str>) -> String {
    if condition.field == FULL_TEXT_FIELD {
        return condition.operator.clone();
    }

    let field_type = field_type.or(condition.field_type.as_deref());
    if !field_type.is_some_and(supports_contains) {
        return condition.operator.clone();
    }

    let Some(current) = ContainsOperator::from_ui(&condition.operator) else {
        return condition.operator.clone();
    };

    // A bare phrase takes the relation of its own table row (`is` is OR),
    // not the AND fallback `infer_relation` applies to API operators.
    let relation = condition.relation.unwrap_or(current.relation());
    let wildcard = condition.is_include.unwrap_or(current.is_wildcard());
    let phrase = compose_phrase(relation, current.is_negated(), wildcard);

    ContainsOperator::from_phrase(&phrase)
        .map(|op| op.api().to_string())
        .unwrap_or_else(|| condition.operator.clone())
}

/// Translate an API operator back into its UI form.
///
/// With `is_initializing` the matched operator is returned as-is so that a
/// reloaded URL keeps its exact wildcard operator; otherwise it collapses to
/// the generic contains / not-contains pair.
pub fn to_ui(
    api_operator: &str,
    relation_hint: Option<Relation>,
    is_initializing: bool,
) -> UiOperator {
    let Some(matched) = ContainsOperator::from_api(api_operator) else {
        return UiOperator {
            operator: api_operator.to_string(),
            relation: infer_relation(api_operator, relation_hint),
            is_include: is_wildcard_match(api_operator, None),
        };
    };

    let operator = if is_initializing {
        matched.api()
    } else {
        matched.collapsed()
    };

    UiOperator {
        operator: operator.to_string(),
        relation: relation_hint.unwrap_or(matched.relation()),
        is_include: matched.is_wildcard(),
    }
}

/// Fresh copy of `condition` with its operator in API form.
pub fn to_api_condition(condition: &Condition, field_type: Option<&str>) -> Condition {
    let mut converted = condition.clone();
    converted.operator = to_api(condition, field_type);
    converted
}

/// Fresh copy of `condition` with UI operator, relation and wildcard flag
/// filled in. Full-text conditions come back untouched.
pub fn hydrate(condition: &Condition, is_initializing: bool) -> Condition {
    let mut hydrated = condition.clone();
    if condition.field == FULL_TEXT_FIELD {
        return hydrated;
    }

    let ui = to_ui(&condition.operator, condition.relation, is_initializing);
    hydrated.operator = ui.operator;
    hydrated.relation = Some(ui.relation);
    hydrated.is_include = Some(condition.is_include.unwrap_or(ui.is_include));
    hydrated
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(operator: &str) -> Condition {
        Condition::new("msg", operator, &["err"]).with_field_type("text")
    }

    #[test]
    fn test_is_with_and_relation_becomes_all_contains() {
        let cond = text("is").with_relation(Relation::And);
        assert_eq!(to_api(&cond, Some("text")), "all contains match phrase");
    }

    #[test]
    fn test_wildcard_toggle_selects_match_operators() {
        let cond = text("contains match phrase").with_include(true);
        assert_eq!(to_api(&cond, None), "=~");

        let cond = text("not contains match phrase")
            .with_include(true)
            .with_relation(Relation::And);
        assert_eq!(to_api(&cond, None), "&!=~");

        let cond = text("=~").with_include(false);
        assert_eq!(to_api(&cond, None), "contains match phrase");
    }

    #[test]
    fn test_full_text_field_passes_through() {
        let cond = Condition::new("*", "is", &["x"]).with_relation(Relation::And);
        assert_eq!(to_api(&cond, Some("text")), "is");
    }

    #[test]
    fn test_non_text_field_passes_through() {
        let cond = Condition::new("code", "is", &["1"]).with_relation(Relation::And);
        assert_eq!(to_api(&cond, Some("long")), "is");
        assert_eq!(to_api(&cond, None), "is");
    }

    #[test]
    fn test_unknown_operator_passes_through() {
        assert_eq!(to_api(&text("exists"), None), "exists");
        let ui = to_ui(">=", None, false);
        assert_eq!(ui.operator, ">=");
        assert_eq!(ui.relation, Relation::And);
        assert!(!ui.is_include);
    }

    #[test]
    fn test_to_ui_collapses_unless_initializing() {
        let ui = to_ui("&!=~", None, false);
        assert_eq!(ui.operator, "not contains match phrase");
        assert_eq!(ui.relation, Relation::And);
        assert!(ui.is_include);

        let ui = to_ui("&!=~", None, true);
        assert_eq!(ui.operator, "&!=~");
    }

    #[test]
    fn test_to_ui_trusts_relation_hint() {
        let ui = to_ui("=~", Some(Relation::And), false);
        assert_eq!(ui.relation, Relation::And);
        let ui = to_ui("=~", None, false);
        assert_eq!(ui.relation, Relation::Or);
    }

    #[test]
    fn test_hydrate_keeps_explicit_include_and_passthrough_fields() {
        let mut cond = Condition::new("msg", "=~", &["a*"]).with_include(false);
        cond.hidden_values = Some(vec!["b".to_string()]);
        cond.disabled = Some(true);

        let hydrated = hydrate(&cond, true);
        assert_eq!(hydrated.operator, "=~");
        assert_eq!(hydrated.is_include, Some(false));
        assert_eq!(hydrated.relation, Some(Relation::Or));
        assert_eq!(hydrated.hidden_values, cond.hidden_values);
        assert_eq!(hydrated.disabled, Some(true));
        assert_eq!(cond.relation, None, "input must not be mutated");
    }

    #[test]
    fn test_wildcard_inference() {
        assert!(is_wildcard_match("=~", None));
        assert!(!is_wildcard_match("contains match phrase", None));
        assert!(!is_wildcard_match("=~", Some(false)));
    }
}
