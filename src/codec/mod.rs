//! Operator translation between the UI condition model and the search API
//!
//! Text fields expose a single "contains" operator in the UI, refined by two
//! toggles: the relation between values (AND/OR) and a wildcard switch. The
//! search API spells each combination as its own operator:
//!
//! ```text
//! is                 contains match phrase
//! is not             not contains match phrase
//! and is             all contains match phrase
//! and is not         all not contains match phrase
//! is match           =~
//! is not match       !=~
//! and is match       &=~
//! and is not match   &!=~
//! ```
//!
//! All functions here are pure: they never mutate their input and always
//! return fresh values.

pub mod operator;
pub mod translate;

pub use operator::ContainsOperator;
pub use translate::{
    FULL_TEXT_FIELD, UiOperator, hydrate, infer_relation, is_wildcard_match, supports_contains,
    to_api, to_api_condition, to_ui,
};
