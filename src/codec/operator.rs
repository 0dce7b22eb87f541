use crate::condition::Relation;

/// The eight contains-family operators, keyed by their UI phrase.
///
/// Every variant owns exactly one UI phrase and one API operator string, so
/// the phrase ⇄ operator table is checked by the compiler instead of living in
/// a string map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainsOperator {
    Contains,
    NotContains,
    AllContains,
    AllNotContains,
    Match,
    NotMatch,
    AllMatch,
    AllNotMatch,
}

impl ContainsOperator {
    pub const ALL: [ContainsOperator; 8] = [
        ContainsOperator::Contains,
        ContainsOperator::NotContains,
        ContainsOperator::AllContains,
        ContainsOperator::AllNotContains,
        ContainsOperator::Match,
        ContainsOperator::NotMatch,
        ContainsOperator::AllMatch,
        ContainsOperator::AllNotMatch,
    ];

    /// Wire operator understood by the search backend.
    pub const fn api(self) -> &'static str {
        match self {
            ContainsOperator::Contains => "contains match phrase",
            ContainsOperator::NotContains => "not contains match phrase",
            ContainsOperator::AllContains => "all contains match phrase",
            ContainsOperator::AllNotContains => "all not contains match phrase",
            ContainsOperator::Match => "=~",
            ContainsOperator::NotMatch => "!=~",
            ContainsOperator::AllMatch => "&=~",
            ContainsOperator::AllNotMatch => "&!=~",
        }
    }

    /// UI phrase composed from relation, direction and wildcard flag.
    pub const fn phrase(self) -> &'static str {
        match self {
            ContainsOperator::Contains => "is",
            ContainsOperator::NotContains => "is not",
            ContainsOperator::AllContains => "and is",
            ContainsOperator::AllNotContains => "and is not",
            ContainsOperator::Match => "is match",
            ContainsOperator::NotMatch => "is not match",
            ContainsOperator::AllMatch => "and is match",
            ContainsOperator::AllNotMatch => "and is not match",
        }
    }

    pub fn from_api(operator: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.api() == operator)
    }

    pub fn from_phrase(phrase: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.phrase() == phrase)
    }

    /// Operators eligible for UI-to-API rewriting: a UI phrase, or one of the
    /// four OR-joined API operators. The `all`/`&` API forms are already
    /// explicit and are left alone.
    pub fn from_ui(operator: &str) -> Option<Self> {
        Self::from_phrase(operator)
            .or_else(|| Self::from_api(operator).filter(|op| !op.is_all()))
    }

    pub const fn is_negated(self) -> bool {
        matches!(
            self,
            ContainsOperator::NotContains
                | ContainsOperator::AllNotContains
                | ContainsOperator::NotMatch
                | ContainsOperator::AllNotMatch
        )
    }

    pub const fn is_all(self) -> bool {
        matches!(
            self,
            ContainsOperator::AllContains
                | ContainsOperator::AllNotContains
                | ContainsOperator::AllMatch
                | ContainsOperator::AllNotMatch
        )
    }

    pub const fn is_wildcard(self) -> bool {
        matches!(
            self,
            ContainsOperator::Match
                | ContainsOperator::NotMatch
                | ContainsOperator::AllMatch
                | ContainsOperator::AllNotMatch
        )
    }

    /// Relation implied by the operator alone.
    pub const fn relation(self) -> Relation {
        if self.is_all() {
            Relation::And
        } else {
            Relation::Or
        }
    }

    /// Generic contains / not-contains pair shown once the wildcard and
    /// relation have been split out into their own toggles.
    pub const fn collapsed(self) -> &'static str {
        if self.is_negated() {
            ContainsOperator::NotContains.api()
        } else {
            ContainsOperator::Contains.api()
        }
    }
}
