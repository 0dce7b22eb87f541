use thiserror::Error;

/// Failure of a single URL field; the other fields still resolve.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Cannot interpret '{0}' as a time value")]
    InvalidTime(String),

    #[error("Time value '{0}' is out of range")]
    TimeOutOfRange(String),
}
