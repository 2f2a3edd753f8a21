use std::fmt::{self, Debug, Display};

use crate::entity::EntityId;

/// Provides `HolonError`, the error type for every fallible operation in the crate.
///
/// Nothing in this crate retries on error; retry policy, if any, belongs to the caller.
#[derive(Debug)]
pub enum HolonError {
    /// The owning `Context` has begun or completed disposal. Disposal is irreversible,
    /// so this error is never transient.
    ContextDisposed,
    /// Invalid input to a public operation, including violated path-algebra preconditions.
    Argument(String),
    /// `Context::get_service` could not resolve the named service type.
    ServiceUnavailable(&'static str),
    /// No handler is registered on the event bus for the named request kind.
    NoHandler(&'static str),
    /// A handler is already registered on the event bus for the named request kind.
    DuplicateHandler(&'static str),
    /// A filter failed while a find was being evaluated. The whole find is aborted;
    /// there are no partial results.
    FilterFailed {
        filter: String,
        entity: EntityId,
        source: Box<HolonError>,
    },
    HolonError(String),
}

impl From<String> for HolonError {
    fn from(error: String) -> Self {
        HolonError::HolonError(error)
    }
}

impl From<&str> for HolonError {
    fn from(error: &str) -> Self {
        HolonError::HolonError(error.to_string())
    }
}

impl std::error::Error for HolonError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HolonError::FilterFailed { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl Display for HolonError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HolonError::ContextDisposed => write!(f, "the context has been disposed"),
            HolonError::Argument(message) => write!(f, "invalid argument: {message}"),
            HolonError::ServiceUnavailable(service) => {
                write!(f, "no service available for {service}")
            }
            HolonError::NoHandler(request) => {
                write!(f, "no handler registered for {request}")
            }
            HolonError::DuplicateHandler(request) => {
                write!(f, "a handler is already registered for {request}")
            }
            HolonError::FilterFailed {
                filter,
                entity,
                source,
            } => {
                write!(f, "filter {filter} failed on entity {entity}: {source}")
            }
            HolonError::HolonError(message) => write!(f, "Error: {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn conversions_produce_the_generic_variant() {
        let from_str: HolonError = "boom".into();
        let from_string: HolonError = String::from("boom").into();
        assert!(matches!(from_str, HolonError::HolonError(ref m) if m == "boom"));
        assert!(matches!(from_string, HolonError::HolonError(ref m) if m == "boom"));
    }

    #[test]
    fn filter_failure_carries_its_source() {
        let error = HolonError::FilterFailed {
            filter: "AgeFilter".to_string(),
            entity: EntityId::random(),
            source: Box::new(HolonError::ContextDisposed),
        };
        let source = error.source().unwrap();
        assert_eq!(source.to_string(), "the context has been disposed");
        assert!(error.to_string().contains("AgeFilter"));
    }
}
