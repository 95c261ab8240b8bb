use thiserror::Error;

use crate::ObjectRef;

/// Why a single outline destination could not be turned into a page number.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("outline entry has no destination")]
    NoDestination,
    #[error("named destination {0:?} is not defined")]
    UnknownNamedDestination(String),
    #[error("destination target {} does not refer to a page", describe_target(.0))]
    UnresolvableReference(Option<ObjectRef>),
}

fn describe_target(target: &Option<ObjectRef>) -> String {
    match target {
        Some(reference) => reference.to_string(),
        None => "<missing>".to_owned(),
    }
}

/// Failure to open a document. Fatal for the load attempt that produced it.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("document could not be parsed: {0}")]
    Malformed(String),
    #[error("document has no pages")]
    NoPages,
    #[error(transparent)]
    Engine(#[from] anyhow::Error),
}
