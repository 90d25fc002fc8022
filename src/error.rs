use std::io;
use thiserror::Error;

/// A probe error.
///
/// Every variant is collapsed into a loss by the round driver, except
/// [`ProbeError::AddressFormat`] when strict mode is enabled.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe transport failed: {0}")]
    Transport(#[from] io::Error),
    #[error("probe backend unavailable: {0}")]
    Unavailable(String),
    #[error("failed to parse probe output: {0}")]
    Parse(String),
    #[error("malformed responder address: {0}")]
    AddressFormat(String),
    #[error("probe task failed: {0}")]
    Task(String),
}

impl ProbeError {
    /// Whether this error should halt the session when running strict.
    pub fn is_fatal_when_strict(&self) -> bool {
        matches!(self, Self::AddressFormat(_))
    }
}

/// The target could not be resolved to an address.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Host not found: {0}")]
    NotFound(String),
    #[error("Host not found: {target} ({source})")]
    Lookup {
        target: String,
        #[source]
        source: io::Error,
    },
}
