use thiserror::Error;

use crate::{context::ContextState, extract::ValidationErrors, types::DynError};

/// Errors when trying to require an application scoped instance
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequireError {
    /// The required type is not registered
    #[error("The required type '{0}' is not registered.")]
    TypeMissing(&'static str),

    #[error("Failed to downcast, required: '{required_type}' actual: '{actual_type}'")]
    DowncastFailed {
        required_type: &'static str,
        actual_type: &'static str,
    },
}

/// Errors while resolving a request's dependables or running its handler
#[derive(Error, Debug)]
pub enum ResolveError {
    /// One or more request values were missing or malformed
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    /// A dependable failed before or at acquisition
    #[error("Dependable '{dependable}' failed: {error}")]
    Setup {
        dependable: &'static str,
        #[source]
        error: DynError,
    },

    /// Releasing a scoped dependable failed before the response was finalized
    #[error("Teardown of '{dependable}' failed: {error}")]
    Teardown {
        dependable: &'static str,
        #[source]
        error: DynError,
        /// The error that was being surfaced when the teardown failed
        superseded: Option<Box<ResolveError>>,
    },

    /// The handler itself failed
    #[error("Handler '{operation}' failed: {error}")]
    Handler {
        operation: &'static str,
        #[source]
        error: DynError,
    },

    /// An application scoped instance is not available
    #[error(transparent)]
    State(#[from] RequireError),

    #[error("A Circular Dependency exists through {chain:?} - a dependable can not require itself")]
    CircularDependency { chain: Vec<&'static str> },

    #[error("Resolution context is '{actual:?}', expected '{expected:?}'")]
    InvalidState {
        expected: ContextState,
        actual: ContextState,
    },
}

impl ResolveError {
    /// The user supplied error, if the failure came from a dependable or the handler
    pub fn user_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            ResolveError::Setup { error, .. }
            | ResolveError::Teardown { error, .. }
            | ResolveError::Handler { error, .. } => Some(error.as_ref()),
            _ => None,
        }
    }
}

/// A teardown failure recorded after the response was finalized
#[derive(Error, Debug)]
#[error("Teardown of '{dependable}' failed: {error}")]
pub struct TeardownFailure {
    pub dependable: &'static str,
    #[source]
    pub error: DynError,
}

impl From<TeardownFailure> for ResolveError {
    fn from(failure: TeardownFailure) -> Self {
        ResolveError::Teardown {
            dependable: failure.dependable,
            error: failure.error,
            superseded: None,
        }
    }
}
