//! Error types for the dispatch engine
//!
//! Two families:
//! - `PipeError` is what a transport reports. It reaches the consumer through
//!   `Callback::on_failure` and is never raised at dispatch time.
//! - `PipelineError` is what dispatch itself reports, synchronously, before any
//!   asynchronous work is started.

use thiserror::Error;

use crate::scope::ScopeKind;

/// Failure produced by a pipe while performing a read, save or remove.
///
/// `Clone` so that one execution shared by several awaiters can hand the same
/// failure to each of them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipeError {
    /// The addressed resource does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// The backend answered with a non-success status
    #[error("status {code}: {message}")]
    Status { code: u16, message: String },

    /// A body could not be encoded or decoded
    #[error("codec error: {0}")]
    Codec(String),

    /// Any other backend-side failure
    #[error("backend error: {0}")]
    Backend(String),

    /// The handler panicked while serving the request
    #[error("pipe handler panicked: {0}")]
    Panicked(String),
}

impl From<serde_json::Error> for PipeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Codec(e.to_string())
    }
}

/// Programmer errors detected while verifying a callback against an adapter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// The callback wants to be bound to a scope, but the adapter has none
    #[error("callback requires scope '{required}', which is no longer alive")]
    MissingScope { required: ScopeKind },

    /// The callback belongs to a different adapter flavor
    #[error("callback requires scope '{required}', but the adapter's scope is '{adapter}'")]
    ForeignScope {
        required: ScopeKind,
        adapter: ScopeKind,
    },
}

/// Errors reported synchronously by `DispatchAdapter` operations
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The request builder could not serialise the item handed to `save`
    #[error("cannot encode item for save: {0}")]
    Encode(PipeError),

    /// The task manager handed back something this adapter never dispatched
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

/// The single success-or-failure result of one operation execution
pub type Outcome<V> = Result<V, PipeError>;
