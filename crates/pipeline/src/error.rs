//! Pipeline error types.

use domain::UnitOfWorkError;
use thiserror::Error;

use crate::validation::ValidationErrors;

/// Errors a dispatched request can fail with.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// One or more validators rejected the request.
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// The handler could not find the entity it was asked about.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// The commit lost an optimistic version check.
    #[error("Concurrency conflict: {0}")]
    Concurrency(#[source] UnitOfWorkError),

    /// The commit failed and was rolled back.
    #[error("Persistence failed: {0}")]
    Persistence(#[source] UnitOfWorkError),

    /// A cached entry does not hold the response type the request expects.
    #[error("Cache entry {key} holds {found}, expected {expected}")]
    CacheTypeMismatch {
        key: String,
        expected: String,
        found: String,
    },

    /// No handler was registered for the request type.
    #[error("No handler registered for {request_type}")]
    HandlerNotFound { request_type: &'static str },

    /// The caller cancelled the request before it committed.
    #[error("Request cancelled")]
    Cancelled,

    /// A business rule in the handler refused the request.
    #[error("{0}")]
    Handler(String),
}

impl PipelineError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        PipelineError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn handler(message: impl Into<String>) -> Self {
        PipelineError::Handler(message.into())
    }

    /// Returns true for failures caused by the caller rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PipelineError::Validation(_)
                | PipelineError::NotFound { .. }
                | PipelineError::Concurrency(_)
                | PipelineError::Cancelled
                | PipelineError::Handler(_)
        )
    }

    /// Short label used for the `outcome` metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation",
            PipelineError::NotFound { .. } => "not_found",
            PipelineError::Concurrency(_) => "concurrency",
            PipelineError::Persistence(_) => "persistence",
            PipelineError::CacheTypeMismatch { .. } => "cache_type_mismatch",
            PipelineError::HandlerNotFound { .. } => "handler_not_found",
            PipelineError::Cancelled => "cancelled",
            PipelineError::Handler(_) => "handler",
        }
    }
}

impl From<ValidationErrors> for PipelineError {
    fn from(errors: ValidationErrors) -> Self {
        PipelineError::Validation(errors)
    }
}

impl From<UnitOfWorkError> for PipelineError {
    fn from(err: UnitOfWorkError) -> Self {
        match err {
            UnitOfWorkError::Concurrency(_) => PipelineError::Concurrency(err),
            UnitOfWorkError::Cancelled => PipelineError::Cancelled,
            _ => PipelineError::Persistence(err),
        }
    }
}

/// Errors detected while building the handler registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// More than one handler was registered for a request type.
    #[error("{count} handlers registered for {request_type}, expected exactly one")]
    HandlerAmbiguous {
        request_type: &'static str,
        count: usize,
    },

    /// Validators or behaviors were registered for a request type with no handler.
    #[error("No handler registered for {request_type}")]
    HandlerNotFound { request_type: &'static str },
}
