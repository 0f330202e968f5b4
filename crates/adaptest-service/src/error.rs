//! Service error types.

use adaptest_core::error::{EngineError, ErrorKind};
use thiserror::Error;

/// Errors returned by [`crate::AttemptService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The engine rejected the request.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The item source could not supply items.
    #[error("item source failed: {0:#}")]
    ItemSource(anyhow::Error),
}

impl ServiceError {
    /// Classification of engine errors; `None` for item source failures.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ServiceError::Engine(e) => Some(e.kind()),
            ServiceError::ItemSource(_) => None,
        }
    }

    pub fn engine_error(&self) -> Option<&EngineError> {
        match self {
            ServiceError::Engine(e) => Some(e),
            ServiceError::ItemSource(_) => None,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
