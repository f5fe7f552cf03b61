//! Error surface of the quote engine.

use cpq_core::{CatalogError, ValidationError};
use cpq_pricing::PricingError;
use persistence::PersistenceError;
use std::fmt;
use thiserror::Error;

/// Category of an [`EngineError`], stable for callers that branch on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InvalidConfig,
    InvalidState,
    InvalidCatalog,
    Persistence,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidConfig => "invalid_config",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::InvalidCatalog => "invalid_catalog",
            ErrorKind::Persistence => "persistence",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures of assembly, pricing and the quote service.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    NotFound(String),
    #[error("invalid quote config: {0}")]
    InvalidConfig(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("invalid catalog data: {0}")]
    InvalidCatalog(String),
    #[error("storage failure: {0}")]
    Persistence(#[source] PersistenceError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            EngineError::InvalidState(_) => ErrorKind::InvalidState,
            EngineError::InvalidCatalog(_) => ErrorKind::InvalidCatalog,
            EngineError::Persistence(_) => ErrorKind::Persistence,
        }
    }
}

impl From<CatalogError> for EngineError {
    fn from(e: CatalogError) -> Self {
        EngineError::NotFound(e.to_string())
    }
}

impl From<ValidationError> for EngineError {
    fn from(e: ValidationError) -> Self {
        match e {
            ValidationError::InvalidTransition { .. } => EngineError::InvalidState(e.to_string()),
            other => EngineError::InvalidCatalog(other.to_string()),
        }
    }
}

impl From<PricingError> for EngineError {
    fn from(e: PricingError) -> Self {
        match e {
            PricingError::InvalidConfig(_) | PricingError::DuplicateStep(_) => {
                EngineError::InvalidConfig(e.to_string())
            }
            PricingError::Validation(v) => v.into(),
            other => EngineError::InvalidCatalog(other.to_string()),
        }
    }
}

impl From<PersistenceError> for EngineError {
    fn from(e: PersistenceError) -> Self {
        match e {
            PersistenceError::NotFound { .. } => EngineError::NotFound(e.to_string()),
            PersistenceError::Locked { .. } => EngineError::InvalidState(e.to_string()),
            PersistenceError::Validation(v) => v.into(),
            PersistenceError::RoleTaken { .. }
            | PersistenceError::ForeignOption { .. }
            | PersistenceError::NegativeQuantity(_) => EngineError::InvalidCatalog(e.to_string()),
            other => EngineError::Persistence(other),
        }
    }
}
