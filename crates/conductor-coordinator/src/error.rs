//! Coordinator error types.

use conductor_core::PipelineId;
use conductor_db::DbError;
use conductor_lock::LockError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("configuration missing: {service}.{key}")]
    ConfigurationMissing { service: String, key: String },

    #[error(transparent)]
    External(#[from] conductor_core::Error),

    #[error("persistence error: {0}")]
    Persistence(#[from] DbError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("pipeline {0} rejected the status change")]
    TransitionRejected(PipelineId),

    #[error("build status {0} is not terminal")]
    NotTerminal(String),
}

impl CoordinatorError {
    pub fn is_configuration_missing(&self) -> bool {
        matches!(self, CoordinatorError::ConfigurationMissing { .. })
    }

    pub fn is_persistence(&self) -> bool {
        matches!(self, CoordinatorError::Persistence(_))
    }
}

pub type CoordinatorResult<T> = std::result::Result<T, CoordinatorError>;
