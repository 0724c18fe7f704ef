//! Error types for Conductor.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration missing: {service}.{key}")]
    ConfigurationMissing { service: String, key: String },

    #[error("{system} call failed: {message}")]
    ExternalCall {
        system: &'static str,
        message: String,
    },

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn external(system: &'static str, message: impl Into<String>) -> Self {
        Error::ExternalCall {
            system,
            message: message.into(),
        }
    }

    pub fn config_missing(service: impl Into<String>, key: impl Into<String>) -> Self {
        Error::ConfigurationMissing {
            service: service.into(),
            key: key.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
