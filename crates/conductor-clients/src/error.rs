//! Client error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    /// Convert into the domain error for the named system.
    pub fn into_external(self, system: &'static str) -> conductor_core::Error {
        conductor_core::Error::external(system, self.to_string())
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;
