//! CLI command implementations.
//!
//! Every command returns the text to print so it can be checked in tests.

pub mod activity;
pub mod config;
pub mod files;
pub mod lock;
pub mod notifications;
pub mod pipelines;
pub mod status;

use chrono::{DateTime, Utc};

pub(crate) fn timestamp(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub(crate) fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}
