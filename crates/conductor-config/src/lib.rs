//! KDL configuration parsing for Conductor.
//!
//! This crate handles:
//! - Service configuration (conductor.kdl) with environment overrides
//! - Notification message templates
//! - Variable interpolation in rendered messages

pub mod context;
pub mod error;
pub mod service;
pub mod templates;

pub use context::{MessageContext, MessageContextBuilder};
pub use error::{ConfigError, ConfigResult};
pub use service::{
    BuildSystemConfig, DatabaseConfig, FileIngestConfig, IssueTrackerConfig, LockConfig,
    LogConfig, LogFormat, MonitorConfig, QualityServiceConfig, ServerConfig, ServiceConfig,
};
pub use templates::MessageTemplates;
