//! Core domain types and traits for the Conductor pipeline coordinator.
//!
//! This crate contains:
//! - Logical pipeline and correlation identifiers
//! - Pipeline, file and notification lifecycle states
//! - Collaborator traits for the build system, quality service and issue tracker
//! - The shared error taxonomy

pub mod build;
pub mod error;
pub mod id;
pub mod pipeline;
pub mod quality;
pub mod tracker;

pub use error::{Error, Result};
pub use id::{CorrelationId, PipelineId};
pub use pipeline::{FileStatus, NotificationStatus, PipelineKind, PipelineStatus};
