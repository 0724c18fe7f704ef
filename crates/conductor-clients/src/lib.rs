//! REST clients for Conductor's external collaborators.
//!
//! - [`GitLabClient`] implements [`conductor_core::build::BuildSystem`]
//! - [`SonarQubeClient`] implements [`conductor_core::quality::QualityService`]
//! - [`RedmineClient`] implements [`conductor_core::tracker::IssueTracker`]

pub mod error;
pub mod gitlab;
mod http;
pub mod redmine;
pub mod sonarqube;

pub use error::{ClientError, ClientResult};
pub use gitlab::GitLabClient;
pub use redmine::{IssueDefaults, RedmineClient};
pub use sonarqube::SonarQubeClient;
