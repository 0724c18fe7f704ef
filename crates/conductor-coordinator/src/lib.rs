//! Pipeline coordination for Conductor.
//!
//! Triggers builds in the build system, keeps the set of active pipelines,
//! polls them to completion and cascades results into the quality service
//! and the issue tracker. The ledger records every step.

pub mod active;
mod cascade;
pub mod coordinator;
pub mod error;
pub mod monitor;
pub mod worker;

pub use active::{ActiveEntry, ActiveSet};
pub use coordinator::{
    ActivePipeline, ActiveStatus, BUILD_SYSTEM_SERVICE, CoordinatorSettings, FILE_INGEST_PROJECT_REF_KEY,
    FileInfo, MonitorSummary, PipelineCoordinator, SYNC_PROJECT_REF_KEY,
};
pub use error::{CoordinatorError, CoordinatorResult};
pub use monitor::MonitorService;
pub use worker::{CycleOutcome, SyncChanges, WorkingCopyWorker};
