//! Application state.

use conductor_coordinator::PipelineCoordinator;
use conductor_db::Ledger;
use conductor_lock::WorkspaceLock;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<PipelineCoordinator>,
    pub ledger: Ledger,
    pub lock: Arc<WorkspaceLock>,
}

impl AppState {
    pub fn new(coordinator: Arc<PipelineCoordinator>, lock: WorkspaceLock) -> Self {
        Self {
            ledger: coordinator.ledger().clone(),
            coordinator,
            lock: Arc::new(lock),
        }
    }
}
