//! Pipeline coordinator: triggers builds, tracks them to completion and
//! persists their outcome.

use chrono::{DateTime, Utc};
use conductor_config::{MessageTemplates, ServiceConfig};
use conductor_core::build::{BuildReport, BuildSystem, TriggerVariables};
use conductor_core::quality::QualityService;
use conductor_core::tracker::IssueTracker;
use conductor_core::{CorrelationId, FileStatus, PipelineId, PipelineKind, PipelineStatus};
use conductor_db::{FileUpdate, Ledger, MetricSample, NewOperation, NewPipeline};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{Instrument, Span, debug, error, field, info, info_span, warn};

use crate::active::{ActiveEntry, ActiveSet};
use crate::error::{CoordinatorError, CoordinatorResult};

/// Configuration service holding build-system project references.
pub const BUILD_SYSTEM_SERVICE: &str = "build-system";
/// Build project for sync pipelines.
pub const SYNC_PROJECT_REF_KEY: &str = "sync_project_ref";
/// Build project for file-ingest pipelines.
pub const FILE_INGEST_PROJECT_REF_KEY: &str = "file_ingest_project_ref";

const MAX_RECORDED_CHANGES: usize = 10;
const SERVICE: &str = "coordinator";
const TRIGGERED_BY_SYNC: &str = "sync-worker";
const TRIGGERED_BY_FILE_INGEST: &str = "file-ingest-worker";

/// Coordinator settings derived from the service configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Quality-service project analysed by sync pipelines.
    pub sync_quality_key: String,
    /// Quality-service project analysed by file-ingest pipelines.
    pub file_ingest_quality_key: String,
    /// Issue-tracker project receiving sync summaries.
    pub sync_issue_project: String,
    pub branch_prefix: String,
    /// Git ref sync pipelines run on.
    pub default_ref: String,
    /// Entries older than this are completed locally as failed.
    pub max_age: Option<Duration>,
    pub templates: MessageTemplates,
}

impl CoordinatorSettings {
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            sync_quality_key: config.quality_service.sync_project_key.clone(),
            file_ingest_quality_key: config.quality_service.file_ingest_project_key.clone(),
            sync_issue_project: config.issue_tracker.sync_project.clone(),
            branch_prefix: config.file_ingest.branch_prefix.clone(),
            default_ref: config.build_system.default_ref.clone(),
            max_age: config.monitor.max_age(),
            templates: config.templates.clone(),
        }
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from_config(&ServiceConfig::default())
    }
}

/// Description of an ingested file passed to its pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<i64>,
}

/// Counters for one monitoring pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MonitorSummary {
    pub polled: usize,
    pub completed: usize,
    pub errors: usize,
    pub timed_out: usize,
}

/// Snapshot of the active set.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveStatus {
    pub active_count: usize,
    pub pipelines: Vec<ActivePipeline>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivePipeline {
    pub pipeline_id: PipelineId,
    pub kind: PipelineKind,
    pub external_build_id: i64,
    pub started_at: DateTime<Utc>,
    pub elapsed_minutes: f64,
}

/// Everything needed to create a pipeline row and start its build.
struct Launch {
    pipeline: NewPipeline,
    config_key: &'static str,
    git_ref: String,
    variables: TriggerVariables,
    issue_id: Option<i64>,
    external_file_id: Option<i64>,
}

/// Coordinates pipelines between the ledger and the external systems.
pub struct PipelineCoordinator {
    pub(crate) build: Arc<dyn BuildSystem>,
    pub(crate) quality: Arc<dyn QualityService>,
    pub(crate) tracker: Arc<dyn IssueTracker>,
    pub(crate) ledger: Ledger,
    pub(crate) settings: CoordinatorSettings,
    active: ActiveSet,
    pass_gate: Mutex<()>,
}

impl PipelineCoordinator {
    pub fn new(
        build: Arc<dyn BuildSystem>,
        quality: Arc<dyn QualityService>,
        tracker: Arc<dyn IssueTracker>,
        ledger: Ledger,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            build,
            quality,
            tracker,
            ledger,
            settings,
            active: ActiveSet::new(),
            pass_gate: Mutex::new(()),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    pub fn active(&self) -> &ActiveSet {
        &self.active
    }

    /// Trigger the pipeline that analyses a freshly synchronised commit.
    pub async fn trigger_sync_pipeline(
        &self,
        commit_hash: &str,
        changes: &[serde_json::Value],
        project: &str,
    ) -> CoordinatorResult<PipelineId> {
        let correlation_id = CorrelationId::new();
        let span = info_span!(
            "trigger_sync_pipeline",
            %correlation_id,
            commit = %commit_hash,
            project,
            pipeline_id = field::Empty,
        );
        let started = Instant::now();

        let recorded: Vec<&serde_json::Value> = changes.iter().take(MAX_RECORDED_CHANGES).collect();
        let pipeline = NewPipeline::new(PipelineKind::Sync, project, TRIGGERED_BY_SYNC)
            .with_commit(commit_hash)
            .with_branch(self.settings.default_ref.as_str())
            .with_metadata(json!({
                "changes_count": changes.len(),
                "changes": recorded,
            }));

        let variables: TriggerVariables = [
            ("PIPELINE_TYPE", PipelineKind::Sync.as_str().to_string()),
            ("COMMIT_HASH", commit_hash.to_string()),
            ("CHANGES_COUNT", changes.len().to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let launch = Launch {
            pipeline,
            config_key: SYNC_PROJECT_REF_KEY,
            git_ref: self.settings.default_ref.clone(),
            variables,
            issue_id: None,
            external_file_id: None,
        };

        let result = self.launch(launch).instrument(span.clone()).await;
        self.record_outcome(
            "trigger_sync_pipeline",
            correlation_id,
            started,
            json!({"commit_hash": commit_hash, "project": project}),
            &result,
        )
        .instrument(span)
        .await;
        result
    }

    /// Trigger the pipeline that decompiles and analyses an ingested file.
    pub async fn trigger_file_ingest_pipeline(
        &self,
        issue_id: i64,
        file_info: &FileInfo,
        external_file_id: i64,
    ) -> CoordinatorResult<PipelineId> {
        let correlation_id = CorrelationId::new();
        let span = info_span!(
            "trigger_file_ingest_pipeline",
            %correlation_id,
            issue_id,
            external_file_id,
            pipeline_id = field::Empty,
        );
        let started = Instant::now();

        let branch = format!("{}{}", self.settings.branch_prefix, issue_id);
        let pipeline = NewPipeline::new(
            PipelineKind::FileIngest,
            self.settings.file_ingest_quality_key.as_str(),
            TRIGGERED_BY_FILE_INGEST,
        )
        .with_branch(branch.as_str())
        .with_metadata(json!({
            "issue_id": issue_id,
            "external_file_id": external_file_id,
            "file_info": file_info,
        }));

        let variables: TriggerVariables = [
            ("PIPELINE_TYPE", PipelineKind::FileIngest.as_str().to_string()),
            ("REDMINE_ISSUE_ID", issue_id.to_string()),
            ("EXTERNAL_FILE_ID", external_file_id.to_string()),
            ("FILE_NAME", file_info.filename.clone()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let launch = Launch {
            pipeline,
            config_key: FILE_INGEST_PROJECT_REF_KEY,
            git_ref: branch,
            variables,
            issue_id: Some(issue_id),
            external_file_id: Some(external_file_id),
        };

        let result = self.launch(launch).instrument(span.clone()).await;
        self.record_outcome(
            "trigger_file_ingest_pipeline",
            correlation_id,
            started,
            json!({"issue_id": issue_id, "external_file_id": external_file_id}),
            &result,
        )
        .instrument(span)
        .await;
        result
    }

    async fn launch(&self, launch: Launch) -> CoordinatorResult<PipelineId> {
        let record = self.ledger.pipelines.create(launch.pipeline.clone()).await?;
        let pipeline_id = record.logical_id();
        Span::current().record("pipeline_id", field::display(&pipeline_id));
        info!("Pipeline created");

        match self.start_build(&pipeline_id, &launch).await {
            Ok(entry) => {
                info!(
                    external_build_id = entry.external_build_id,
                    project_ref = %entry.project_ref,
                    "Pipeline running"
                );
                self.active.insert(entry).await;
                self.save_metric("pipelines_triggered", 1.0, "count", json!({"type": record.pipeline_type}))
                    .await;
                Ok(pipeline_id)
            }
            Err(e) => {
                error!(error = %e, "Pipeline trigger failed");
                self.mark_failed(&pipeline_id, launch.external_file_id, &e).await;
                Err(e)
            }
        }
    }

    async fn start_build(&self, pipeline_id: &PipelineId, launch: &Launch) -> CoordinatorResult<ActiveEntry> {
        let project_ref = self.project_ref(launch.config_key).await?;

        let mut variables = launch.variables.clone();
        variables.insert("DB_PIPELINE_ID".to_string(), pipeline_id.to_string());
        let build = self
            .build
            .trigger(&project_ref, &launch.git_ref, &variables)
            .await?;
        debug!(system = self.build.name(), external_build_id = build.external_id, "Build triggered");

        let patch = json!({
            "build_project_ref": project_ref,
            "external_build_id": build.external_id,
            "build_url": build.url,
        });
        let applied = self
            .ledger
            .pipelines
            .update_status(pipeline_id, PipelineStatus::Running, None, Some(patch))
            .await?;
        if !applied {
            return Err(CoordinatorError::TransitionRejected(pipeline_id.clone()));
        }

        if let Some(file_id) = launch.external_file_id {
            self.ledger
                .files
                .update_status(file_id, FileStatus::Processing, FileUpdate::pipeline(pipeline_id.clone()))
                .await?;
        }

        Ok(ActiveEntry {
            pipeline_id: pipeline_id.clone(),
            kind: launch.pipeline.kind,
            project_ref,
            external_build_id: build.external_id,
            started_at: Utc::now(),
            issue_id: launch.issue_id,
            external_file_id: launch.external_file_id,
        })
    }

    async fn project_ref(&self, key: &str) -> CoordinatorResult<String> {
        match self.ledger.config.get(BUILD_SYSTEM_SERVICE, key).await? {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(CoordinatorError::ConfigurationMissing {
                service: BUILD_SYSTEM_SERVICE.to_string(),
                key: key.to_string(),
            }),
        }
    }

    /// Best-effort failure marking after a trigger error.
    async fn mark_failed(&self, pipeline_id: &PipelineId, file_id: Option<i64>, cause: &CoordinatorError) {
        let patch = json!({"error": cause.to_string()});
        if let Err(e) = self
            .ledger
            .pipelines
            .update_status(pipeline_id, PipelineStatus::Failed, None, Some(patch))
            .await
        {
            error!(error = %e, "Could not mark pipeline failed");
        }

        if let Some(file_id) = file_id {
            let update = FileUpdate::pipeline(pipeline_id.clone());
            if let Err(e) = self.ledger.files.update_status(file_id, FileStatus::Failed, update).await {
                error!(file_id, error = %e, "Could not mark external file failed");
            }
        }
    }

    /// Poll every active pipeline once, in insertion order.
    pub async fn monitor_active(&self) -> MonitorSummary {
        let _pass = self.pass_gate.lock().await;
        let mut summary = MonitorSummary::default();

        let entries = self.active.snapshot().await;
        if entries.is_empty() {
            return summary;
        }

        let correlation_id = CorrelationId::new();
        let span = info_span!("monitor_active", %correlation_id, active = entries.len());
        async {
            for entry in &entries {
                self.poll_entry(entry, &mut summary).await;
            }
            if summary.completed > 0 || summary.errors > 0 {
                info!(
                    polled = summary.polled,
                    completed = summary.completed,
                    errors = summary.errors,
                    timed_out = summary.timed_out,
                    "Monitoring pass finished"
                );
            } else {
                debug!(polled = summary.polled, "Monitoring pass finished");
            }
        }
        .instrument(span)
        .await;

        let remaining = self.active.len().await;
        self.save_metric("active_pipelines", remaining as f64, "count", json!({})).await;
        summary
    }

    async fn poll_entry(&self, entry: &ActiveEntry, summary: &mut MonitorSummary) {
        summary.polled += 1;
        let report = match self.build.status(&entry.project_ref, entry.external_build_id).await {
            Ok(report) => Some(report),
            Err(e) => {
                summary.errors += 1;
                warn!(pipeline_id = %entry.pipeline_id, error = %e, "Polling build status failed");
                None
            }
        };

        let outcome = match &report {
            Some(r) => match r.status.terminal() {
                Some(status) => self.complete(entry, status, report.as_ref(), false).await,
                None if self.expired(entry) => {
                    summary.timed_out += 1;
                    self.complete(entry, PipelineStatus::Failed, report.as_ref(), true).await
                }
                None => return,
            },
            None if self.expired(entry) => {
                summary.timed_out += 1;
                self.complete(entry, PipelineStatus::Failed, None, true).await
            }
            None => return,
        };

        match outcome {
            Ok(()) => summary.completed += 1,
            Err(e) => {
                summary.errors += 1;
                error!(pipeline_id = %entry.pipeline_id, error = %e, "Completion handling failed");
            }
        }
    }

    fn expired(&self, entry: &ActiveEntry) -> bool {
        self.settings
            .max_age
            .is_some_and(|max_age| entry.is_expired(max_age, Utc::now()))
    }

    /// Persist the terminal outcome of a build and run its cascade.
    pub async fn handle_completion(&self, entry: &ActiveEntry, report: BuildReport) -> CoordinatorResult<()> {
        let status = report
            .status
            .terminal()
            .ok_or_else(|| CoordinatorError::NotTerminal(report.status.as_str().to_string()))?;
        self.complete(entry, status, Some(&report), false).await
    }

    async fn complete(
        &self,
        entry: &ActiveEntry,
        status: PipelineStatus,
        report: Option<&BuildReport>,
        local_timeout: bool,
    ) -> CoordinatorResult<()> {
        let correlation_id = CorrelationId::new();
        let span = info_span!(
            "handle_completion",
            %correlation_id,
            pipeline_id = %entry.pipeline_id,
            kind = %entry.kind,
        );
        let started = Instant::now();
        let result = self
            .complete_inner(entry, status, report, local_timeout)
            .instrument(span.clone())
            .await;
        self.record_outcome(
            "handle_completion",
            correlation_id,
            started,
            json!({"pipeline_id": entry.pipeline_id, "status": status, "local_timeout": local_timeout}),
            &result,
        )
        .instrument(span)
        .await;
        result
    }

    async fn complete_inner(
        &self,
        entry: &ActiveEntry,
        status: PipelineStatus,
        report: Option<&BuildReport>,
        local_timeout: bool,
    ) -> CoordinatorResult<()> {
        let now = Utc::now();
        let duration = report
            .and_then(|r| r.duration)
            .or_else(|| local_timeout.then(|| entry.elapsed(now).num_seconds()));

        let mut patch = json!({
            "build": {
                "status": report.map(|r| r.status.as_str()),
                "duration": report.and_then(|r| r.duration),
                "completed_at": now.to_rfc3339(),
            }
        });
        if local_timeout {
            patch["local_timeout"] = json!(true);
        }

        // A failed write keeps the entry active for the next pass.
        let applied = self
            .ledger
            .pipelines
            .update_status(&entry.pipeline_id, status, duration, Some(patch))
            .await?;
        self.active.remove(&entry.pipeline_id).await;

        if !applied {
            warn!("Pipeline already terminal, skipping cascade");
            return Ok(());
        }
        if local_timeout {
            warn!(elapsed_secs = duration, "Pipeline exceeded maximum age, marked failed");
        } else {
            info!(status = %status, duration, "Pipeline completed");
        }
        if let Some(secs) = duration {
            self.save_metric(
                "pipeline_duration_seconds",
                secs as f64,
                "seconds",
                json!({"type": entry.kind, "status": status}),
            )
            .await;
        }

        let cascade = match entry.kind {
            PipelineKind::Sync => self.sync_cascade(entry, status).await,
            PipelineKind::FileIngest => self.file_ingest_cascade(entry, status).await,
        };
        if let Err(e) = cascade {
            error!(error = %e, "Completion cascade failed");
        }
        Ok(())
    }

    /// Rebuild the active set from `running` ledger rows.
    pub async fn rehydrate(&self) -> CoordinatorResult<usize> {
        let running = self.ledger.pipelines.list_by_status(PipelineStatus::Running).await?;
        let mut restored = 0;

        for record in &running {
            let pipeline_id = record.logical_id();
            let (Some(project_ref), Some(external_build_id)) = (
                record.metadata_str("build_project_ref"),
                record.metadata_i64("external_build_id"),
            ) else {
                warn!(%pipeline_id, "Running pipeline has no build reference, skipping");
                continue;
            };
            let kind = match record.kind() {
                Ok(kind) => kind,
                Err(e) => {
                    warn!(%pipeline_id, error = %e, "Skipping pipeline with unknown type");
                    continue;
                }
            };

            let entry = ActiveEntry {
                pipeline_id,
                kind,
                project_ref: project_ref.to_string(),
                external_build_id,
                started_at: record.started_at.unwrap_or(record.created_at),
                issue_id: record.metadata_i64("issue_id"),
                external_file_id: record.metadata_i64("external_file_id"),
            };
            if self.active.insert(entry).await {
                restored += 1;
            }
        }

        info!(restored, running = running.len(), "Active set rehydrated");
        Ok(restored)
    }

    pub async fn active_status(&self) -> ActiveStatus {
        let now = Utc::now();
        let pipelines: Vec<ActivePipeline> = self
            .active
            .snapshot()
            .await
            .into_iter()
            .map(|entry| ActivePipeline {
                elapsed_minutes: entry.elapsed(now).num_milliseconds() as f64 / 60_000.0,
                pipeline_id: entry.pipeline_id,
                kind: entry.kind,
                external_build_id: entry.external_build_id,
                started_at: entry.started_at,
            })
            .collect();

        ActiveStatus {
            active_count: pipelines.len(),
            pipelines,
        }
    }

    async fn record_outcome<T>(
        &self,
        operation: &str,
        correlation_id: CorrelationId,
        started: Instant,
        mut details: serde_json::Value,
        result: &CoordinatorResult<T>,
    ) {
        details["correlation_id"] = json!(correlation_id);
        let status = match result {
            Ok(_) => "success",
            Err(e) => {
                details["error"] = json!(e.to_string());
                "failed"
            }
        };

        let entry = NewOperation {
            operation_type: operation.to_string(),
            service: SERVICE.to_string(),
            status: status.to_string(),
            details: Some(details),
            duration_seconds: Some(started.elapsed().as_secs_f64()),
        };
        if let Err(e) = self.ledger.operations.record(entry).await {
            warn!(operation, error = %e, "Could not record operation");
        }
    }

    async fn save_metric(&self, name: &str, value: f64, unit: &str, metadata: serde_json::Value) {
        let sample = MetricSample {
            name: name.to_string(),
            value,
            unit: Some(unit.to_string()),
            service: Some(SERVICE.to_string()),
            metadata: Some(metadata),
        };
        if let Err(e) = self.ledger.operations.save_metric(sample).await {
            warn!(metric = name, error = %e, "Could not save metric");
        }
    }
}
