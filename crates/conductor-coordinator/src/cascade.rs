//! Downstream effects of a completed pipeline: quality analysis, file status
//! and issue-tracker messages.

use conductor_config::MessageContextBuilder;
use conductor_core::quality::{DEFAULT_METRIC_KEYS, MetricSnapshot, QualityGate};
use conductor_core::{FileStatus, NotificationStatus, PipelineStatus};
use conductor_db::{AnalysisRecord, FileUpdate, NewAnalysis, NewNotification, PipelineRecord};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::active::ActiveEntry;
use crate::coordinator::PipelineCoordinator;
use crate::error::CoordinatorResult;

pub(crate) const SYNC_SUMMARY: &str = "sync_summary";
pub(crate) const FILE_RESULT: &str = "file_result";
pub(crate) const FILE_ERROR: &str = "file_error";

/// Where a notification goes.
enum Delivery<'a> {
    NewIssue { project: &'a str },
    Comment { issue_id: i64 },
}

struct QualityResult {
    gate: QualityGate,
    metrics: MetricSnapshot,
    dashboard: String,
    analysis: AnalysisRecord,
}

impl PipelineCoordinator {
    pub(crate) async fn sync_cascade(&self, entry: &ActiveEntry, status: PipelineStatus) -> CoordinatorResult<()> {
        if status != PipelineStatus::Success {
            debug!(status = %status, "No cascade for unsuccessful sync pipeline");
            return Ok(());
        }

        let key = self.settings.sync_quality_key.clone();
        let quality = self.record_analysis(entry, &key).await?;
        let record = self.ledger.pipelines.get(&entry.pipeline_id).await?;

        let context = message_context(entry, &record)
            .with_quality(quality.gate, quality.metrics, quality.dashboard)
            .build();
        let templates = &self.settings.templates;

        self.notify(
            Delivery::NewIssue {
                project: &self.settings.sync_issue_project,
            },
            NewNotification {
                issue_id: None,
                notification_type: SYNC_SUMMARY.to_string(),
                title: context.render(&templates.sync_title),
                body: context.render(&templates.sync_body),
                pipeline_id: Some(entry.pipeline_id.clone()),
                analysis_id: Some(quality.analysis.id),
                external_file_id: None,
            },
        )
        .await
    }

    pub(crate) async fn file_ingest_cascade(
        &self,
        entry: &ActiveEntry,
        status: PipelineStatus,
    ) -> CoordinatorResult<()> {
        let Some(file_id) = entry.external_file_id else {
            warn!("File-ingest pipeline has no external file, skipping cascade");
            return Ok(());
        };

        let file_status = if status == PipelineStatus::Success {
            FileStatus::Completed
        } else {
            FileStatus::Failed
        };
        self.ledger
            .files
            .update_status(file_id, file_status, FileUpdate::pipeline(entry.pipeline_id.clone()))
            .await?;
        info!(file_id, file_status = %file_status, "External file status mirrored");

        let file = self.ledger.files.get(file_id).await?;
        let record = self.ledger.pipelines.get(&entry.pipeline_id).await?;
        let issue_id = entry.issue_id.unwrap_or(file.issue_id);
        let context = message_context(entry, &record).with_file(
            file.id,
            Some(file.filename.clone()),
            Some(issue_id),
        );
        let templates = &self.settings.templates;

        if file_status == FileStatus::Failed {
            let context = context.build();
            return self
                .notify(
                    Delivery::Comment { issue_id },
                    NewNotification {
                        issue_id: Some(issue_id),
                        notification_type: FILE_ERROR.to_string(),
                        title: format!("{} processing failed", file.filename),
                        body: context.render(&templates.file_failure),
                        pipeline_id: Some(entry.pipeline_id.clone()),
                        analysis_id: None,
                        external_file_id: Some(file_id),
                    },
                )
                .await;
        }

        let key = self.settings.file_ingest_quality_key.clone();
        let quality = self.record_analysis(entry, &key).await?;
        self.ledger
            .files
            .update_status(
                file_id,
                FileStatus::Completed,
                FileUpdate {
                    analysis_id: Some(quality.analysis.id),
                    ..Default::default()
                },
            )
            .await?;

        let context = context
            .with_quality(quality.gate, quality.metrics, quality.dashboard)
            .build();
        self.notify(
            Delivery::Comment { issue_id },
            NewNotification {
                issue_id: Some(issue_id),
                notification_type: FILE_RESULT.to_string(),
                title: format!("{} analysed", file.filename),
                body: context.render(&templates.file_success),
                pipeline_id: Some(entry.pipeline_id.clone()),
                analysis_id: Some(quality.analysis.id),
                external_file_id: Some(file_id),
            },
        )
        .await
    }

    /// Fetch the gate and measures of a project and persist them as an analysis.
    async fn record_analysis(&self, entry: &ActiveEntry, project_key: &str) -> CoordinatorResult<QualityResult> {
        let gate = self.quality.gate_status(project_key).await?;
        let measures = self.quality.measures(project_key, &DEFAULT_METRIC_KEYS).await?;
        let metrics = MetricSnapshot::from_measures(&measures);
        let dashboard = self.quality.dashboard_url(project_key);

        let analysis = self
            .ledger
            .analyses
            .save(NewAnalysis {
                pipeline_id: entry.pipeline_id.clone(),
                project_key: project_key.to_string(),
                analysis_key: gate.analysis_id.clone().unwrap_or_default(),
                gate_status: gate.status.clone(),
                metrics: metrics.clone(),
                dashboard_url: Some(dashboard.clone()),
                report: Some(json!({"gate": gate, "measures": measures})),
            })
            .await?;

        info!(analysis_id = analysis.id, project_key, gate = %gate.status, "Quality analysis saved");
        Ok(QualityResult {
            gate,
            metrics,
            dashboard,
            analysis,
        })
    }

    /// Record a notification, deliver it and store the delivery outcome.
    async fn notify(&self, delivery: Delivery<'_>, new: NewNotification) -> CoordinatorResult<()> {
        let notification = self.ledger.notifications.create(new).await?;

        let sent = match delivery {
            Delivery::NewIssue { project } => self
                .tracker
                .create_issue(project, &notification.title, &notification.body)
                .await
                .map(|issue_id| {
                    info!(issue_id, project, "Summary issue created");
                    Some(issue_id)
                }),
            Delivery::Comment { issue_id } => self
                .tracker
                .add_comment(issue_id, &notification.body)
                .await
                .map(|()| {
                    info!(issue_id, "Result comment posted");
                    None
                }),
        };

        match sent {
            Ok(created) => {
                if let Some(issue_id) = created {
                    self.ledger.notifications.link_issue(notification.id, issue_id).await?;
                }
                self.ledger
                    .notifications
                    .update_status(notification.id, NotificationStatus::Sent, None)
                    .await?;
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(db) = self
                    .ledger
                    .notifications
                    .update_status(notification.id, NotificationStatus::Failed, Some(&message))
                    .await
                {
                    warn!(notification_id = notification.id, error = %db, "Could not record delivery failure");
                }
                Err(e.into())
            }
        }
    }
}

fn message_context(entry: &ActiveEntry, record: &PipelineRecord) -> MessageContextBuilder {
    MessageContextBuilder::new()
        .with_pipeline(&entry.pipeline_id, entry.kind, &record.project_name)
        .with_status(record.status.clone())
        .with_pipeline_url(record.metadata_str("build_url").map(str::to_string))
        .with_completion(record.completed_at, record.duration_seconds)
        .with_commit(record.commit_hash.clone())
        .with_branch(record.branch_name.clone())
}
