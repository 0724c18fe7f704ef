//! In-memory ledger.
//!
//! Implements every repository trait with the same semantics as the
//! PostgreSQL repositories. Used by tests and dry runs.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use conductor_core::pipeline::merge_metadata;
use conductor_core::{
    FileStatus, NotificationStatus, PipelineId, PipelineKind, PipelineStatus,
};
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::warn;

use crate::repo::analysis::{FAILED_GATES, PASSED_GATES};
use crate::repo::external_file::DEFAULT_FILE_VERSION;
use crate::repo::notification::MAX_NOTIFICATION_RETRIES;
use crate::repo::*;
use crate::{DbError, DbResult};

#[derive(Debug, Clone)]
struct ConfigEntry {
    value: String,
    is_secret: bool,
    description: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    pipelines: Vec<PipelineRecord>,
    analyses: Vec<AnalysisRecord>,
    files: Vec<ExternalFileRecord>,
    notifications: Vec<NotificationRecord>,
    config: BTreeMap<(String, String), ConfigEntry>,
    operations: Vec<OperationRecord>,
    metrics: Vec<MetricRecord>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn pipeline_mut(&mut self, id: &PipelineId) -> DbResult<&mut PipelineRecord> {
        self.pipelines
            .iter_mut()
            .find(|p| p.pipeline_id == id.as_str())
            .ok_or_else(|| DbError::NotFound(format!("pipeline {}", id)))
    }

    fn has_pipeline(&self, id: &PipelineId) -> bool {
        self.pipelines.iter().any(|p| p.pipeline_id == id.as_str())
    }
}

/// Ledger state held in process memory.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<State>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded metric samples with the given name.
    pub async fn metric_count(&self, name: &str) -> usize {
        let state = self.state.lock().await;
        state.metrics.iter().filter(|m| m.metric_name == name).count()
    }

    /// Every recorded notification, in creation order.
    pub async fn notifications(&self) -> Vec<NotificationRecord> {
        self.state.lock().await.notifications.clone()
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

#[async_trait]
impl PipelineRepo for MemoryLedger {
    async fn create(&self, new: NewPipeline) -> DbResult<PipelineRecord> {
        let mut state = self.state.lock().await;
        let pipeline_id = PipelineId::generate(new.kind, &new.project, Utc::now());
        if state.has_pipeline(&pipeline_id) {
            return Err(DbError::Duplicate(format!("pipeline {}", pipeline_id)));
        }

        let record = PipelineRecord {
            id: state.next_id(),
            pipeline_id: pipeline_id.into_inner(),
            pipeline_type: new.kind.as_str().to_string(),
            project_name: new.project,
            commit_hash: new.commit_hash,
            branch_name: new.branch,
            status: PipelineStatus::Pending.as_str().to_string(),
            triggered_by: Some(new.triggered_by),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            duration_seconds: None,
            metadata: new.metadata.unwrap_or_else(|| serde_json::json!({})),
        };
        state.pipelines.push(record.clone());
        Ok(record)
    }

    async fn update_status(
        &self,
        id: &PipelineId,
        status: PipelineStatus,
        duration_seconds: Option<i64>,
        metadata_patch: Option<serde_json::Value>,
    ) -> DbResult<bool> {
        let mut state = self.state.lock().await;
        let record = state.pipeline_mut(id)?;
        let current = record.status()?;

        if !current.can_transition_to(status) {
            warn!(pipeline_id = %id, from = %current, to = %status, "Rejected pipeline status transition");
            return Ok(false);
        }

        let now = Utc::now();
        record.status = status.as_str().to_string();
        if status == PipelineStatus::Running && record.started_at.is_none() {
            record.started_at = Some(now);
        }
        if status.is_terminal() && record.completed_at.is_none() {
            record.completed_at = Some(now);
        }
        if duration_seconds.is_some() {
            record.duration_seconds = duration_seconds;
        }
        if let Some(patch) = metadata_patch {
            merge_metadata(&mut record.metadata, patch);
        }
        Ok(true)
    }

    async fn get(&self, id: &PipelineId) -> DbResult<PipelineRecord> {
        let state = self.state.lock().await;
        state
            .pipelines
            .iter()
            .find(|p| p.pipeline_id == id.as_str())
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("pipeline {}", id)))
    }

    async fn recent(&self, kind: Option<PipelineKind>, limit: i64) -> DbResult<Vec<PipelineRecord>> {
        let state = self.state.lock().await;
        let mut records: Vec<PipelineRecord> = state
            .pipelines
            .iter()
            .filter(|p| kind.is_none_or(|k| p.pipeline_type == k.as_str()))
            .cloned()
            .collect();
        records.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        records.truncate(limit.max(0) as usize);
        Ok(records)
    }

    async fn list_by_status(&self, status: PipelineStatus) -> DbResult<Vec<PipelineRecord>> {
        let state = self.state.lock().await;
        let mut records: Vec<PipelineRecord> = state
            .pipelines
            .iter()
            .filter(|p| p.status == status.as_str())
            .cloned()
            .collect();
        records.sort_by_key(|p| (p.created_at, p.id));
        Ok(records)
    }

    async fn statistics(&self, days_back: i32) -> DbResult<PipelineStatistics> {
        let state = self.state.lock().await;
        let since = Utc::now() - Duration::days(days_back.into());
        let window: Vec<&PipelineRecord> = state
            .pipelines
            .iter()
            .filter(|p| p.created_at >= since)
            .collect();

        let count = |s: PipelineStatus| window.iter().filter(|p| p.status == s.as_str()).count() as i64;
        let total = window.len() as i64;
        let successful = count(PipelineStatus::Success);

        Ok(PipelineStatistics {
            total,
            successful,
            failed: count(PipelineStatus::Failed),
            running: count(PipelineStatus::Running),
            avg_duration_minutes: mean(
                window
                    .iter()
                    .filter_map(|p| p.duration_seconds)
                    .map(|d| d as f64),
            )
            .map(|secs| round2(secs / 60.0)),
            success_rate: (total > 0).then(|| round2(successful as f64 * 100.0 / total as f64)),
        })
    }
}

#[async_trait]
impl AnalysisRepo for MemoryLedger {
    async fn save(&self, new: NewAnalysis) -> DbResult<AnalysisRecord> {
        let mut state = self.state.lock().await;
        if !state.has_pipeline(&new.pipeline_id) {
            return Err(DbError::NotFound(format!("pipeline {}", new.pipeline_id)));
        }

        let m = new.metrics;
        let record = AnalysisRecord {
            id: state.next_id(),
            pipeline_id: new.pipeline_id.into_inner(),
            project_key: new.project_key,
            analysis_key: new.analysis_key,
            quality_gate_status: new.gate_status,
            bugs: m.bugs,
            vulnerabilities: m.vulnerabilities,
            code_smells: m.code_smells,
            coverage_percent: m.coverage_percent,
            duplicated_lines_percent: m.duplicated_lines_percent,
            lines_of_code: m.lines_of_code,
            technical_debt_minutes: m.technical_debt_minutes,
            analysis_date: Utc::now(),
            dashboard_url: new.dashboard_url,
            report_data: new.report,
        };
        state.analyses.push(record.clone());
        Ok(record)
    }

    async fn latest_for_pipeline(&self, pipeline_id: &PipelineId) -> DbResult<Option<AnalysisRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .analyses
            .iter()
            .filter(|a| a.pipeline_id == pipeline_id.as_str())
            .max_by_key(|a| (a.analysis_date, a.id))
            .cloned())
    }

    async fn gate_summary(&self, days_back: i32) -> DbResult<Vec<QualityGateSummary>> {
        let state = self.state.lock().await;
        let since = Utc::now() - Duration::days(days_back.into());

        let mut by_project: BTreeMap<&str, Vec<&AnalysisRecord>> = BTreeMap::new();
        for analysis in state.analyses.iter().filter(|a| a.analysis_date >= since) {
            by_project
                .entry(analysis.project_key.as_str())
                .or_default()
                .push(analysis);
        }

        Ok(by_project
            .into_iter()
            .map(|(project_key, analyses)| {
                let gate_in = |gates: &[&str]| {
                    analyses
                        .iter()
                        .filter(|a| gates.contains(&a.quality_gate_status.as_str()))
                        .count() as i64
                };
                QualityGateSummary {
                    project_key: project_key.to_string(),
                    total_analyses: analyses.len() as i64,
                    passed: gate_in(&PASSED_GATES),
                    failed: gate_in(&FAILED_GATES),
                    avg_bugs: mean(analyses.iter().map(|a| a.bugs as f64)),
                    avg_vulnerabilities: mean(analyses.iter().map(|a| a.vulnerabilities as f64)),
                    avg_code_smells: mean(analyses.iter().map(|a| a.code_smells as f64)),
                    avg_coverage: mean(analyses.iter().filter_map(|a| a.coverage_percent)),
                }
            })
            .collect())
    }

    async fn trends(&self, project_key: &str, days_back: i32) -> DbResult<Vec<QualityTrendPoint>> {
        let state = self.state.lock().await;
        let since = Utc::now() - Duration::days(days_back.into());

        let mut by_day: BTreeMap<NaiveDate, Vec<&AnalysisRecord>> = BTreeMap::new();
        for analysis in state
            .analyses
            .iter()
            .filter(|a| a.project_key == project_key && a.analysis_date >= since)
        {
            by_day
                .entry(analysis.analysis_date.date_naive())
                .or_default()
                .push(analysis);
        }

        Ok(by_day
            .into_iter()
            .map(|(day, analyses)| QualityTrendPoint {
                day,
                analyses: analyses.len() as i64,
                avg_bugs: mean(analyses.iter().map(|a| a.bugs as f64)),
                avg_vulnerabilities: mean(analyses.iter().map(|a| a.vulnerabilities as f64)),
                avg_code_smells: mean(analyses.iter().map(|a| a.code_smells as f64)),
                avg_coverage: mean(analyses.iter().filter_map(|a| a.coverage_percent)),
            })
            .collect())
    }
}

#[async_trait]
impl ExternalFileRepo for MemoryLedger {
    async fn create(&self, new: NewExternalFile) -> DbResult<ExternalFileRecord> {
        let mut state = self.state.lock().await;
        let record = ExternalFileRecord {
            id: state.next_id(),
            issue_id: new.issue_id,
            attachment_id: new.attachment_id,
            filename: new.filename,
            file_type: new.file_type,
            file_size_bytes: new.file_size_bytes,
            file_path: new.file_path,
            version: new.version.unwrap_or_else(|| DEFAULT_FILE_VERSION.to_string()),
            status: FileStatus::Pending.as_str().to_string(),
            decompiled_path: None,
            git_commit_hash: None,
            git_branch: None,
            pipeline_id: None,
            analysis_id: None,
            created_at: Utc::now(),
            processed_at: None,
        };
        state.files.push(record.clone());
        Ok(record)
    }

    async fn update_status(&self, id: i64, status: FileStatus, update: FileUpdate) -> DbResult<()> {
        let mut state = self.state.lock().await;
        let record = state
            .files
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| DbError::NotFound(format!("external file {}", id)))?;

        record.status = status.as_str().to_string();
        if let Some(path) = update.decompiled_path {
            record.decompiled_path = Some(path);
        }
        if let Some(hash) = update.git_commit_hash {
            record.git_commit_hash = Some(hash);
        }
        if let Some(branch) = update.git_branch {
            record.git_branch = Some(branch);
        }
        if let Some(pipeline_id) = update.pipeline_id {
            record.pipeline_id = Some(pipeline_id.into_inner());
        }
        if let Some(analysis_id) = update.analysis_id {
            record.analysis_id = Some(analysis_id);
        }
        if status.is_terminal() {
            record.processed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn get(&self, id: i64) -> DbResult<ExternalFileRecord> {
        let state = self.state.lock().await;
        state
            .files
            .iter()
            .find(|f| f.id == id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("external file {}", id)))
    }

    async fn get_by_attachment(&self, attachment_id: i64) -> DbResult<Option<ExternalFileRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .files
            .iter()
            .filter(|f| f.attachment_id == attachment_id)
            .max_by_key(|f| (f.created_at, f.id))
            .cloned())
    }

    async fn pending(&self) -> DbResult<Vec<ExternalFileRecord>> {
        let state = self.state.lock().await;
        let mut records: Vec<ExternalFileRecord> = state
            .files
            .iter()
            .filter(|f| f.status == FileStatus::Pending.as_str())
            .cloned()
            .collect();
        records.sort_by_key(|f| (f.created_at, f.id));
        Ok(records)
    }
}

#[async_trait]
impl NotificationRepo for MemoryLedger {
    async fn create(&self, new: NewNotification) -> DbResult<NotificationRecord> {
        let mut state = self.state.lock().await;
        let record = NotificationRecord {
            id: state.next_id(),
            issue_id: new.issue_id,
            notification_type: new.notification_type,
            title: new.title,
            body: new.body,
            status: NotificationStatus::Pending.as_str().to_string(),
            pipeline_id: new.pipeline_id.map(PipelineId::into_inner),
            analysis_id: new.analysis_id,
            external_file_id: new.external_file_id,
            created_at: Utc::now(),
            sent_at: None,
            retry_count: 0,
            error_message: None,
        };
        state.notifications.push(record.clone());
        Ok(record)
    }

    async fn update_status(
        &self,
        id: i64,
        status: NotificationStatus,
        error: Option<&str>,
    ) -> DbResult<()> {
        let mut state = self.state.lock().await;
        let record = state
            .notifications
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| DbError::NotFound(format!("notification {}", id)))?;

        record.status = status.as_str().to_string();
        record.error_message = error.map(str::to_string);
        match status {
            NotificationStatus::Sent => record.sent_at = Some(Utc::now()),
            NotificationStatus::Failed => record.retry_count += 1,
            NotificationStatus::Pending => {}
        }
        Ok(())
    }

    async fn link_issue(&self, id: i64, issue_id: i64) -> DbResult<()> {
        let mut state = self.state.lock().await;
        let record = state
            .notifications
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| DbError::NotFound(format!("notification {}", id)))?;
        record.issue_id = Some(issue_id);
        Ok(())
    }

    async fn get(&self, id: i64) -> DbResult<NotificationRecord> {
        let state = self.state.lock().await;
        state
            .notifications
            .iter()
            .find(|n| n.id == id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("notification {}", id)))
    }

    async fn pending(&self, limit: i64) -> DbResult<Vec<NotificationRecord>> {
        let state = self.state.lock().await;
        let mut records: Vec<NotificationRecord> = state
            .notifications
            .iter()
            .filter(|n| {
                n.status == NotificationStatus::Pending.as_str()
                    || (n.status == NotificationStatus::Failed.as_str()
                        && n.retry_count < MAX_NOTIFICATION_RETRIES)
            })
            .cloned()
            .collect();
        records.sort_by_key(|n| (n.created_at, n.id));
        records.truncate(limit.max(0) as usize);
        Ok(records)
    }
}

#[async_trait]
impl ConfigRepo for MemoryLedger {
    async fn get(&self, service: &str, key: &str) -> DbResult<Option<String>> {
        let state = self.state.lock().await;
        Ok(state
            .config
            .get(&(service.to_string(), key.to_string()))
            .map(|e| e.value.clone()))
    }

    async fn set(
        &self,
        service: &str,
        key: &str,
        value: &str,
        is_secret: bool,
        description: Option<&str>,
    ) -> DbResult<()> {
        let mut state = self.state.lock().await;
        let entry_key = (service.to_string(), key.to_string());
        let description = description
            .map(str::to_string)
            .or_else(|| state.config.get(&entry_key).and_then(|e| e.description.clone()));
        state.config.insert(
            entry_key,
            ConfigEntry {
                value: value.to_string(),
                is_secret,
                description,
            },
        );
        Ok(())
    }

    async fn all_non_secret(&self, service: &str) -> DbResult<BTreeMap<String, String>> {
        let state = self.state.lock().await;
        Ok(state
            .config
            .iter()
            .filter(|((s, _), e)| s == service && !e.is_secret)
            .map(|((_, k), e)| (k.clone(), e.value.clone()))
            .collect())
    }
}

#[async_trait]
impl OperationRepo for MemoryLedger {
    async fn record(&self, entry: NewOperation) -> DbResult<i64> {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        state.operations.push(OperationRecord {
            id,
            operation_type: entry.operation_type,
            service: entry.service,
            status: entry.status,
            details: entry.details,
            duration_seconds: entry.duration_seconds,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn save_metric(&self, sample: MetricSample) -> DbResult<i64> {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        state.metrics.push(MetricRecord {
            id,
            metric_name: sample.name,
            metric_value: sample.value,
            metric_unit: sample.unit,
            service: sample.service,
            metadata: sample.metadata,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn recent(&self, limit: i64) -> DbResult<Vec<OperationRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .operations
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn metrics(&self, query: &MetricQuery) -> DbResult<Vec<MetricRecord>> {
        let state = self.state.lock().await;
        let since = Utc::now() - Duration::hours(query.hours_back.into());
        Ok(state
            .metrics
            .iter()
            .rev()
            .filter(|m| m.created_at >= since)
            .filter(|m| query.name.as_ref().is_none_or(|name| &m.metric_name == name))
            .filter(|m| {
                query
                    .service
                    .as_ref()
                    .is_none_or(|service| m.service.as_ref() == Some(service))
            })
            .take(query.limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_core::quality::MetricSnapshot;
    use serde_json::json;

    async fn pending_pipeline(ledger: &MemoryLedger) -> PipelineId {
        let record = PipelineRepo::create(
            ledger,
            NewPipeline::new(PipelineKind::Sync, "erp", "gitsync").with_commit("abc123"),
        )
        .await
        .unwrap();
        record.logical_id()
    }

    #[tokio::test]
    async fn test_create_pipeline_is_pending() {
        let ledger = MemoryLedger::new();
        let id = pending_pipeline(&ledger).await;

        assert!(id.as_str().starts_with("sync_erp_"));
        let record = PipelineRepo::get(&ledger, &id).await.unwrap();
        assert_eq!(record.status().unwrap(), PipelineStatus::Pending);
        assert_eq!(record.commit_hash.as_deref(), Some("abc123"));
        assert_eq!(record.triggered_by.as_deref(), Some("gitsync"));
        assert!(record.started_at.is_none());
    }

    #[tokio::test]
    async fn test_ids_unique_within_same_second() {
        let ledger = MemoryLedger::new();
        let a = pending_pipeline(&ledger).await;
        let b = pending_pipeline(&ledger).await;
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_started_at_stamped_once() {
        let ledger = MemoryLedger::new();
        let id = pending_pipeline(&ledger).await;

        assert!(PipelineRepo::update_status(&ledger, &id, PipelineStatus::Running, None, None).await.unwrap());
        let first = PipelineRepo::get(&ledger, &id).await.unwrap().started_at;
        assert!(first.is_some());

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(PipelineRepo::update_status(&ledger, &id, PipelineStatus::Running, None, None).await.unwrap());
        let second = PipelineRepo::get(&ledger, &id).await.unwrap().started_at;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_completion_preserves_prior_metadata() {
        let ledger = MemoryLedger::new();
        let id = pending_pipeline(&ledger).await;

        PipelineRepo::update_status(
                &ledger,
                &id,
                PipelineStatus::Running,
                None,
                Some(json!({"external_build_id": 77, "build": {"url": "http://ci/77"}})),
            )
            .await
            .unwrap();
        PipelineRepo::update_status(
                &ledger,
                &id,
                PipelineStatus::Success,
                Some(120),
                Some(json!({"build": {"status": "success"}})),
            )
            .await
            .unwrap();

        let record = PipelineRepo::get(&ledger, &id).await.unwrap();
        assert_eq!(record.status().unwrap(), PipelineStatus::Success);
        assert_eq!(record.duration_seconds, Some(120));
        assert!(record.completed_at.is_some());
        assert_eq!(record.metadata_i64("external_build_id"), Some(77));
        assert_eq!(record.metadata["build"]["url"], "http://ci/77");
        assert_eq!(record.metadata["build"]["status"], "success");
    }

    #[tokio::test]
    async fn test_terminal_status_never_overwritten() {
        let ledger = MemoryLedger::new();
        let id = pending_pipeline(&ledger).await;

        PipelineRepo::update_status(&ledger, &id, PipelineStatus::Running, None, None).await.unwrap();
        PipelineRepo::update_status(&ledger, &id, PipelineStatus::Failed, Some(30), None).await.unwrap();
        let completed_at = PipelineRepo::get(&ledger, &id).await.unwrap().completed_at;

        let applied = PipelineRepo::update_status(&ledger, &id, PipelineStatus::Success, Some(99), Some(json!({"late": true})))
            .await
            .unwrap();
        assert!(!applied);

        let record = PipelineRepo::get(&ledger, &id).await.unwrap();
        assert_eq!(record.status().unwrap(), PipelineStatus::Failed);
        assert_eq!(record.duration_seconds, Some(30));
        assert_eq!(record.completed_at, completed_at);
        assert!(record.metadata.get("late").is_none());
    }

    #[tokio::test]
    async fn test_running_cannot_return_to_pending() {
        let ledger = MemoryLedger::new();
        let id = pending_pipeline(&ledger).await;

        PipelineRepo::update_status(&ledger, &id, PipelineStatus::Running, None, None).await.unwrap();
        let applied = PipelineRepo::update_status(&ledger, &id, PipelineStatus::Pending, None, None).await.unwrap();
        assert!(!applied);
        let record = PipelineRepo::get(&ledger, &id).await.unwrap();
        assert_eq!(record.status().unwrap(), PipelineStatus::Running);
    }

    #[tokio::test]
    async fn test_update_unknown_pipeline() {
        let ledger = MemoryLedger::new();
        let result = PipelineRepo::update_status(&ledger, &PipelineId::from("missing"), PipelineStatus::Running, None, None)
            .await;
        assert!(matches!(result, Err(DbError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_recent_newest_first_with_filter() {
        let ledger = MemoryLedger::new();
        let first = pending_pipeline(&ledger).await;
        let ingest = PipelineRepo::create(
            &ledger,
            NewPipeline::new(PipelineKind::FileIngest, "files", "ingest"),
        )
        .await
        .unwrap();
        let last = pending_pipeline(&ledger).await;

        let all = PipelineRepo::recent(&ledger, None, 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].pipeline_id, last.as_str());

        let syncs = PipelineRepo::recent(&ledger, Some(PipelineKind::Sync), 10).await.unwrap();
        let ids: Vec<&str> = syncs.iter().map(|p| p.pipeline_id.as_str()).collect();
        assert_eq!(ids, vec![last.as_str(), first.as_str()]);

        let limited = PipelineRepo::recent(&ledger, None, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_ne!(limited[0].pipeline_id, ingest.pipeline_id);
    }

    #[tokio::test]
    async fn test_statistics() {
        let ledger = MemoryLedger::new();
        for (status, duration) in [
            (PipelineStatus::Success, 60),
            (PipelineStatus::Success, 180),
            (PipelineStatus::Failed, 120),
        ] {
            let id = pending_pipeline(&ledger).await;
            PipelineRepo::update_status(&ledger, &id, PipelineStatus::Running, None, None).await.unwrap();
            PipelineRepo::update_status(&ledger, &id, status, Some(duration), None).await.unwrap();
        }
        let running = pending_pipeline(&ledger).await;
        PipelineRepo::update_status(&ledger, &running, PipelineStatus::Running, None, None).await.unwrap();

        let stats = ledger.statistics(7).await.unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.successful, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.running, 1);
        assert_eq!(stats.avg_duration_minutes, Some(2.0));
        assert_eq!(stats.success_rate, Some(50.0));
    }

    #[tokio::test]
    async fn test_statistics_empty() {
        let ledger = MemoryLedger::new();
        let stats = ledger.statistics(7).await.unwrap();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.success_rate, None);
        assert_eq!(stats.avg_duration_minutes, None);
    }

    #[tokio::test]
    async fn test_analysis_roundtrip_and_summary() {
        let ledger = MemoryLedger::new();
        let id = pending_pipeline(&ledger).await;

        let saved = ledger
            .save(NewAnalysis {
                pipeline_id: id.clone(),
                project_key: "erp".to_string(),
                analysis_key: "AX-1".to_string(),
                gate_status: "OK".to_string(),
                metrics: MetricSnapshot {
                    bugs: 2,
                    coverage_percent: Some(92.5),
                    ..Default::default()
                },
                dashboard_url: Some("http://sonar/dashboard?id=erp".to_string()),
                report: None,
            })
            .await
            .unwrap();

        let latest = ledger.latest_for_pipeline(&id).await.unwrap().unwrap();
        assert_eq!(latest.id, saved.id);
        assert_eq!(latest.quality_gate_status, "OK");
        assert_eq!(latest.metrics().coverage_percent, Some(92.5));

        let summary = ledger.gate_summary(30).await.unwrap();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].project_key, "erp");
        assert_eq!(summary[0].passed, 1);
        assert_eq!(summary[0].failed, 0);
        assert_eq!(summary[0].avg_bugs, Some(2.0));
    }

    #[tokio::test]
    async fn test_analysis_requires_pipeline() {
        let ledger = MemoryLedger::new();
        let result = ledger
            .save(NewAnalysis {
                pipeline_id: PipelineId::from("missing"),
                project_key: "erp".to_string(),
                analysis_key: String::new(),
                gate_status: "OK".to_string(),
                metrics: MetricSnapshot::default(),
                dashboard_url: None,
                report: None,
            })
            .await;
        assert!(matches!(result, Err(DbError::NotFound(_))));
    }

    fn new_file(attachment_id: i64) -> NewExternalFile {
        NewExternalFile {
            issue_id: 4021,
            attachment_id,
            filename: "report.epf".to_string(),
            file_type: "epf".to_string(),
            file_size_bytes: Some(2048),
            file_path: Some("/data/inbox/report.epf".to_string()),
            version: None,
        }
    }

    #[tokio::test]
    async fn test_file_update_keeps_unsupplied_fields() {
        let ledger = MemoryLedger::new();
        let file = ExternalFileRepo::create(&ledger, new_file(9)).await.unwrap();
        assert_eq!(file.version, DEFAULT_FILE_VERSION);

        ExternalFileRepo::update_status(
                &ledger,
                file.id,
                FileStatus::Processing,
                FileUpdate {
                    git_branch: Some("external-file-4021".to_string()),
                    decompiled_path: Some("/data/src/report".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let processing = ExternalFileRepo::get(&ledger, file.id).await.unwrap();
        assert!(processing.processed_at.is_none());

        ExternalFileRepo::update_status(
                &ledger,
                file.id,
                FileStatus::Completed,
                FileUpdate {
                    git_commit_hash: Some("deadbeef".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let fetched = ledger.get_by_attachment(9).await.unwrap().unwrap();
        assert_eq!(fetched.status().unwrap(), FileStatus::Completed);
        assert_eq!(fetched.git_commit_hash.as_deref(), Some("deadbeef"));
        assert_eq!(fetched.git_branch.as_deref(), Some("external-file-4021"));
        assert_eq!(fetched.decompiled_path.as_deref(), Some("/data/src/report"));
        assert!(fetched.processed_at.is_some());
    }

    #[tokio::test]
    async fn test_get_by_attachment_returns_latest() {
        let ledger = MemoryLedger::new();
        ExternalFileRepo::create(&ledger, new_file(5)).await.unwrap();
        let second = ExternalFileRepo::create(&ledger, new_file(5)).await.unwrap();

        let fetched = ledger.get_by_attachment(5).await.unwrap().unwrap();
        assert_eq!(fetched.id, second.id);
        assert!(ledger.get_by_attachment(6).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pending_files_oldest_first() {
        let ledger = MemoryLedger::new();
        let a = ExternalFileRepo::create(&ledger, new_file(1)).await.unwrap();
        let b = ExternalFileRepo::create(&ledger, new_file(2)).await.unwrap();
        let c = ExternalFileRepo::create(&ledger, new_file(3)).await.unwrap();
        ExternalFileRepo::update_status(&ledger, b.id, FileStatus::Processing, FileUpdate::default())
            .await
            .unwrap();

        let pending = ExternalFileRepo::pending(&ledger).await.unwrap();
        let ids: Vec<i64> = pending.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![a.id, c.id]);
    }

    #[tokio::test]
    async fn test_notification_retry_counting() {
        let ledger = MemoryLedger::new();
        let note = NotificationRepo::create(
            &ledger,
            NewNotification {
                issue_id: Some(4021),
                notification_type: "file_result".to_string(),
                title: "t".to_string(),
                body: "b".to_string(),
                pipeline_id: None,
                analysis_id: None,
                external_file_id: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(note.retry_count, 0);

        for _ in 0..2 {
            NotificationRepo::update_status(&ledger, note.id, NotificationStatus::Failed, Some("503"))
                .await
                .unwrap();
        }
        let failed = NotificationRepo::get(&ledger, note.id).await.unwrap();
        assert_eq!(failed.retry_count, 2);
        assert_eq!(failed.error_message.as_deref(), Some("503"));
        assert_eq!(NotificationRepo::pending(&ledger, 10).await.unwrap().len(), 1);

        NotificationRepo::update_status(&ledger, note.id, NotificationStatus::Failed, Some("503"))
            .await
            .unwrap();
        assert!(NotificationRepo::pending(&ledger, 10).await.unwrap().is_empty());

        NotificationRepo::update_status(&ledger, note.id, NotificationStatus::Sent, None)
            .await
            .unwrap();
        let sent = NotificationRepo::get(&ledger, note.id).await.unwrap();
        assert_eq!(sent.retry_count, 3);
        assert!(sent.sent_at.is_some());
        assert!(sent.error_message.is_none());
    }

    #[tokio::test]
    async fn test_config_upsert_and_secret_filtering() {
        let ledger = MemoryLedger::new();
        ledger
            .set("build-system", "sync_project_ref", "12", false, Some("main project"))
            .await
            .unwrap();
        ledger
            .set("build-system", "trigger_token", "s3cret", true, None)
            .await
            .unwrap();
        ledger
            .set("build-system", "sync_project_ref", "13", false, None)
            .await
            .unwrap();

        assert_eq!(
            ConfigRepo::get(&ledger, "build-system", "sync_project_ref").await.unwrap(),
            Some("13".to_string())
        );
        assert_eq!(
            ConfigRepo::get(&ledger, "build-system", "trigger_token").await.unwrap(),
            Some("s3cret".to_string())
        );

        let visible = ledger.all_non_secret("build-system").await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible.get("sync_project_ref").map(String::as_str), Some("13"));

        let state = ledger.state.lock().await;
        let entry = state
            .config
            .get(&("build-system".to_string(), "sync_project_ref".to_string()))
            .unwrap();
        assert_eq!(entry.description.as_deref(), Some("main project"));
    }

    #[tokio::test]
    async fn test_operations_and_metrics() {
        let ledger = MemoryLedger::new();
        ledger
            .record(NewOperation {
                operation_type: "trigger_sync".to_string(),
                service: "coordinator".to_string(),
                status: "success".to_string(),
                details: Some(json!({"commit": "abc"})),
                duration_seconds: Some(0.4),
            })
            .await
            .unwrap();
        ledger
            .save_metric(MetricSample {
                name: "active_pipelines".to_string(),
                value: 2.0,
                unit: Some("count".to_string()),
                service: Some("coordinator".to_string()),
                metadata: None,
            })
            .await
            .unwrap();

        let ops = OperationRepo::recent(&ledger, 10).await.unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].operation_type, "trigger_sync");
        assert_eq!(ledger.metric_count("active_pipelines").await, 1);
    }

    #[tokio::test]
    async fn test_metrics_filtered_newest_first() {
        let ledger = MemoryLedger::new();
        for (name, value, service) in [
            ("active_pipelines", 1.0, "coordinator"),
            ("pipeline_duration_seconds", 312.0, "coordinator"),
            ("active_pipelines", 3.0, "coordinator"),
            ("active_pipelines", 9.0, "gitsync"),
        ] {
            OperationRepo::save_metric(
                &ledger,
                MetricSample {
                    name: name.to_string(),
                    value,
                    unit: None,
                    service: Some(service.to_string()),
                    metadata: None,
                },
            )
            .await
            .unwrap();
        }

        let query = MetricQuery {
            name: Some("active_pipelines".to_string()),
            service: Some("coordinator".to_string()),
            ..Default::default()
        };
        let samples = OperationRepo::metrics(&ledger, &query).await.unwrap();
        let values: Vec<f64> = samples.iter().map(|m| m.metric_value).collect();
        assert_eq!(values, vec![3.0, 1.0]);

        let limited = MetricQuery {
            limit: 2,
            ..Default::default()
        };
        let samples = OperationRepo::metrics(&ledger, &limited).await.unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].service.as_deref(), Some("gitsync"));
    }

    #[tokio::test]
    async fn test_quality_trends_average_per_day() {
        let ledger = MemoryLedger::new();
        let id = pending_pipeline(&ledger).await;
        for (project_key, bugs, coverage) in [("erp", 2, Some(90.0)), ("erp", 4, None), ("crm", 50, Some(10.0))] {
            AnalysisRepo::save(
                &ledger,
                NewAnalysis {
                    pipeline_id: id.clone(),
                    project_key: project_key.to_string(),
                    analysis_key: "AX".to_string(),
                    gate_status: "OK".to_string(),
                    metrics: MetricSnapshot {
                        bugs,
                        coverage_percent: coverage,
                        ..Default::default()
                    },
                    dashboard_url: None,
                    report: None,
                },
            )
            .await
            .unwrap();
        }

        let trends = AnalysisRepo::trends(&ledger, "erp", 30).await.unwrap();
        assert_eq!(trends.len(), 1);
        assert_eq!(trends[0].day, Utc::now().date_naive());
        assert_eq!(trends[0].analyses, 2);
        assert_eq!(trends[0].avg_bugs, Some(3.0));
        assert_eq!(trends[0].avg_coverage, Some(90.0));

        assert!(AnalysisRepo::trends(&ledger, "unknown", 30).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_link_issue_to_notification() {
        let ledger = MemoryLedger::new();
        let note = NotificationRepo::create(
            &ledger,
            NewNotification {
                issue_id: None,
                notification_type: "sync_summary".to_string(),
                title: "t".to_string(),
                body: "b".to_string(),
                pipeline_id: None,
                analysis_id: None,
                external_file_id: None,
            },
        )
        .await
        .unwrap();

        NotificationRepo::link_issue(&ledger, note.id, 512).await.unwrap();
        assert_eq!(NotificationRepo::get(&ledger, note.id).await.unwrap().issue_id, Some(512));
        assert!(matches!(
            NotificationRepo::link_issue(&ledger, 9999, 1).await.unwrap_err(),
            DbError::NotFound(_)
        ));
    }
}
