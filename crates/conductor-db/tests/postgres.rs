//! Ledger tests against a live PostgreSQL database.
//!
//! Run with `DATABASE_URL=postgres://... cargo test -p conductor-db -- --ignored`.

use conductor_core::{FileStatus, NotificationStatus, PipelineKind, PipelineStatus};
use conductor_core::quality::MetricSnapshot;
use conductor_db::{
    FileUpdate, Ledger, MetricQuery, MetricSample, NewAnalysis, NewExternalFile, NewNotification,
    NewPipeline, create_pool, run_migrations,
};
use serde_json::json;

async fn ledger() -> Ledger {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = create_pool(&url, 2).await.expect("connect");
    run_migrations(&pool).await.expect("migrate");
    Ledger::postgres(pool)
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_pipeline_lifecycle_round_trips() {
    let ledger = ledger().await;
    ledger.ping().await.unwrap();

    let created = ledger
        .pipelines
        .create(
            NewPipeline::new(PipelineKind::Sync, "itest", "integration-test")
                .with_commit("abc123")
                .with_metadata(json!({"changes": 3})),
        )
        .await
        .unwrap();
    let id = created.logical_id();

    assert!(
        ledger
            .pipelines
            .update_status(&id, PipelineStatus::Running, None, Some(json!({"external_build_id": 5})))
            .await
            .unwrap()
    );
    assert!(
        ledger
            .pipelines
            .update_status(&id, PipelineStatus::Success, Some(120), None)
            .await
            .unwrap()
    );
    assert!(
        !ledger
            .pipelines
            .update_status(&id, PipelineStatus::Failed, None, None)
            .await
            .unwrap()
    );

    let record = ledger.pipelines.get(&id).await.unwrap();
    assert_eq!(record.status().unwrap(), PipelineStatus::Success);
    assert_eq!(record.duration_seconds, Some(120));
    assert_eq!(record.metadata_i64("changes"), Some(3));
    assert_eq!(record.metadata_i64("external_build_id"), Some(5));
    assert!(record.started_at.is_some());
    assert!(record.completed_at.is_some());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_external_file_update_keeps_existing_fields() {
    let ledger = ledger().await;
    let attachment_id = chrono::Utc::now().timestamp_micros();

    let file = ledger
        .files
        .create(NewExternalFile {
            issue_id: 1,
            attachment_id,
            filename: "report.epf".to_string(),
            file_type: "epf".to_string(),
            file_size_bytes: None,
            file_path: None,
            version: None,
        })
        .await
        .unwrap();

    ledger
        .files
        .update_status(
            file.id,
            FileStatus::Processing,
            FileUpdate {
                git_branch: Some("external-file-1".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    ledger
        .files
        .update_status(
            file.id,
            FileStatus::Completed,
            FileUpdate {
                git_commit_hash: Some("deadbeef".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let fetched = ledger.files.get_by_attachment(attachment_id).await.unwrap().unwrap();
    assert_eq!(fetched.status().unwrap(), FileStatus::Completed);
    assert_eq!(fetched.git_commit_hash.as_deref(), Some("deadbeef"));
    assert_eq!(fetched.git_branch.as_deref(), Some("external-file-1"));
    assert!(fetched.processed_at.is_some());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_notification_failures_count_retries() {
    let ledger = ledger().await;
    let note = ledger
        .notifications
        .create(NewNotification {
            issue_id: Some(1),
            notification_type: "itest".to_string(),
            title: "title".to_string(),
            body: "body".to_string(),
            pipeline_id: None,
            analysis_id: None,
            external_file_id: None,
        })
        .await
        .unwrap();

    ledger
        .notifications
        .update_status(note.id, NotificationStatus::Failed, Some("timeout"))
        .await
        .unwrap();
    let failed = ledger.notifications.get(note.id).await.unwrap();
    assert_eq!(failed.retry_count, 1);
    assert_eq!(failed.error_message.as_deref(), Some("timeout"));

    ledger.notifications.link_issue(note.id, 77).await.unwrap();
    assert_eq!(ledger.notifications.get(note.id).await.unwrap().issue_id, Some(77));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_trends_and_metrics_queries() {
    let ledger = ledger().await;
    let stamp = chrono::Utc::now().timestamp_micros();
    let project_key = format!("itest-{stamp}");

    let pipeline = ledger
        .pipelines
        .create(NewPipeline::new(PipelineKind::Sync, "itest", "integration-test"))
        .await
        .unwrap();
    for bugs in [1, 3] {
        ledger
            .analyses
            .save(NewAnalysis {
                pipeline_id: pipeline.logical_id(),
                project_key: project_key.clone(),
                analysis_key: "AX".to_string(),
                gate_status: "OK".to_string(),
                metrics: MetricSnapshot {
                    bugs,
                    ..Default::default()
                },
                dashboard_url: None,
                report: None,
            })
            .await
            .unwrap();
    }

    let trends = ledger.analyses.trends(&project_key, 1).await.unwrap();
    assert_eq!(trends.len(), 1);
    assert_eq!(trends[0].analyses, 2);
    assert_eq!(trends[0].avg_bugs, Some(2.0));
    assert_eq!(trends[0].avg_coverage, None);

    let metric_name = format!("itest_metric_{stamp}");
    ledger
        .operations
        .save_metric(MetricSample {
            name: metric_name.clone(),
            value: 4.5,
            unit: Some("count".to_string()),
            service: Some("itest".to_string()),
            metadata: None,
        })
        .await
        .unwrap();
    let samples = ledger
        .operations
        .metrics(&MetricQuery {
            name: Some(metric_name),
            hours_back: 1,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].metric_value, 4.5);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_secret_config_is_hidden_from_listing() {
    let ledger = ledger().await;
    let service = format!("itest-{}", chrono::Utc::now().timestamp_micros());

    ledger
        .config
        .set(&service, "project_ref", "42", false, Some("build project"))
        .await
        .unwrap();
    ledger
        .config
        .set(&service, "token", "hunter2", true, None)
        .await
        .unwrap();

    let visible = ledger.config.all_non_secret(&service).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(
        ledger.config.get(&service, "token").await.unwrap().as_deref(),
        Some("hunter2")
    );
}
