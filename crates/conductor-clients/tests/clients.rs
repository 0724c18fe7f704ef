//! REST client tests against a mocked HTTP server.

use conductor_clients::{ClientError, GitLabClient, IssueDefaults, RedmineClient, SonarQubeClient};
use conductor_core::Error;
use conductor_core::build::{BuildStatus, BuildSystem, TriggerVariables};
use conductor_core::quality::{DEFAULT_METRIC_KEYS, QualityService};
use conductor_core::tracker::IssueTracker;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{basic_auth, body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_gitlab_trigger_sends_ref_and_variables() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v4/projects/42/pipeline"))
        .and(header("Authorization", "Bearer glpat-test"))
        .and(body_json(json!({
            "ref": "main",
            "variables": [
                {"key": "DB_PIPELINE_ID", "value": "sync_erp_20240101_120000_0a1b2c3d"},
                {"key": "PIPELINE_TYPE", "value": "sync"}
            ]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 1001,
            "status": "created",
            "web_url": "http://gitlab/erp/-/pipelines/1001",
            "duration": null
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = GitLabClient::new(&mock_server.uri(), Some("glpat-test".to_string()), TIMEOUT).unwrap();
    let variables: TriggerVariables = [
        ("PIPELINE_TYPE".to_string(), "sync".to_string()),
        (
            "DB_PIPELINE_ID".to_string(),
            "sync_erp_20240101_120000_0a1b2c3d".to_string(),
        ),
    ]
    .into_iter()
    .collect();

    let build = client.trigger("42", "main", &variables).await.unwrap();
    assert_eq!(build.external_id, 1001);
    assert_eq!(build.url.as_deref(), Some("http://gitlab/erp/-/pipelines/1001"));
}

#[tokio::test]
async fn test_gitlab_status_maps_terminal_states() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v4/projects/42/pipelines/1001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1001,
            "status": "success",
            "web_url": "http://gitlab/erp/-/pipelines/1001",
            "duration": 120
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/42/pipelines/1002"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1002,
            "status": "waiting_for_resource",
            "duration": null
        })))
        .mount(&mock_server)
        .await;

    let client = GitLabClient::new(&mock_server.uri(), None, TIMEOUT).unwrap();

    let done = client.status("42", 1001).await.unwrap();
    assert_eq!(done.status, BuildStatus::Success);
    assert_eq!(done.duration, Some(120));

    let waiting = client.status("42", 1002).await.unwrap();
    assert_eq!(waiting.status, BuildStatus::WaitingForResource);
    assert!(!waiting.status.is_terminal());
    assert_eq!(waiting.duration, None);
}

#[tokio::test]
async fn test_gitlab_error_becomes_external_call() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v4/projects/42/pipeline"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "message": {"base": ["Reference not found"]}
        })))
        .mount(&mock_server)
        .await;

    let client = GitLabClient::new(&mock_server.uri(), None, TIMEOUT).unwrap();

    let raw = client
        .create_pipeline("42", "missing", &TriggerVariables::new())
        .await
        .unwrap_err();
    match raw {
        ClientError::Api { status, message } => {
            assert_eq!(status, 400);
            assert!(message.contains("Reference not found"));
        }
        other => panic!("expected API error, got {other:?}"),
    }

    let err = client
        .trigger("42", "missing", &TriggerVariables::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ExternalCall { system: "gitlab", .. }));
}

#[tokio::test]
async fn test_gitlab_timeout_is_an_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v4/projects/42/pipelines/7"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": 7, "status": "running"}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&mock_server)
        .await;

    let client = GitLabClient::new(&mock_server.uri(), None, Duration::from_millis(200)).unwrap();
    let err = client.status("42", 7).await.unwrap_err();
    assert!(matches!(err, Error::ExternalCall { .. }));
}

#[tokio::test]
async fn test_sonarqube_gate_and_measures() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/qualitygates/project_status"))
        .and(query_param("projectKey", "conductor-sync"))
        .and(basic_auth("squ_token", ""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "projectStatus": {"status": "OK", "analysisId": "AYx1", "conditions": []}
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/measures/component"))
        .and(query_param("component", "conductor-sync"))
        .and(query_param("metricKeys", DEFAULT_METRIC_KEYS.join(",").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "component": {
                "key": "conductor-sync",
                "measures": [
                    {"metric": "bugs", "value": "0"},
                    {"metric": "coverage", "value": "92.5"},
                    {"metric": "alert_status", "value": "OK"}
                ]
            }
        })))
        .mount(&mock_server)
        .await;

    let client =
        SonarQubeClient::new(&mock_server.uri(), Some("squ_token".to_string()), TIMEOUT).unwrap();

    let gate = client.gate_status("conductor-sync").await.unwrap();
    assert_eq!(gate.status, "OK");
    assert_eq!(gate.analysis_id.as_deref(), Some("AYx1"));
    assert!(gate.passed());

    let measures = client
        .measures("conductor-sync", &DEFAULT_METRIC_KEYS)
        .await
        .unwrap();
    assert_eq!(measures.len(), 2);
    assert_eq!(measures.get("bugs"), Some(&0.0));
    assert_eq!(measures.get("coverage"), Some(&92.5));
}

#[tokio::test]
async fn test_sonarqube_missing_status_is_unknown() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/qualitygates/project_status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"projectStatus": {}})))
        .mount(&mock_server)
        .await;

    let client = SonarQubeClient::new(&mock_server.uri(), None, TIMEOUT).unwrap();
    let gate = client.gate_status("conductor-files").await.unwrap();
    assert_eq!(gate.status, "UNKNOWN");
    assert!(!gate.passed());
}

#[tokio::test]
async fn test_redmine_create_issue() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/issues.json"))
        .and(header("X-Redmine-API-Key", "rm-key"))
        .and(body_json(json!({
            "issue": {
                "project_id": "ci",
                "subject": "Code analysis - abc12345 (passed)",
                "description": "All good",
                "tracker_id": 2,
                "priority_id": 2
            }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "issue": {"id": 4021, "subject": "Code analysis - abc12345 (passed)"}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = RedmineClient::new(
        &mock_server.uri(),
        Some("rm-key".to_string()),
        TIMEOUT,
        IssueDefaults {
            tracker_id: Some(2),
            priority_id: Some(2),
        },
    )
    .unwrap();

    let id = client
        .create_issue("ci", "Code analysis - abc12345 (passed)", "All good")
        .await
        .unwrap();
    assert_eq!(id, 4021);
}

#[tokio::test]
async fn test_redmine_add_comment() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/issues/4021.json"))
        .and(body_json(json!({"issue": {"notes": "Analysis finished"}})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/issues/9999.json"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let client =
        RedmineClient::new(&mock_server.uri(), None, TIMEOUT, IssueDefaults::default()).unwrap();

    client.add_comment(4021, "Analysis finished").await.unwrap();

    let err = client.add_comment(9999, "lost").await.unwrap_err();
    assert!(matches!(err, Error::ExternalCall { system: "redmine", .. }));
}
