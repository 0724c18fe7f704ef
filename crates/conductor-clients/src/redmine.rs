//! Redmine REST API client.

use async_trait::async_trait;
use conductor_core::tracker::IssueTracker;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;
use url::Url;

use crate::ClientResult;
use crate::http::{build_client, check, endpoint, json, parse_base};

const SYSTEM: &str = "redmine";
const API_KEY_HEADER: &str = "X-Redmine-API-Key";

/// Tracker and priority applied to issues created by the coordinator.
#[derive(Debug, Clone, Copy, Default)]
pub struct IssueDefaults {
    pub tracker_id: Option<i64>,
    pub priority_id: Option<i64>,
}

/// Client for creating and commenting on Redmine issues.
#[derive(Debug, Clone)]
pub struct RedmineClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
    defaults: IssueDefaults,
}

#[derive(Debug, Serialize)]
struct IssueEnvelope<T> {
    issue: T,
}

#[derive(Debug, Serialize)]
struct NewIssue<'a> {
    project_id: &'a str,
    subject: &'a str,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tracker_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority_id: Option<i64>,
}

#[derive(Debug, Serialize)]
struct IssueNotes<'a> {
    notes: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreatedIssue {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct CreatedEnvelope {
    issue: CreatedIssue,
}

impl RedmineClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
        defaults: IssueDefaults,
    ) -> ClientResult<Self> {
        Ok(Self {
            http: build_client(timeout)?,
            base_url: parse_base(base_url)?,
            api_key,
            defaults,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }

    pub async fn post_issue(&self, project: &str, subject: &str, body: &str) -> ClientResult<i64> {
        let url = endpoint(&self.base_url, &["issues.json"])?;
        let payload = IssueEnvelope {
            issue: NewIssue {
                project_id: project,
                subject,
                description: body,
                tracker_id: self.defaults.tracker_id,
                priority_id: self.defaults.priority_id,
            },
        };

        let response = self.authorize(self.http.post(url)).json(&payload).send().await?;
        let created: CreatedEnvelope = json(response).await?;

        info!(project, issue_id = created.issue.id, "Redmine issue created");
        Ok(created.issue.id)
    }

    pub async fn put_notes(&self, issue_id: i64, notes: &str) -> ClientResult<()> {
        let path = format!("{issue_id}.json");
        let url = endpoint(&self.base_url, &["issues", &path])?;
        let payload = IssueEnvelope {
            issue: IssueNotes { notes },
        };

        let response = self.authorize(self.http.put(url)).json(&payload).send().await?;
        check(response).await?;

        info!(issue_id, "Redmine comment added");
        Ok(())
    }
}

#[async_trait]
impl IssueTracker for RedmineClient {
    fn name(&self) -> &'static str {
        SYSTEM
    }

    async fn create_issue(&self, project: &str, subject: &str, body: &str) -> conductor_core::Result<i64> {
        self.post_issue(project, subject, body)
            .await
            .map_err(|e| e.into_external(SYSTEM))
    }

    async fn add_comment(&self, issue_id: i64, body: &str) -> conductor_core::Result<()> {
        self.put_notes(issue_id, body)
            .await
            .map_err(|e| e.into_external(SYSTEM))
    }
}
