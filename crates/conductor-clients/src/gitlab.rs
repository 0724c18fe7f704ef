//! GitLab API v4 client.

use async_trait::async_trait;
use conductor_core::build::{BuildReport, BuildStatus, BuildSystem, TriggerVariables, TriggeredBuild};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::http::{build_client, endpoint, json, parse_base};
use crate::{ClientError, ClientResult};

const SYSTEM: &str = "gitlab";

/// Client for triggering and polling GitLab CI pipelines.
#[derive(Debug, Clone)]
pub struct GitLabClient {
    http: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

#[derive(Debug, Serialize)]
struct TriggerRequest<'a> {
    #[serde(rename = "ref")]
    git_ref: &'a str,
    variables: Vec<Variable<'a>>,
}

#[derive(Debug, Serialize)]
struct Variable<'a> {
    key: &'a str,
    value: &'a str,
}

#[derive(Debug, Deserialize)]
struct PipelineResponse {
    id: i64,
    status: String,
    web_url: Option<String>,
    duration: Option<f64>,
}

impl GitLabClient {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> ClientResult<Self> {
        Ok(Self {
            http: build_client(timeout)?,
            base_url: parse_base(base_url)?,
            token,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Start a pipeline on `git_ref` of a project.
    pub async fn create_pipeline(
        &self,
        project_ref: &str,
        git_ref: &str,
        variables: &TriggerVariables,
    ) -> ClientResult<TriggeredBuild> {
        let url = endpoint(&self.base_url, &["api", "v4", "projects", project_ref, "pipeline"])?;
        let body = TriggerRequest {
            git_ref,
            variables: variables
                .iter()
                .map(|(key, value)| Variable { key, value })
                .collect(),
        };

        let response = self.authorize(self.http.post(url)).json(&body).send().await?;
        let pipeline: PipelineResponse = json(response).await?;

        info!(
            project = %project_ref,
            git_ref = %git_ref,
            external_id = pipeline.id,
            status = %pipeline.status,
            "GitLab pipeline created"
        );
        Ok(TriggeredBuild {
            external_id: pipeline.id,
            url: pipeline.web_url,
        })
    }

    /// Fetch the current state of a pipeline.
    pub async fn get_pipeline(&self, project_ref: &str, pipeline_id: i64) -> ClientResult<BuildReport> {
        let id = pipeline_id.to_string();
        let url = endpoint(
            &self.base_url,
            &["api", "v4", "projects", project_ref, "pipelines", &id],
        )?;

        let response = self.authorize(self.http.get(url)).send().await?;
        let pipeline: PipelineResponse = json(response).await?;
        if pipeline.id != pipeline_id {
            return Err(ClientError::InvalidResponse(format!(
                "asked for pipeline {pipeline_id}, got {}",
                pipeline.id
            )));
        }

        debug!(project = %project_ref, external_id = pipeline_id, status = %pipeline.status, "GitLab pipeline polled");
        Ok(BuildReport {
            status: BuildStatus::parse(&pipeline.status),
            duration: pipeline.duration.map(|d| d.round() as i64),
        })
    }
}

#[async_trait]
impl BuildSystem for GitLabClient {
    fn name(&self) -> &'static str {
        SYSTEM
    }

    async fn trigger(
        &self,
        project_ref: &str,
        git_ref: &str,
        variables: &TriggerVariables,
    ) -> conductor_core::Result<TriggeredBuild> {
        self.create_pipeline(project_ref, git_ref, variables)
            .await
            .map_err(|e| e.into_external(SYSTEM))
    }

    async fn status(&self, project_ref: &str, external_id: i64) -> conductor_core::Result<BuildReport> {
        self.get_pipeline(project_ref, external_id)
            .await
            .map_err(|e| e.into_external(SYSTEM))
    }
}
