//! SonarQube Web API client.

use async_trait::async_trait;
use conductor_core::quality::{QualityGate, QualityService, UNKNOWN_GATE};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::ClientResult;
use crate::http::{build_client, endpoint, json, parse_base};

const SYSTEM: &str = "sonarqube";

/// Client for quality-gate verdicts and project measures.
#[derive(Debug, Clone)]
pub struct SonarQubeClient {
    http: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectStatusResponse {
    project_status: ProjectStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectStatus {
    status: Option<String>,
    analysis_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MeasuresResponse {
    component: Component,
}

#[derive(Debug, Deserialize)]
struct Component {
    #[serde(default)]
    measures: Vec<Measure>,
}

#[derive(Debug, Deserialize)]
struct Measure {
    metric: String,
    value: Option<String>,
}

impl SonarQubeClient {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> ClientResult<Self> {
        Ok(Self {
            http: build_client(timeout)?,
            base_url: parse_base(base_url)?,
            token,
        })
    }

    /// Tokens are sent as the basic-auth user with an empty password.
    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.basic_auth(token, Some("")),
            None => request,
        }
    }

    pub async fn project_status(&self, project_key: &str) -> ClientResult<QualityGate> {
        let url = endpoint(&self.base_url, &["api", "qualitygates", "project_status"])?;
        let response = self
            .authorize(self.http.get(url).query(&[("projectKey", project_key)]))
            .send()
            .await?;
        let body: ProjectStatusResponse = json(response).await?;

        let gate = QualityGate {
            status: body
                .project_status
                .status
                .unwrap_or_else(|| UNKNOWN_GATE.to_string()),
            analysis_id: body.project_status.analysis_id,
        };
        debug!(project_key, gate = %gate.status, "Quality gate fetched");
        Ok(gate)
    }

    /// Fetch measures as numbers. Values that are not numeric are skipped.
    pub async fn component_measures(
        &self,
        project_key: &str,
        metric_keys: &[&str],
    ) -> ClientResult<HashMap<String, f64>> {
        let url = endpoint(&self.base_url, &["api", "measures", "component"])?;
        let keys = metric_keys.join(",");
        let response = self
            .authorize(
                self.http
                    .get(url)
                    .query(&[("component", project_key), ("metricKeys", keys.as_str())]),
            )
            .send()
            .await?;
        let body: MeasuresResponse = json(response).await?;

        let mut measures = HashMap::new();
        for measure in body.component.measures {
            let Some(raw) = measure.value else { continue };
            match raw.parse::<f64>() {
                Ok(value) => {
                    measures.insert(measure.metric, value);
                }
                Err(_) => warn!(project_key, metric = %measure.metric, value = %raw, "Skipping non-numeric measure"),
            }
        }
        Ok(measures)
    }
}

#[async_trait]
impl QualityService for SonarQubeClient {
    fn name(&self) -> &'static str {
        SYSTEM
    }

    async fn gate_status(&self, project_key: &str) -> conductor_core::Result<QualityGate> {
        self.project_status(project_key)
            .await
            .map_err(|e| e.into_external(SYSTEM))
    }

    async fn measures(
        &self,
        project_key: &str,
        metric_keys: &[&str],
    ) -> conductor_core::Result<HashMap<String, f64>> {
        self.component_measures(project_key, metric_keys)
            .await
            .map_err(|e| e.into_external(SYSTEM))
    }

    fn dashboard_url(&self, project_key: &str) -> String {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("dashboard");
        }
        url.query_pairs_mut().clear().append_pair("id", project_key);
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dashboard_url() {
        let client =
            SonarQubeClient::new("http://sonar.local:9000/", None, Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.dashboard_url("conductor-sync"),
            "http://sonar.local:9000/dashboard?id=conductor-sync"
        );
    }
}
