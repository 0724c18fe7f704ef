//! Server status command.

use anyhow::{Context, Result};
use serde::Deserialize;
use url::Url;

#[derive(Debug, Deserialize)]
struct StatusResponse {
    active_count: usize,
    pipelines: Vec<ActivePipeline>,
}

#[derive(Debug, Deserialize)]
struct ActivePipeline {
    pipeline_id: String,
    kind: String,
    external_build_id: i64,
    elapsed_minutes: f64,
}

pub async fn show(api_url: &str) -> Result<String> {
    let url = Url::parse(api_url)
        .and_then(|base| base.join("status"))
        .with_context(|| format!("invalid server URL {}", api_url))?;

    let status: StatusResponse = reqwest::get(url.clone())
        .await
        .with_context(|| format!("requesting {}", url))?
        .error_for_status()?
        .json()
        .await?;

    let mut out = format!("Active pipelines: {}\n", status.active_count);
    for p in &status.pipelines {
        out.push_str(&format!(
            "  {}  {}  build #{}  {:.1} min\n",
            p.pipeline_id, p.kind, p.external_build_id, p.elapsed_minutes
        ));
    }
    Ok(out)
}
