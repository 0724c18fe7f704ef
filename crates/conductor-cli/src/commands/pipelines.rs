//! Pipeline ledger commands.

use anyhow::Result;
use conductor_core::{PipelineId, PipelineKind};
use conductor_db::Ledger;

use super::{or_dash, timestamp};

pub async fn recent(ledger: &Ledger, kind: Option<PipelineKind>, limit: i64) -> Result<String> {
    let pipelines = ledger.pipelines.recent(kind, limit).await?;
    if pipelines.is_empty() {
        return Ok("No pipelines\n".to_string());
    }

    let mut out = format!(
        "{:<48} {:<11} {:<8} {:<19} {}\n",
        "PIPELINE", "TYPE", "STATUS", "CREATED", "DURATION"
    );
    for p in &pipelines {
        out.push_str(&format!(
            "{:<48} {:<11} {:<8} {:<19} {}\n",
            p.pipeline_id,
            p.pipeline_type,
            p.status,
            timestamp(Some(p.created_at)),
            p.duration_seconds
                .map(|s| format!("{}s", s))
                .unwrap_or_else(|| "-".to_string())
        ));
    }
    Ok(out)
}

pub async fn show(ledger: &Ledger, id: &str) -> Result<String> {
    let pipeline_id = PipelineId::from(id);
    let p = ledger.pipelines.get(&pipeline_id).await?;

    let mut out = String::new();
    out.push_str(&format!("Pipeline:     {}\n", p.pipeline_id));
    out.push_str(&format!("Type:         {}\n", p.pipeline_type));
    out.push_str(&format!("Project:      {}\n", p.project_name));
    out.push_str(&format!("Status:       {}\n", p.status));
    out.push_str(&format!("Commit:       {}\n", or_dash(p.commit_hash.as_deref())));
    out.push_str(&format!("Branch:       {}\n", or_dash(p.branch_name.as_deref())));
    out.push_str(&format!("Triggered by: {}\n", or_dash(p.triggered_by.as_deref())));
    out.push_str(&format!("Created:      {}\n", timestamp(Some(p.created_at))));
    out.push_str(&format!("Started:      {}\n", timestamp(p.started_at)));
    out.push_str(&format!("Completed:    {}\n", timestamp(p.completed_at)));
    out.push_str(&format!("Duration:     {}\n", or_dash(p.duration_seconds)));
    out.push_str(&format!("Metadata:     {}\n", serde_json::to_string_pretty(&p.metadata)?));

    if let Some(a) = ledger.analyses.latest_for_pipeline(&pipeline_id).await? {
        out.push_str("\nQuality analysis\n");
        out.push_str(&format!("  Project:    {}\n", a.project_key));
        out.push_str(&format!("  Gate:       {}\n", a.quality_gate_status));
        out.push_str(&format!("  Bugs:       {}\n", a.bugs));
        out.push_str(&format!("  Vulns:      {}\n", a.vulnerabilities));
        out.push_str(&format!("  Smells:     {}\n", a.code_smells));
        out.push_str(&format!("  Coverage:   {}\n", or_dash(a.coverage_percent)));
        out.push_str(&format!("  Dashboard:  {}\n", or_dash(a.dashboard_url.as_deref())));
    }
    Ok(out)
}

pub async fn stats(ledger: &Ledger, days: i32) -> Result<String> {
    let s = ledger.pipelines.statistics(days).await?;
    let mut out = format!("Last {} days\n", days);
    out.push_str(&format!("  Total:        {}\n", s.total));
    out.push_str(&format!("  Successful:   {}\n", s.successful));
    out.push_str(&format!("  Failed:       {}\n", s.failed));
    out.push_str(&format!("  Running:      {}\n", s.running));
    out.push_str(&format!(
        "  Success rate: {}\n",
        s.success_rate.map(|r| format!("{:.2}%", r)).unwrap_or_else(|| "-".to_string())
    ));
    out.push_str(&format!(
        "  Avg duration: {}\n",
        s.avg_duration_minutes
            .map(|m| format!("{:.1} min", m))
            .unwrap_or_else(|| "-".to_string())
    ));

    let gates = ledger.analyses.gate_summary(days).await?;
    if !gates.is_empty() {
        out.push_str("\nQuality gates\n");
        for g in &gates {
            out.push_str(&format!(
                "  {:<24} {} analyses, {} passed, {} failed\n",
                g.project_key, g.total_analyses, g.passed, g.failed
            ));
        }
    }
    Ok(out)
}

pub async fn trends(ledger: &Ledger, project_key: &str, days: i32) -> Result<String> {
    let points = ledger.analyses.trends(project_key, days).await?;
    if points.is_empty() {
        return Ok(format!("No analyses for {} in the last {} days\n", project_key, days));
    }

    let average = |v: Option<f64>| v.map(|v| format!("{:.1}", v)).unwrap_or_else(|| "-".to_string());
    let mut out = format!(
        "{:<10} {:>8} {:>8} {:>8} {:>8} {:>8}\n",
        "DAY", "ANALYSES", "BUGS", "VULNS", "SMELLS", "COVERAGE"
    );
    for p in &points {
        out.push_str(&format!(
            "{:<10} {:>8} {:>8} {:>8} {:>8} {:>8}\n",
            p.day.format("%Y-%m-%d"),
            p.analyses,
            average(p.avg_bugs),
            average(p.avg_vulnerabilities),
            average(p.avg_code_smells),
            average(p.avg_coverage),
        ));
    }
    Ok(out)
}
