//! Operation log and system metric commands.

use anyhow::Result;
use conductor_db::{Ledger, MetricQuery};

use super::{or_dash, timestamp};

pub async fn operations(ledger: &Ledger, limit: i64) -> Result<String> {
    let records = ledger.operations.recent(limit).await?;
    if records.is_empty() {
        return Ok("No operations recorded\n".to_string());
    }

    let mut out = format!(
        "{:<19} {:<28} {:<12} {:<8} {}\n",
        "TIME", "OPERATION", "SERVICE", "STATUS", "DURATION"
    );
    for r in &records {
        out.push_str(&format!(
            "{:<19} {:<28} {:<12} {:<8} {}\n",
            timestamp(Some(r.created_at)),
            r.operation_type,
            r.service,
            r.status,
            r.duration_seconds
                .map(|s| format!("{:.2}s", s))
                .unwrap_or_else(|| "-".to_string())
        ));
    }
    Ok(out)
}

pub async fn metrics(ledger: &Ledger, query: &MetricQuery) -> Result<String> {
    let samples = ledger.operations.metrics(query).await?;
    if samples.is_empty() {
        return Ok(format!("No metrics in the last {} hours\n", query.hours_back));
    }

    let mut out = format!(
        "{:<19} {:<28} {:>12} {:<8} {}\n",
        "TIME", "METRIC", "VALUE", "UNIT", "SERVICE"
    );
    for m in &samples {
        out.push_str(&format!(
            "{:<19} {:<28} {:>12} {:<8} {}\n",
            timestamp(Some(m.created_at)),
            m.metric_name,
            m.metric_value,
            or_dash(m.metric_unit.as_deref()),
            or_dash(m.service.as_deref())
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_db::{MetricSample, NewOperation};

    #[tokio::test]
    async fn test_operations_newest_first() {
        let ledger = Ledger::in_memory();
        assert_eq!(operations(&ledger, 10).await.unwrap(), "No operations recorded\n");

        for (operation, status) in [("trigger_sync_pipeline", "success"), ("handle_completion", "failed")] {
            ledger
                .operations
                .record(NewOperation {
                    operation_type: operation.to_string(),
                    service: "coordinator".to_string(),
                    status: status.to_string(),
                    details: None,
                    duration_seconds: Some(1.5),
                })
                .await
                .unwrap();
        }

        let out = operations(&ledger, 10).await.unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("handle_completion"));
        assert!(lines[2].contains("trigger_sync_pipeline"));
        assert!(lines[2].contains("1.50s"));
    }

    #[tokio::test]
    async fn test_metrics_filtered_by_name() {
        let ledger = Ledger::in_memory();
        for (name, value) in [("active_pipelines", 2.0), ("pipeline_duration_seconds", 312.0)] {
            ledger
                .operations
                .save_metric(MetricSample {
                    name: name.to_string(),
                    value,
                    unit: Some("count".to_string()),
                    service: Some("coordinator".to_string()),
                    metadata: None,
                })
                .await
                .unwrap();
        }

        let query = MetricQuery {
            name: Some("pipeline_duration_seconds".to_string()),
            ..Default::default()
        };
        let out = metrics(&ledger, &query).await.unwrap();
        assert!(out.contains("pipeline_duration_seconds"));
        assert!(out.contains("312"));
        assert!(!out.contains("active_pipelines"));

        let query = MetricQuery {
            name: Some("unknown".to_string()),
            hours_back: 6,
            ..Default::default()
        };
        assert_eq!(metrics(&ledger, &query).await.unwrap(), "No metrics in the last 6 hours\n");
    }
}
