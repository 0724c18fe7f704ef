//! Code-quality service trait and metric types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::Result;

/// Metric keys fetched after every successful analysis.
pub const DEFAULT_METRIC_KEYS: [&str; 7] = [
    "bugs",
    "vulnerabilities",
    "code_smells",
    "coverage",
    "duplicated_lines_density",
    "ncloc",
    "sqale_index",
];

/// Gate status reported when the quality service has no verdict.
pub const UNKNOWN_GATE: &str = "UNKNOWN";

/// Quality-gate verdict for a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityGate {
    /// Verdict as reported by the service (e.g. `OK`, `ERROR`).
    pub status: String,
    /// Identifier of the analysis the verdict belongs to.
    pub analysis_id: Option<String>,
}

impl QualityGate {
    pub fn passed(&self) -> bool {
        self.status == "OK" || self.status == "PASSED"
    }
}

/// Snapshot of the metrics persisted with an analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub bugs: i64,
    pub vulnerabilities: i64,
    pub code_smells: i64,
    pub coverage_percent: Option<f64>,
    pub duplicated_lines_percent: Option<f64>,
    pub lines_of_code: Option<i64>,
    pub technical_debt_minutes: Option<i64>,
}

impl MetricSnapshot {
    /// Build a snapshot from a measure map keyed by metric key.
    ///
    /// Missing counters default to zero; missing percentages stay unknown.
    pub fn from_measures(measures: &HashMap<String, f64>) -> Self {
        let count = |key: &str| measures.get(key).map(|v| v.round() as i64);
        Self {
            bugs: count("bugs").unwrap_or(0),
            vulnerabilities: count("vulnerabilities").unwrap_or(0),
            code_smells: count("code_smells").unwrap_or(0),
            coverage_percent: measures.get("coverage").copied(),
            duplicated_lines_percent: measures.get("duplicated_lines_density").copied(),
            lines_of_code: count("ncloc"),
            technical_debt_minutes: count("sqale_index"),
        }
    }
}

/// Trait for code-quality services.
#[async_trait]
pub trait QualityService: Send + Sync {
    fn name(&self) -> &'static str;

    /// Get the quality-gate verdict of the latest analysis of a project.
    async fn gate_status(&self, project_key: &str) -> Result<QualityGate>;

    /// Get numeric measures for a project.
    async fn measures(
        &self,
        project_key: &str,
        metric_keys: &[&str],
    ) -> Result<HashMap<String, f64>>;

    /// Link to the project's dashboard.
    fn dashboard_url(&self, project_key: &str) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_from_measures() {
        let measures: HashMap<String, f64> = [
            ("bugs".to_string(), 0.0),
            ("coverage".to_string(), 92.5),
            ("ncloc".to_string(), 1200.0),
        ]
        .into_iter()
        .collect();

        let snapshot = MetricSnapshot::from_measures(&measures);
        assert_eq!(snapshot.bugs, 0);
        assert_eq!(snapshot.vulnerabilities, 0);
        assert_eq!(snapshot.coverage_percent, Some(92.5));
        assert_eq!(snapshot.duplicated_lines_percent, None);
        assert_eq!(snapshot.lines_of_code, Some(1200));
        assert_eq!(snapshot.technical_debt_minutes, None);
    }

    #[test]
    fn test_gate_passed() {
        let ok = QualityGate {
            status: "OK".to_string(),
            analysis_id: None,
        };
        let error = QualityGate {
            status: "ERROR".to_string(),
            analysis_id: None,
        };
        assert!(ok.passed());
        assert!(!error.passed());
    }
}
