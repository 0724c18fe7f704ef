//! Variable interpolation for notification messages.
//!
//! Supports variables like:
//! - `${pipeline.id}` - Logical pipeline id
//! - `${pipeline.type}` - `sync` or `file-ingest`
//! - `${pipeline.project}` - Project the pipeline belongs to
//! - `${pipeline.status}` - Final pipeline status
//! - `${pipeline.url}` - Link to the pipeline in the build system
//! - `${pipeline.completed_at}` - Completion time
//! - `${pipeline.duration}` - Duration in seconds
//! - `${git.commit}` / `${git.short_commit}` - Commit hash (short is 8 chars)
//! - `${git.branch}` - Branch the pipeline ran on
//! - `${quality.gate}` / `${quality.verdict}` - Gate status and passed/failed
//! - `${quality.bugs}`, `${quality.vulnerabilities}`, `${quality.code_smells}`
//! - `${quality.coverage}`, `${quality.duplication}`, `${quality.lines_of_code}`
//! - `${quality.technical_debt}` - Technical debt in minutes
//! - `${quality.dashboard}` - Link to the quality dashboard
//! - `${file.name}`, `${file.id}`, `${file.issue_id}` - Ingested file
//! - `${date}` - ISO date (YYYY-MM-DD)
//! - `${datetime}` - ISO datetime
//!
//! Unknown variables are left in place. Known but unset optional values render
//! as `n/a`.

use chrono::{DateTime, Utc};
use conductor_core::quality::{MetricSnapshot, QualityGate};
use conductor_core::{PipelineId, PipelineKind};
use regex::Regex;
use std::sync::LazyLock;

const NOT_AVAILABLE: &str = "n/a";

/// Variables available to message templates.
#[derive(Debug, Clone, Default)]
pub struct MessageContext {
    pub pipeline: PipelineVars,
    pub git: GitVars,
    pub quality: Option<QualityVars>,
    pub file: FileVars,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineVars {
    pub id: String,
    pub kind: String,
    pub project: String,
    pub status: String,
    pub url: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct GitVars {
    pub commit: Option<String>,
    pub branch: Option<String>,
}

#[derive(Debug, Clone)]
pub struct QualityVars {
    pub gate: QualityGate,
    pub metrics: MetricSnapshot,
    pub dashboard: String,
}

#[derive(Debug, Clone, Default)]
pub struct FileVars {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub issue_id: Option<i64>,
}

// Regex for matching ${...} variables
static VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)?)\}")
        .expect("variable pattern is valid")
});

fn or_na<T: ToString>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

impl MessageContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a variable name to its value.
    pub fn resolve(&self, var_name: &str) -> Option<String> {
        let parts: Vec<&str> = var_name.split('.').collect();

        match parts.as_slice() {
            ["pipeline", "id"] => Some(self.pipeline.id.clone()),
            ["pipeline", "type"] => Some(self.pipeline.kind.clone()),
            ["pipeline", "project"] => Some(self.pipeline.project.clone()),
            ["pipeline", "status"] => Some(self.pipeline.status.clone()),
            ["pipeline", "url"] => Some(or_na(self.pipeline.url.as_deref())),
            ["pipeline", "completed_at"] => Some(or_na(
                self.pipeline
                    .completed_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC")),
            )),
            ["pipeline", "duration"] => Some(or_na(self.pipeline.duration_secs)),

            ["git", "commit"] => Some(or_na(self.git.commit.as_deref())),
            ["git", "short_commit"] => Some(or_na(
                self.git
                    .commit
                    .as_deref()
                    .map(|c| c.chars().take(8).collect::<String>()),
            )),
            ["git", "branch"] => Some(or_na(self.git.branch.as_deref())),

            ["quality", name] => Some(self.resolve_quality(name)),

            ["file", "id"] => Some(or_na(self.file.id)),
            ["file", "name"] => Some(or_na(self.file.name.as_deref())),
            ["file", "issue_id"] => Some(or_na(self.file.issue_id)),

            ["date"] => Some(Utc::now().format("%Y-%m-%d").to_string()),
            ["datetime"] => Some(Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()),

            _ => None,
        }
    }

    fn resolve_quality(&self, name: &str) -> String {
        let Some(q) = &self.quality else {
            return NOT_AVAILABLE.to_string();
        };
        let m = &q.metrics;

        match name {
            "gate" => q.gate.status.clone(),
            "verdict" => (if q.gate.passed() { "passed" } else { "failed" }).to_string(),
            "bugs" => m.bugs.to_string(),
            "vulnerabilities" => m.vulnerabilities.to_string(),
            "code_smells" => m.code_smells.to_string(),
            "coverage" => or_na(m.coverage_percent),
            "duplication" => or_na(m.duplicated_lines_percent),
            "lines_of_code" => or_na(m.lines_of_code),
            "technical_debt" => or_na(m.technical_debt_minutes),
            "dashboard" => q.dashboard.clone(),
            _ => NOT_AVAILABLE.to_string(),
        }
    }

    /// Interpolate all variables in a string.
    pub fn render(&self, template: &str) -> String {
        VAR_REGEX
            .replace_all(template, |caps: &regex::Captures| {
                let var_name = &caps[1];
                self.resolve(var_name)
                    .unwrap_or_else(|| format!("${{{}}}", var_name))
            })
            .to_string()
    }
}

/// Builder for creating MessageContext.
pub struct MessageContextBuilder {
    ctx: MessageContext,
}

impl MessageContextBuilder {
    pub fn new() -> Self {
        Self {
            ctx: MessageContext::new(),
        }
    }

    pub fn with_pipeline(mut self, id: &PipelineId, kind: PipelineKind, project: &str) -> Self {
        self.ctx.pipeline.id = id.to_string();
        self.ctx.pipeline.kind = kind.to_string();
        self.ctx.pipeline.project = project.to_string();
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.ctx.pipeline.status = status.into();
        self
    }

    pub fn with_pipeline_url(mut self, url: Option<String>) -> Self {
        self.ctx.pipeline.url = url;
        self
    }

    pub fn with_completion(mut self, at: Option<DateTime<Utc>>, duration: Option<i64>) -> Self {
        self.ctx.pipeline.completed_at = at;
        self.ctx.pipeline.duration_secs = duration;
        self
    }

    pub fn with_commit(mut self, commit: Option<String>) -> Self {
        self.ctx.git.commit = commit;
        self
    }

    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        self.ctx.git.branch = branch;
        self
    }

    pub fn with_quality(
        mut self,
        gate: QualityGate,
        metrics: MetricSnapshot,
        dashboard: impl Into<String>,
    ) -> Self {
        self.ctx.quality = Some(QualityVars {
            gate,
            metrics,
            dashboard: dashboard.into(),
        });
        self
    }

    pub fn with_file(mut self, id: i64, name: Option<String>, issue_id: Option<i64>) -> Self {
        self.ctx.file = FileVars {
            id: Some(id),
            name,
            issue_id,
        };
        self
    }

    pub fn build(self) -> MessageContext {
        self.ctx
    }
}

impl Default for MessageContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
