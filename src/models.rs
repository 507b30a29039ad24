//! Wire types shared by the three controllers.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse status of a build job, in pipeline order.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Queued,
    Starting,
    Scaffold,
    Code,
    Deps,
    Checks,
    Ready,
    Failed,
    Scheduled,
    #[serde(other)]
    Unknown,
}

/// Stages shown as progress, in order. Statuses outside this list map to 0.
pub const STAGES: [JobStatus; 7] = [
    JobStatus::Queued,
    JobStatus::Starting,
    JobStatus::Scaffold,
    JobStatus::Code,
    JobStatus::Deps,
    JobStatus::Checks,
    JobStatus::Ready,
];

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Starting => "starting",
            Self::Scaffold => "scaffold",
            Self::Code => "code",
            Self::Deps => "deps",
            Self::Checks => "checks",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Scheduled => "scheduled",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }

    pub fn stage_index(&self) -> usize {
        STAGES.iter().position(|s| s == self).unwrap_or(0)
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "starting" => Ok(Self::Starting),
            "scaffold" => Ok(Self::Scaffold),
            "code" => Ok(Self::Code),
            "deps" => Ok(Self::Deps),
            "checks" => Ok(Self::Checks),
            "ready" => Ok(Self::Ready),
            "failed" => Ok(Self::Failed),
            "scheduled" => Ok(Self::Scheduled),
            "unknown" => Ok(Self::Unknown),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `GET /jobs/{id}/status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusResponse {
    pub status: JobStatus,
    #[serde(default)]
    pub stage_label: String,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub build_version: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub debug_id: Option<String>,
    #[serde(default)]
    pub sandbox_expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sandbox_paused: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogSource {
    Stdout,
    Stderr,
    System,
}

/// One unit of build output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogLine {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub source: LogSource,
    pub text: String,
    #[serde(default)]
    pub phase: Option<String>,
}

/// Body of `GET /jobs/{id}/logs`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogsPage {
    #[serde(default)]
    pub lines: Vec<LogLine>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub oldest_id: Option<String>,
}

/// Terminal outcome carried by the `done` stream event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DoneStatus {
    Ready,
    Failed,
}

impl DoneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DonePayload {
    pub status: DoneStatus,
}

/// Body of `GET /jobs/{id}/preview-check`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreviewCheck {
    pub embeddable: bool,
    #[serde(default)]
    pub preview_url: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Body of a successful `POST /jobs/{id}/resume`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResumeResponse {
    pub preview_url: String,
    #[serde(default)]
    pub sandbox_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_index_follows_pipeline_order() {
        for (i, stage) in STAGES.iter().enumerate() {
            assert_eq!(stage.stage_index(), i);
        }
    }

    #[test]
    fn statuses_outside_the_stage_list_map_to_zero() {
        assert_eq!(JobStatus::Failed.stage_index(), 0);
        assert_eq!(JobStatus::Scheduled.stage_index(), 0);
        assert_eq!(JobStatus::Unknown.stage_index(), 0);
    }

    #[test]
    fn only_ready_and_failed_are_terminal() {
        let terminal: Vec<_> = [
            JobStatus::Queued,
            JobStatus::Starting,
            JobStatus::Scaffold,
            JobStatus::Code,
            JobStatus::Deps,
            JobStatus::Checks,
            JobStatus::Ready,
            JobStatus::Failed,
            JobStatus::Scheduled,
            JobStatus::Unknown,
        ]
        .into_iter()
        .filter(JobStatus::is_terminal)
        .collect();
        assert_eq!(terminal, vec![JobStatus::Ready, JobStatus::Failed]);
    }

    #[test]
    fn unrecognised_status_deserializes_to_unknown() {
        let resp: StatusResponse =
            serde_json::from_str(r#"{"status":"migrating","stage_label":"Migrating"}"#).unwrap();
        assert_eq!(resp.status, JobStatus::Unknown);
        assert_eq!(resp.stage_label, "Migrating");
    }

    #[test]
    fn status_response_optional_fields_default() {
        let resp: StatusResponse = serde_json::from_str(r#"{"status":"code"}"#).unwrap();
        assert_eq!(resp.status, JobStatus::Code);
        assert!(resp.preview_url.is_none());
        assert!(resp.sandbox_expires_at.is_none());
        assert!(!resp.sandbox_paused);
    }

    #[test]
    fn status_response_parses_expiry_timestamp() {
        let resp: StatusResponse = serde_json::from_str(
            r#"{"status":"ready","stage_label":"Ready","preview_url":"https://p.example/1","sandbox_expires_at":"2026-01-01T12:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(
            resp.sandbox_expires_at.unwrap().to_rfc3339(),
            "2026-01-01T12:00:00+00:00"
        );
    }

    #[test]
    fn job_status_from_str_round_trips_display() {
        let status: JobStatus = "deps".parse().unwrap();
        assert_eq!(status, JobStatus::Deps);
        assert_eq!(status.to_string(), "deps");
        assert!("bogus".parse::<JobStatus>().is_err());
    }

    #[test]
    fn log_line_parses_without_phase() {
        let line: LogLine = serde_json::from_str(
            r#"{"id":"42","timestamp":"2026-01-01T00:00:00Z","source":"stderr","text":"warn: x"}"#,
        )
        .unwrap();
        assert_eq!(line.source, LogSource::Stderr);
        assert!(line.phase.is_none());
    }

    #[test]
    fn log_line_rejects_unknown_source() {
        let parsed = serde_json::from_str::<LogLine>(
            r#"{"id":"1","timestamp":"2026-01-01T00:00:00Z","source":"kernel","text":"x"}"#,
        );
        assert!(parsed.is_err());
    }
}
