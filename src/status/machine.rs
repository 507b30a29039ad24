//! Status tracking state machine.
//!
//! Pure state: the poller feeds it one event per fetch attempt. Once a
//! terminal status has been recorded the tracker ignores everything else.

use chrono::{DateTime, Utc};

use crate::errors::ApiError;
use crate::models::{JobStatus, STAGES, StatusResponse};

/// Consecutive failed fetches before `connection_failed` flips.
pub const FAILURE_THRESHOLD: u32 = 3;

#[derive(Debug, Clone)]
pub enum StatusEvent {
    Fetched(StatusResponse),
    FetchFailed(ApiError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusTracker {
    pub job_id: Option<String>,
    pub status: JobStatus,
    pub label: String,
    pub preview_url: Option<String>,
    pub build_version: Option<String>,
    pub error: Option<String>,
    pub debug_id: Option<String>,
    pub sandbox_expires_at: Option<DateTime<Utc>>,
    pub sandbox_paused: bool,
    pub stage_index: usize,
    pub total_stages: usize,
    pub is_terminal: bool,
    pub connection_failed: bool,
    /// Whether any fetch has succeeded for this job yet.
    pub has_data: bool,
    consecutive_failures: u32,
    failure_threshold: u32,
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new(None, FAILURE_THRESHOLD)
    }
}

impl StatusTracker {
    pub fn new(job_id: Option<String>, failure_threshold: u32) -> Self {
        Self {
            job_id,
            status: JobStatus::default(),
            label: String::new(),
            preview_url: None,
            build_version: None,
            error: None,
            debug_id: None,
            sandbox_expires_at: None,
            sandbox_paused: false,
            stage_index: 0,
            total_stages: STAGES.len(),
            is_terminal: false,
            connection_failed: false,
            has_data: false,
            consecutive_failures: 0,
            failure_threshold: failure_threshold.max(1),
        }
    }

    pub fn for_job(job_id: impl Into<String>) -> Self {
        Self::new(Some(job_id.into()), FAILURE_THRESHOLD)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// No fetch may be issued once this is false.
    pub fn should_fetch(&self) -> bool {
        self.job_id.is_some() && !self.is_terminal
    }

    pub fn apply(&mut self, event: StatusEvent) {
        if self.is_terminal {
            return;
        }
        match event {
            StatusEvent::Fetched(resp) => {
                self.status = resp.status;
                self.label = resp.stage_label;
                self.preview_url = resp.preview_url;
                self.build_version = resp.build_version;
                self.error = resp.error_message;
                self.debug_id = resp.debug_id;
                self.sandbox_expires_at = resp.sandbox_expires_at;
                self.sandbox_paused = resp.sandbox_paused;
                self.stage_index = self.status.stage_index();
                self.is_terminal = self.status.is_terminal();
                self.has_data = true;
                self.consecutive_failures = 0;
                self.connection_failed = false;
            }
            StatusEvent::FetchFailed(_) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.failure_threshold {
                    self.connection_failed = true;
                }
            }
        }
    }
}
