//! One watched job across all three controllers.
//!
//! The controllers share nothing. The session hands each of them the job id
//! and seeds the preview controller from the first status snapshot that
//! carries a preview.

use std::sync::Arc;

use tracing::{debug, info};

use crate::api::{BACKFILL_LIMIT, BuildApi};
use crate::logs::LogStreamConsumer;
use crate::models::JobStatus;
use crate::preview::{Clock, PreviewController, PreviewParams, PreviewTiming, SystemClock};
use crate::status::{PollConfig, StatusPoller, StatusTracker};

#[derive(Debug, Clone, Copy)]
pub struct SessionTiming {
    pub poll: PollConfig,
    pub preview: PreviewTiming,
    pub backfill_limit: usize,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            poll: PollConfig::default(),
            preview: PreviewTiming::default(),
            backfill_limit: BACKFILL_LIMIT,
        }
    }
}

pub struct BuildSession {
    job_id: Option<String>,
    status: StatusPoller,
    logs: LogStreamConsumer,
    preview: PreviewController,
    /// Paused flag the preview was last started with, `None` until started.
    preview_paused: Option<bool>,
}

impl BuildSession {
    pub fn new(api: BuildApi, timing: SessionTiming) -> Self {
        Self::with_clock(api, timing, Arc::new(SystemClock))
    }

    pub fn with_clock(api: BuildApi, timing: SessionTiming, clock: Arc<dyn Clock>) -> Self {
        Self {
            job_id: None,
            status: StatusPoller::new(api.clone(), timing.poll),
            logs: LogStreamConsumer::with_backfill_limit(api.clone(), timing.backfill_limit),
            preview: PreviewController::with_clock(api, timing.preview, clock),
            preview_paused: None,
        }
    }

    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }

    /// Point every controller at a new job, or at none. All state held for
    /// the previous job is discarded, including in-flight requests.
    pub fn switch_job(&mut self, job_id: Option<String>) {
        if self.job_id == job_id {
            return;
        }
        self.preview.dispose();
        self.preview_paused = None;
        match &job_id {
            Some(id) => {
                info!(job_id = %id, "watching job");
                self.status.start(id.clone());
                self.logs.start(id.clone());
            }
            None => {
                self.status.dispose();
                self.logs.dispose();
            }
        }
        self.job_id = job_id;
    }

    /// Start the preview once the status carries one, and restart it when the
    /// sandbox's paused flag flips. Returns whether the preview was (re)started.
    pub fn sync_preview(&mut self) -> bool {
        let Some(job_id) = self.job_id.clone() else {
            return false;
        };
        let status = self.status.snapshot();
        if status.job_id.as_deref() != Some(job_id.as_str()) || !has_preview(&status) {
            return false;
        }
        match self.preview_paused {
            None => {
                debug!(job_id = %job_id, paused = status.sandbox_paused, "starting preview");
                self.preview.start(job_id, preview_params(&status));
                self.preview_paused = Some(status.sandbox_paused);
                true
            }
            Some(paused) if paused != status.sandbox_paused => {
                self.preview.set_paused(status.sandbox_paused);
                self.preview_paused = Some(status.sandbox_paused);
                true
            }
            Some(_) => false,
        }
    }

    pub fn status(&self) -> &StatusPoller {
        &self.status
    }

    pub fn logs(&self) -> &LogStreamConsumer {
        &self.logs
    }

    pub fn preview(&self) -> &PreviewController {
        &self.preview
    }

    pub fn dispose(&mut self) {
        self.switch_job(None);
    }
}

fn has_preview(status: &StatusTracker) -> bool {
    status.has_data && (status.status == JobStatus::Ready || status.preview_url.is_some())
}

/// Initial preview input taken from a status snapshot.
pub fn preview_params(status: &StatusTracker) -> PreviewParams {
    PreviewParams {
        preview_url: status.preview_url.clone(),
        sandbox_expires_at: status.sandbox_expires_at,
        sandbox_paused: status.sandbox_paused,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DoneStatus;
    use crate::preview::PreviewPhase;
    use crate::transport::testing::FakeTransport;
    use bytes::Bytes;
    use reqwest::Method;
    use serde_json::json;

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    fn session(fake: &Arc<FakeTransport>) -> BuildSession {
        BuildSession::new(BuildApi::new(fake.clone()), SessionTiming::default())
    }

    fn push_ready(fake: &FakeTransport, job: &str, paused: bool) {
        fake.push_json(
            Method::GET,
            &format!("/jobs/{job}/status"),
            json!({
                "status": "ready",
                "stage_label": "Ready",
                "preview_url": format!("https://{job}.preview.example"),
                "sandbox_paused": paused
            }),
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ready_job_drives_all_three_controllers() {
        let fake = FakeTransport::new();
        push_ready(&fake, "j1", false);
        fake.push_json(
            Method::GET,
            "/jobs/j1/preview-check",
            json!({"embeddable": true, "preview_url": "", "reason": null}),
        );
        let stream = fake.open_stream("/jobs/j1/logs/stream");

        let mut session = session(&fake);
        session.switch_job(Some("j1".into()));
        assert!(!session.sync_preview());
        settle().await;

        stream
            .send(Ok(Bytes::from_static(
                b"event: log\ndata: {\"id\":\"1\",\"timestamp\":\"2026-03-01T10:00:00Z\",\"source\":\"stdout\",\"text\":\"built\"}\n\nevent: done\ndata: {\"status\":\"ready\"}\n\n",
            )))
            .unwrap();
        settle().await;

        assert!(session.status().snapshot().is_terminal);
        let logs = session.logs().snapshot();
        assert_eq!(logs.lines.len(), 1);
        assert_eq!(logs.done_status, Some(DoneStatus::Ready));

        assert!(session.sync_preview());
        assert!(!session.sync_preview());
        settle().await;
        let preview = session.preview().snapshot();
        assert_eq!(preview.phase, PreviewPhase::Loading);
        assert_eq!(
            preview.active_preview_url.as_deref(),
            Some("https://j1.preview.example")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn paused_sandbox_starts_preview_paused() {
        let fake = FakeTransport::new();
        push_ready(&fake, "j1", true);
        let _stream = fake.open_stream("/jobs/j1/logs/stream");
        let mut session = session(&fake);
        session.switch_job(Some("j1".into()));
        settle().await;

        assert!(session.sync_preview());
        assert_eq!(session.preview().snapshot().phase, PreviewPhase::Paused);
        assert_eq!(fake.count(Method::GET, "/jobs/j1/preview-check"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn switching_jobs_discards_previous_state() {
        let fake = FakeTransport::new();
        push_ready(&fake, "j1", true);
        let _s1 = fake.open_stream("/jobs/j1/logs/stream");
        fake.push_json(
            Method::GET,
            "/jobs/j2/status",
            json!({"status": "code", "stage_label": "Writing code"}),
        );
        let _s2 = fake.open_stream("/jobs/j2/logs/stream");

        let mut session = session(&fake);
        session.switch_job(Some("j1".into()));
        settle().await;
        session.sync_preview();
        assert_eq!(session.preview().snapshot().job_id.as_deref(), Some("j1"));

        session.switch_job(Some("j2".into()));
        assert_eq!(session.job_id(), Some("j2"));
        assert!(session.preview().snapshot().job_id.is_none());
        settle().await;

        let status = session.status().snapshot();
        assert_eq!(status.job_id.as_deref(), Some("j2"));
        assert_eq!(status.status, JobStatus::Code);
        assert!(session.logs().snapshot().lines.is_empty());
        assert!(!session.sync_preview());
    }

    #[tokio::test(start_paused = true)]
    async fn switching_to_none_disposes_everything() {
        let fake = FakeTransport::new();
        push_ready(&fake, "j1", false);
        let _stream = fake.open_stream("/jobs/j1/logs/stream");
        let mut session = session(&fake);
        session.switch_job(Some("j1".into()));
        settle().await;

        session.dispose();
        assert!(session.job_id().is_none());
        assert!(session.status().snapshot().job_id.is_none());
        assert!(session.logs().snapshot().job_id.is_none());
        assert!(!session.sync_preview());
    }
}
