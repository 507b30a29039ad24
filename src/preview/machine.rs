//! Preview lifecycle state machine.
//!
//! ```text
//! checking ──embeddable──▶ loading ──mark_loaded──▶ active ──countdown──▶ expired
//!    │  └──not embeddable──▶ blocked
//!    └──(known paused)──▶ paused ──resume──▶ resuming ──ok──▶ loading
//!                                               └──2nd failure──▶ resume_failed
//! any ──▶ error        error | blocked ──retry──▶ checking
//! ```
//!
//! `apply` never performs I/O or touches timers. It returns the
//! [`PreviewEffect`]s the driver must carry out.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{ApiError, ResumeErrorKind};
use crate::models::{PreviewCheck, ResumeResponse};

pub const LOAD_TIMEOUT: Duration = Duration::from_secs(30);
pub const COUNTDOWN_TICK: Duration = Duration::from_secs(30);
/// Remaining seconds at or below which the one-time expiry warning fires.
pub const EXPIRY_WARNING_SECS: i64 = 300;
pub const RESUME_BACKOFF: Duration = Duration::from_secs(5);
/// Total resume requests per attempt (the first plus one retry).
pub const RESUME_MAX_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewTiming {
    pub load_timeout: Duration,
    pub countdown_tick: Duration,
    pub expiry_warning_secs: i64,
    pub resume_backoff: Duration,
    pub resume_max_attempts: u32,
}

impl Default for PreviewTiming {
    fn default() -> Self {
        Self {
            load_timeout: LOAD_TIMEOUT,
            countdown_tick: COUNTDOWN_TICK,
            expiry_warning_secs: EXPIRY_WARNING_SECS,
            resume_backoff: RESUME_BACKOFF,
            resume_max_attempts: RESUME_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewPhase {
    #[default]
    Checking,
    Loading,
    Active,
    Blocked,
    Expired,
    Paused,
    Resuming,
    ResumeFailed,
    Error,
}

impl PreviewPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checking => "checking",
            Self::Loading => "loading",
            Self::Active => "active",
            Self::Blocked => "blocked",
            Self::Expired => "expired",
            Self::Paused => "paused",
            Self::Resuming => "resuming",
            Self::ResumeFailed => "resume_failed",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for PreviewPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Initial input taken from the status poller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreviewParams {
    pub preview_url: Option<String>,
    pub sandbox_expires_at: Option<DateTime<Utc>>,
    pub sandbox_paused: bool,
}

#[derive(Debug, Clone)]
pub enum PreviewEvent {
    CheckSucceeded(PreviewCheck),
    CheckFailed(ApiError),
    LoadTimedOut,
    /// The embedding surface finished loading the preview.
    MarkLoaded,
    CountdownTick { now: DateTime<Utc> },
    ResumeRequested,
    ResumeSucceeded(ResumeResponse),
    ResumeFailed(ApiError),
    ResumeRetryDue,
    /// Manual retry from `error` or `blocked`.
    Retry,
    /// The embedding surface reported a failure of its own.
    ReportError(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewEffect {
    CheckEligibility,
    StartLoadTimeout,
    CancelLoadTimeout,
    StartCountdown,
    StopCountdown,
    RequestResume,
    ScheduleResumeRetry,
    /// Drop every timer and any in-flight request.
    CancelAll,
    ExpiryWarning { remaining_seconds: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreviewState {
    pub job_id: Option<String>,
    pub phase: PreviewPhase,
    pub active_preview_url: Option<String>,
    pub block_reason: Option<String>,
    pub time_remaining_seconds: Option<i64>,
    pub resume_error_kind: Option<ResumeErrorKind>,
    pub error_message: Option<String>,
    pub expiry_warning_shown: bool,
    pub expires_at: Option<DateTime<Utc>>,
    resume_attempts: u32,
    timing: PreviewTiming,
}

impl Default for PreviewState {
    fn default() -> Self {
        Self {
            job_id: None,
            phase: PreviewPhase::Checking,
            active_preview_url: None,
            block_reason: None,
            time_remaining_seconds: None,
            resume_error_kind: None,
            error_message: None,
            expiry_warning_shown: false,
            expires_at: None,
            resume_attempts: 0,
            timing: PreviewTiming::default(),
        }
    }
}

impl PreviewState {
    /// Enter the machine for a job: `paused` when the sandbox is known to be
    /// paused, otherwise `checking` with an eligibility request.
    pub fn start(
        job_id: impl Into<String>,
        params: PreviewParams,
        timing: PreviewTiming,
    ) -> (Self, Vec<PreviewEffect>) {
        let paused = params.sandbox_paused;
        let state = Self {
            job_id: Some(job_id.into()),
            phase: if paused {
                PreviewPhase::Paused
            } else {
                PreviewPhase::Checking
            },
            active_preview_url: params.preview_url,
            expires_at: params.sandbox_expires_at,
            timing,
            ..Self::default()
        };
        let effects = if paused {
            Vec::new()
        } else {
            vec![PreviewEffect::CheckEligibility]
        };
        (state, effects)
    }

    pub fn resume_attempts(&self) -> u32 {
        self.resume_attempts
    }

    pub fn apply(&mut self, event: PreviewEvent) -> Vec<PreviewEffect> {
        use PreviewEffect as Fx;
        use PreviewPhase as P;

        match (self.phase, event) {
            (P::Checking, PreviewEvent::CheckSucceeded(check)) => {
                if check.embeddable {
                    if !check.preview_url.is_empty() {
                        self.active_preview_url = Some(check.preview_url);
                    }
                    self.phase = P::Loading;
                    vec![Fx::StartLoadTimeout]
                } else {
                    self.phase = P::Blocked;
                    self.block_reason = check.reason;
                    Vec::new()
                }
            }
            (P::Checking, PreviewEvent::CheckFailed(err)) => {
                self.fail(format!("Preview check failed: {}", err))
            }
            (P::Loading, PreviewEvent::LoadTimedOut) => self.fail(format!(
                "Preview did not load within {}s",
                self.timing.load_timeout.as_secs()
            )),
            (P::Loading, PreviewEvent::MarkLoaded) => {
                self.phase = P::Active;
                let mut effects = vec![Fx::CancelLoadTimeout];
                if self.expires_at.is_some() {
                    effects.push(Fx::StartCountdown);
                }
                effects
            }
            (P::Active, PreviewEvent::CountdownTick { now }) => self.tick(now),
            (P::Paused | P::ResumeFailed, PreviewEvent::ResumeRequested) => {
                self.phase = P::Resuming;
                self.resume_attempts = 1;
                self.resume_error_kind = None;
                vec![Fx::RequestResume]
            }
            (P::Resuming, PreviewEvent::ResumeSucceeded(resp)) => {
                self.active_preview_url = Some(resp.preview_url);
                self.phase = P::Loading;
                vec![Fx::StartLoadTimeout]
            }
            (P::Resuming, PreviewEvent::ResumeFailed(err)) => {
                if self.resume_attempts < self.timing.resume_max_attempts {
                    vec![Fx::ScheduleResumeRetry]
                } else {
                    self.phase = P::ResumeFailed;
                    self.resume_error_kind = Some(ResumeErrorKind::classify(&err));
                    Vec::new()
                }
            }
            (P::Resuming, PreviewEvent::ResumeRetryDue) => {
                self.resume_attempts += 1;
                vec![Fx::RequestResume]
            }
            (P::Error | P::Blocked, PreviewEvent::Retry) => {
                self.phase = P::Checking;
                self.block_reason = None;
                self.error_message = None;
                self.time_remaining_seconds = None;
                vec![Fx::CancelAll, Fx::CheckEligibility]
            }
            (_, PreviewEvent::ReportError(message)) => self.fail(message),
            _ => Vec::new(),
        }
    }

    fn fail(&mut self, message: String) -> Vec<PreviewEffect> {
        self.phase = PreviewPhase::Error;
        self.error_message = Some(message);
        vec![PreviewEffect::CancelAll]
    }

    fn tick(&mut self, now: DateTime<Utc>) -> Vec<PreviewEffect> {
        let Some(expires_at) = self.expires_at else {
            return vec![PreviewEffect::StopCountdown];
        };
        let remaining = (expires_at - now).num_seconds();
        self.time_remaining_seconds = Some(remaining.max(0));

        if remaining <= 0 {
            self.phase = PreviewPhase::Expired;
            return vec![PreviewEffect::StopCountdown];
        }
        if remaining <= self.timing.expiry_warning_secs && !self.expiry_warning_shown {
            self.expiry_warning_shown = true;
            return vec![PreviewEffect::ExpiryWarning {
                remaining_seconds: remaining,
            }];
        }
        Vec::new()
    }
}
