//! Driver for the preview state machine: owns the timers, the single
//! in-flight request and the inbox of host signals.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::machine::{PreviewEffect, PreviewEvent, PreviewParams, PreviewState, PreviewTiming};
use crate::api::BuildApi;
use crate::lifecycle::{StateCell, TaskHandle, Timer, Writer, next_in, tick_in, timer};

/// Source of wall-clock time for the expiry countdown.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// One-off notifications for the host, outside the published state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewNotice {
    ExpiryWarning { job_id: String, remaining_seconds: i64 },
}

pub struct PreviewController {
    api: BuildApi,
    timing: PreviewTiming,
    clock: Arc<dyn Clock>,
    cell: StateCell<PreviewState>,
    notices: broadcast::Sender<PreviewNotice>,
    inbox: Option<mpsc::UnboundedSender<PreviewEvent>>,
    current: Option<(String, PreviewParams)>,
    task: Option<TaskHandle>,
}

impl PreviewController {
    pub fn new(api: BuildApi, timing: PreviewTiming) -> Self {
        Self::with_clock(api, timing, Arc::new(SystemClock))
    }

    pub fn with_clock(api: BuildApi, timing: PreviewTiming, clock: Arc<dyn Clock>) -> Self {
        let (notices, _) = broadcast::channel(16);
        Self {
            api,
            timing,
            clock,
            cell: StateCell::new(PreviewState::default()),
            notices,
            inbox: None,
            current: None,
            task: None,
        }
    }

    /// (Re)start the machine for a job. Any timers and requests belonging
    /// to the previous run are torn down first.
    pub fn start(&mut self, job_id: impl Into<String>, params: PreviewParams) {
        self.dispose_task();
        let job_id = job_id.into();
        let (initial, effects) = PreviewState::start(job_id.clone(), params.clone(), self.timing);
        info!(job_id = %job_id, phase = %initial.phase, "preview lifecycle started");
        let writer = self.cell.reset(initial);
        let (tx, rx) = mpsc::unbounded_channel();
        self.inbox = Some(tx);
        self.current = Some((job_id.clone(), params));

        let driver = Driver {
            api: self.api.clone(),
            job_id,
            writer,
            timing: self.timing,
            clock: Arc::clone(&self.clock),
            notices: self.notices.clone(),
            load_timeout: None,
            countdown: None,
            resume_retry: None,
            in_flight: None,
        };
        self.task = Some(TaskHandle::spawn(move |cancel| driver.run(rx, effects, cancel)));
    }

    /// Restart when the sandbox's paused flag changes for the current job.
    pub fn set_paused(&mut self, paused: bool) {
        let Some((job_id, mut params)) = self.current.clone() else {
            return;
        };
        if params.sandbox_paused != paused {
            params.sandbox_paused = paused;
            self.start(job_id, params);
        }
    }

    pub fn mark_loaded(&self) {
        self.send(PreviewEvent::MarkLoaded);
    }

    pub fn retry(&self) {
        self.send(PreviewEvent::Retry);
    }

    pub fn resume(&self) {
        self.send(PreviewEvent::ResumeRequested);
    }

    pub fn report_error(&self, message: impl Into<String>) {
        self.send(PreviewEvent::ReportError(message.into()));
    }

    pub fn subscribe(&self) -> watch::Receiver<PreviewState> {
        self.cell.subscribe()
    }

    pub fn snapshot(&self) -> PreviewState {
        self.cell.snapshot()
    }

    pub fn notices(&self) -> broadcast::Receiver<PreviewNotice> {
        self.notices.subscribe()
    }

    /// Tear down timers and requests and forget the job.
    pub fn dispose(&mut self) {
        self.dispose_task();
        self.current = None;
        self.cell.reset(PreviewState::default());
    }

    fn send(&self, event: PreviewEvent) {
        if let Some(inbox) = &self.inbox {
            let _ = inbox.send(event);
        }
    }

    fn dispose_task(&mut self) {
        self.inbox = None;
        if let Some(mut task) = self.task.take() {
            task.dispose();
        }
    }
}

impl Drop for PreviewController {
    fn drop(&mut self) {
        self.dispose_task();
    }
}

struct Driver {
    api: BuildApi,
    job_id: String,
    writer: Writer<PreviewState>,
    timing: PreviewTiming,
    clock: Arc<dyn Clock>,
    notices: broadcast::Sender<PreviewNotice>,
    load_timeout: Option<Timer>,
    countdown: Option<Interval>,
    resume_retry: Option<Timer>,
    in_flight: Option<BoxFuture<'static, PreviewEvent>>,
}

impl Driver {
    async fn run(
        mut self,
        mut inbox: mpsc::UnboundedReceiver<PreviewEvent>,
        initial: Vec<PreviewEffect>,
        cancel: CancellationToken,
    ) {
        let mut pending: VecDeque<PreviewEffect> = initial.into();
        loop {
            while let Some(effect) = pending.pop_front() {
                self.perform(effect);
            }

            let event = tokio::select! {
                _ = cancel.cancelled() => return,
                Some(event) = inbox.recv() => event,
                _ = next_in(&mut self.load_timeout) => {
                    self.load_timeout = None;
                    PreviewEvent::LoadTimedOut
                }
                _ = tick_in(&mut self.countdown) => PreviewEvent::CountdownTick { now: self.clock.now() },
                _ = next_in(&mut self.resume_retry) => {
                    self.resume_retry = None;
                    PreviewEvent::ResumeRetryDue
                }
                event = next_in(&mut self.in_flight) => {
                    self.in_flight = None;
                    event
                }
            };

            if let PreviewEvent::ResumeFailed(e) = &event {
                warn!(job_id = %self.job_id, error = %e, "sandbox resume failed");
            }
            let applied = self.writer.update(|state| {
                let before = state.phase;
                let effects = state.apply(event);
                (before, state.phase, effects)
            });
            let Some((before, after, effects)) = applied else {
                return;
            };
            if before != after {
                info!(job_id = %self.job_id, from = %before, to = %after, "preview phase changed");
            }
            pending.extend(effects);
        }
    }

    fn perform(&mut self, effect: PreviewEffect) {
        match effect {
            PreviewEffect::CheckEligibility => {
                let api = self.api.clone();
                let job_id = self.job_id.clone();
                self.in_flight = Some(
                    async move {
                        match api.check_preview(&job_id).await {
                            Ok(check) => PreviewEvent::CheckSucceeded(check),
                            Err(e) => PreviewEvent::CheckFailed(e),
                        }
                    }
                    .boxed(),
                );
            }
            PreviewEffect::RequestResume => {
                let api = self.api.clone();
                let job_id = self.job_id.clone();
                self.in_flight = Some(
                    async move {
                        match api.resume(&job_id).await {
                            Ok(resp) => PreviewEvent::ResumeSucceeded(resp),
                            Err(e) => PreviewEvent::ResumeFailed(e),
                        }
                    }
                    .boxed(),
                );
            }
            PreviewEffect::StartLoadTimeout => {
                self.load_timeout = Some(timer(self.timing.load_timeout));
            }
            PreviewEffect::CancelLoadTimeout => self.load_timeout = None,
            PreviewEffect::StartCountdown => {
                // First tick is immediate, so the remaining time is evaluated right away.
                let mut countdown = tokio::time::interval(self.timing.countdown_tick);
                countdown.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.countdown = Some(countdown);
            }
            PreviewEffect::StopCountdown => self.countdown = None,
            PreviewEffect::ScheduleResumeRetry => {
                self.resume_retry = Some(timer(self.timing.resume_backoff));
            }
            PreviewEffect::CancelAll => {
                self.load_timeout = None;
                self.countdown = None;
                self.resume_retry = None;
                self.in_flight = None;
            }
            PreviewEffect::ExpiryWarning { remaining_seconds } => {
                warn!(job_id = %self.job_id, remaining_seconds, "preview sandbox expires soon");
                let _ = self.notices.send(PreviewNotice::ExpiryWarning {
                    job_id: self.job_id.clone(),
                    remaining_seconds,
                });
            }
        }
    }
}
