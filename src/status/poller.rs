//! Background polling of a job's coarse status.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::machine::{FAILURE_THRESHOLD, StatusEvent, StatusTracker};
use crate::api::BuildApi;
use crate::lifecycle::{StateCell, TaskHandle, Writer};

/// Interval between status fetches.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub failure_threshold: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: POLL_INTERVAL,
            failure_threshold: FAILURE_THRESHOLD,
        }
    }
}

/// Polls one job at a time. Starting another job disposes the running poll
/// loop and resets all counters.
pub struct StatusPoller {
    api: BuildApi,
    config: PollConfig,
    cell: StateCell<StatusTracker>,
    visible: Arc<Notify>,
    task: Option<TaskHandle>,
}

impl StatusPoller {
    pub fn new(api: BuildApi, config: PollConfig) -> Self {
        Self {
            api,
            config,
            cell: StateCell::new(StatusTracker::new(None, config.failure_threshold)),
            visible: Arc::new(Notify::new()),
            task: None,
        }
    }

    pub fn start(&mut self, job_id: impl Into<String>) {
        self.dispose_task();
        let job_id = job_id.into();
        let writer = self.cell.reset(StatusTracker::new(
            Some(job_id.clone()),
            self.config.failure_threshold,
        ));
        self.visible = Arc::new(Notify::new());

        let api = self.api.clone();
        let visible = Arc::clone(&self.visible);
        let interval = self.config.interval;
        self.task = Some(TaskHandle::spawn(move |cancel| {
            poll_loop(api, job_id, writer, visible, interval, cancel)
        }));
    }

    /// The host regained foreground visibility; fetch now instead of
    /// waiting for the next tick. Ignored once the job is terminal.
    pub fn notify_visible(&self) {
        self.visible.notify_one();
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusTracker> {
        self.cell.subscribe()
    }

    pub fn snapshot(&self) -> StatusTracker {
        self.cell.snapshot()
    }

    /// Stop polling and forget the current job.
    pub fn dispose(&mut self) {
        self.dispose_task();
        self.cell
            .reset(StatusTracker::new(None, self.config.failure_threshold));
    }

    fn dispose_task(&mut self) {
        if let Some(mut task) = self.task.take() {
            task.dispose();
        }
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.dispose_task();
    }
}

async fn poll_loop(
    api: BuildApi,
    job_id: String,
    writer: Writer<StatusTracker>,
    visible: Arc<Notify>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the first fetch below replaces it.
    ticker.tick().await;

    loop {
        if !writer.read(StatusTracker::should_fetch) {
            break;
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = api.fetch_status(&job_id) => result,
        };
        let event = match result {
            Ok(resp) => {
                debug!(job_id = %job_id, status = %resp.status, "status fetched");
                StatusEvent::Fetched(resp)
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "status fetch failed");
                StatusEvent::FetchFailed(e)
            }
        };
        let Some(terminal) = writer.update(|s| {
            s.apply(event);
            s.is_terminal
        }) else {
            return;
        };
        if terminal {
            info!(job_id = %job_id, "job reached terminal status, polling stopped");
            break;
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
            _ = visible.notified() => {
                debug!(job_id = %job_id, "visibility regained, fetching now");
                ticker.reset();
            }
        }
    }
}
