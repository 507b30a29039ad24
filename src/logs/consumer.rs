//! Live log feed for one job, with on-demand backfill.

use eventsource_stream::Eventsource;
use futures::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::StreamEvent;
use super::machine::{LogEvent, LogStreamState};
use crate::api::{BACKFILL_LIMIT, BuildApi};
use crate::errors::ApiError;
use crate::lifecycle::{StateCell, TaskHandle, Writer};

pub struct LogStreamConsumer {
    api: BuildApi,
    backfill_limit: usize,
    cell: StateCell<LogStreamState>,
    writer: Option<Writer<LogStreamState>>,
    task: Option<TaskHandle>,
}

impl LogStreamConsumer {
    pub fn new(api: BuildApi) -> Self {
        Self::with_backfill_limit(api, BACKFILL_LIMIT)
    }

    pub fn with_backfill_limit(api: BuildApi, backfill_limit: usize) -> Self {
        Self {
            api,
            backfill_limit,
            cell: StateCell::new(LogStreamState::default()),
            writer: None,
            task: None,
        }
    }

    /// Open the stream for `job_id`, discarding everything held for the
    /// previous job. There is no automatic reconnect; calling `start` again
    /// with the same id is the retry.
    pub fn start(&mut self, job_id: impl Into<String>) {
        self.dispose_task();
        let job_id = job_id.into();
        let writer = self.cell.reset(LogStreamState::for_job(job_id.clone()));
        self.writer = Some(writer.clone());

        let api = self.api.clone();
        self.task = Some(TaskHandle::spawn(move |cancel| {
            stream_loop(api, job_id, writer, cancel)
        }));
    }

    /// Fetch one page of lines older than anything held and prepend it.
    ///
    /// Calls are not serialized here: callers must not issue a second call
    /// while one is outstanding. A failed request leaves the state as it was.
    /// Returns the number of lines added.
    pub async fn load_earlier(&self) -> Result<usize, ApiError> {
        let Some(writer) = self.writer.clone() else {
            return Ok(0);
        };
        let (job_id, cursor) = writer.read(|s| {
            (
                s.job_id.clone(),
                s.backfill_cursor().map(str::to_string),
            )
        });
        let Some(job_id) = job_id else {
            return Ok(0);
        };

        let page = self
            .api
            .fetch_logs(&job_id, cursor.as_deref(), self.backfill_limit)
            .await
            .inspect_err(|e| warn!(job_id = %job_id, error = %e, "log backfill failed"))?;
        let added = writer
            .update(|s| s.apply(LogEvent::Backfill(page)))
            .unwrap_or(0);
        debug!(job_id = %job_id, added, "log backfill applied");
        Ok(added)
    }

    pub fn subscribe(&self) -> watch::Receiver<LogStreamState> {
        self.cell.subscribe()
    }

    pub fn snapshot(&self) -> LogStreamState {
        self.cell.snapshot()
    }

    /// Close the stream and drop all lines.
    pub fn dispose(&mut self) {
        self.dispose_task();
        self.writer = None;
        self.cell.reset(LogStreamState::default());
    }

    fn dispose_task(&mut self) {
        if let Some(mut task) = self.task.take() {
            task.dispose();
        }
    }
}

impl Drop for LogStreamConsumer {
    fn drop(&mut self) {
        self.dispose_task();
    }
}

async fn stream_loop(
    api: BuildApi,
    job_id: String,
    writer: Writer<LogStreamState>,
    cancel: CancellationToken,
) {
    let opened = tokio::select! {
        _ = cancel.cancelled() => return,
        opened = api.open_log_stream(&job_id) => opened,
    };
    let bytes = match opened {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(job_id = %job_id, error = %e, "log stream connect failed");
            writer.update(|s| s.apply(LogEvent::Disconnected));
            return;
        }
    };
    if writer.update(|s| s.apply(LogEvent::Connected)).is_none() {
        return;
    }
    debug!(job_id = %job_id, "log stream connected");

    let mut events = bytes.eventsource();
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return,
            next = events.next() => next,
        };
        let sse = match next {
            Some(Ok(sse)) => sse,
            Some(Err(e)) => {
                warn!(job_id = %job_id, error = %e, "log stream interrupted");
                break;
            }
            None => {
                debug!(job_id = %job_id, "log stream closed by server");
                break;
            }
        };
        let Some(event) = StreamEvent::parse(&sse.event, &sse.data) else {
            continue;
        };
        let done = matches!(event, StreamEvent::Done(_));
        if writer.update(|s| s.apply(LogEvent::Stream(event))).is_none() {
            return;
        }
        if done {
            info!(job_id = %job_id, "log stream finished");
            break;
        }
    }
    writer.update(|s| s.apply(LogEvent::Disconnected));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DoneStatus;
    use crate::transport::testing::FakeTransport;
    use bytes::Bytes;
    use reqwest::Method;
    use serde_json::json;
    use std::sync::Arc;

    const STREAM: &str = "/jobs/j1/logs/stream";
    const LOGS: &str = "/jobs/j1/logs";

    fn log_block(id: u32, source: &str, text: &str) -> Bytes {
        let data = json!({
            "id": id.to_string(),
            "timestamp": format!("2026-03-01T10:00:{:02}Z", id % 60),
            "source": source,
            "text": text,
        });
        Bytes::from(format!("event: log\ndata: {}\n\n", data))
    }

    fn consumer(fake: &Arc<FakeTransport>) -> LogStreamConsumer {
        LogStreamConsumer::new(BuildApi::new(fake.clone()))
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn streams_lines_until_done() {
        let fake = FakeTransport::new();
        let tx = fake.open_stream(STREAM);
        let mut consumer = consumer(&fake);
        consumer.start("j1");
        settle().await;
        assert!(consumer.snapshot().is_connected);

        tx.send(Ok(Bytes::from_static(b"event: heartbeat\ndata: \n\n"))).unwrap();
        tx.send(Ok(log_block(1, "stdout", "installing"))).unwrap();
        tx.send(Ok(Bytes::from_static(b"event: log\ndata: {broken\n\n"))).unwrap();
        tx.send(Ok(log_block(2, "stderr", "warning"))).unwrap();
        tx.send(Ok(Bytes::from_static(b"event: done\ndata: {\"status\":\"ready\"}\n\n")))
            .unwrap();
        settle().await;

        let state = consumer.snapshot();
        let ids: Vec<_> = state.lines.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert!(state.is_done);
        assert!(!state.is_connected);
        assert_eq!(state.done_status, Some(DoneStatus::Ready));

        // The connection is gone: further sends have no receiver.
        assert!(tx.send(Ok(log_block(3, "stdout", "late"))).is_err());
    }

    #[tokio::test]
    async fn blocks_split_across_chunks_are_reassembled() {
        let fake = FakeTransport::new();
        let tx = fake.open_stream(STREAM);
        let mut consumer = consumer(&fake);
        consumer.start("j1");
        settle().await;

        let block = log_block(5, "stdout", "hello");
        let (head, tail) = block.split_at(17);
        tx.send(Ok(Bytes::copy_from_slice(head))).unwrap();
        settle().await;
        assert!(consumer.snapshot().lines.is_empty());
        tx.send(Ok(Bytes::copy_from_slice(tail))).unwrap();
        settle().await;
        assert_eq!(consumer.snapshot().lines.len(), 1);
    }

    #[tokio::test]
    async fn transport_error_disconnects_without_done() {
        let fake = FakeTransport::new();
        let tx = fake.open_stream(STREAM);
        let mut consumer = consumer(&fake);
        consumer.start("j1");
        settle().await;

        tx.send(Ok(log_block(1, "stdout", "a"))).unwrap();
        tx.send(Err(ApiError::Network("reset by peer".into()))).unwrap();
        settle().await;

        let state = consumer.snapshot();
        assert!(!state.is_connected);
        assert!(!state.is_done);
        assert_eq!(state.lines.len(), 1);
        assert_eq!(fake.calls().iter().filter(|c| c.starts_with("STREAM")).count(), 1);
    }

    #[tokio::test]
    async fn failed_connect_leaves_consumer_disconnected() {
        let fake = FakeTransport::new();
        let mut consumer = consumer(&fake);
        consumer.start("j1");
        settle().await;
        let state = consumer.snapshot();
        assert!(!state.is_connected);
        assert!(!state.is_done);
    }

    #[tokio::test]
    async fn auto_fix_signal_follows_system_lines() {
        let fake = FakeTransport::new();
        let tx = fake.open_stream(STREAM);
        let mut consumer = consumer(&fake);
        consumer.start("j1");
        settle().await;

        tx.send(Ok(log_block(1, "system", "Auto-fix attempt 1 of 3"))).unwrap();
        settle().await;
        assert_eq!(consumer.snapshot().auto_fix_attempt, Some(1));

        tx.send(Ok(log_block(2, "system", "Starting dev server"))).unwrap();
        settle().await;
        assert_eq!(consumer.snapshot().auto_fix_attempt, None);
    }

    #[tokio::test]
    async fn load_earlier_pages_backwards() {
        let fake = FakeTransport::new();
        let tx = fake.open_stream(STREAM);
        let mut consumer = consumer(&fake);
        consumer.start("j1");
        settle().await;
        tx.send(Ok(log_block(40, "stdout", "live"))).unwrap();
        settle().await;

        let lines = |range: std::ops::RangeInclusive<u32>| {
            range
                .map(|id| {
                    json!({
                        "id": id.to_string(),
                        "timestamp": format!("2026-03-01T10:00:{:02}Z", id),
                        "source": "stdout",
                        "text": "old",
                    })
                })
                .collect::<Vec<_>>()
        };
        fake.push_json(
            Method::GET,
            LOGS,
            json!({"lines": lines(20..=40), "has_more": true, "oldest_id": "20"}),
        );
        fake.push_json(
            Method::GET,
            LOGS,
            json!({"lines": lines(10..=19), "has_more": false, "oldest_id": "10"}),
        );

        assert_eq!(consumer.load_earlier().await.unwrap(), 20);
        assert_eq!(consumer.load_earlier().await.unwrap(), 10);

        let state = consumer.snapshot();
        assert_eq!(state.lines.len(), 31);
        assert_eq!(state.oldest_id.as_deref(), Some("10"));
        assert!(!state.has_earlier_lines);
        let backfills: Vec<_> = fake
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("GET /jobs/j1/logs"))
            .collect();
        assert_eq!(
            backfills,
            vec![
                "GET /jobs/j1/logs limit=100".to_string(),
                "GET /jobs/j1/logs limit=100 before_id=20".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn failed_backfill_keeps_state() {
        let fake = FakeTransport::new();
        let _tx = fake.open_stream(STREAM);
        let mut consumer = consumer(&fake);
        consumer.start("j1");
        settle().await;
        fake.push_error(Method::GET, LOGS, ApiError::Timeout);

        let before = consumer.snapshot();
        assert!(consumer.load_earlier().await.is_err());
        assert_eq!(consumer.snapshot(), before);
    }

    #[tokio::test]
    async fn switching_jobs_discards_lines() {
        let fake = FakeTransport::new();
        let tx1 = fake.open_stream(STREAM);
        let _tx2 = fake.open_stream("/jobs/j2/logs/stream");
        let mut consumer = consumer(&fake);
        consumer.start("j1");
        settle().await;
        tx1.send(Ok(log_block(1, "stdout", "from j1"))).unwrap();
        settle().await;
        assert_eq!(consumer.snapshot().lines.len(), 1);

        consumer.start("j2");
        settle().await;
        // Late data for j1 has nowhere to go.
        let _ = tx1.send(Ok(log_block(2, "stdout", "late j1")));
        settle().await;

        let state = consumer.snapshot();
        assert_eq!(state.job_id.as_deref(), Some("j2"));
        assert!(state.lines.is_empty());
        assert!(state.is_connected);
    }

    #[tokio::test]
    async fn load_earlier_without_job_is_a_no_op() {
        let fake = FakeTransport::new();
        let consumer = consumer(&fake);
        assert_eq!(consumer.load_earlier().await.unwrap(), 0);
        assert!(fake.calls().is_empty());
    }
}
