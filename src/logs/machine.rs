//! Log stream state machine.
//!
//! Lines only ever enter at the ends of the sequence: live lines are
//! appended in receipt order, backfilled lines are prepended. A line id is
//! held at most once.

use std::collections::HashSet;

use super::autofix::{self, AutoFixSignal};
use super::events::StreamEvent;
use crate::models::{DoneStatus, LogLine, LogSource, LogsPage};

#[derive(Debug, Clone)]
pub enum LogEvent {
    Connected,
    Stream(StreamEvent),
    Disconnected,
    Backfill(LogsPage),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogStreamState {
    pub job_id: Option<String>,
    pub lines: Vec<LogLine>,
    pub is_connected: bool,
    pub is_done: bool,
    pub done_status: Option<DoneStatus>,
    pub has_earlier_lines: bool,
    pub oldest_id: Option<String>,
    pub auto_fix_attempt: Option<u32>,
    pub auto_fix_max: Option<u32>,
    seen: HashSet<String>,
    backfilled: bool,
    closed: bool,
}

impl LogStreamState {
    pub fn for_job(job_id: impl Into<String>) -> Self {
        Self {
            job_id: Some(job_id.into()),
            // Unknown until the first backfill answers.
            has_earlier_lines: true,
            ..Self::default()
        }
    }

    pub fn has_backfilled(&self) -> bool {
        self.backfilled
    }

    /// Whether the stream connection has ended, by `done` or otherwise.
    /// There is no reconnect, so nothing further arrives live.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Cursor for the next backfill request.
    pub fn backfill_cursor(&self) -> Option<&str> {
        if self.backfilled {
            self.oldest_id.as_deref()
        } else {
            None
        }
    }

    /// Apply an event. Returns the number of lines added.
    pub fn apply(&mut self, event: LogEvent) -> usize {
        match event {
            LogEvent::Connected => {
                if !self.is_done {
                    self.is_connected = true;
                }
                0
            }
            LogEvent::Disconnected => {
                self.is_connected = false;
                self.closed = true;
                0
            }
            LogEvent::Stream(event) => self.apply_stream(event),
            LogEvent::Backfill(page) => self.prepend(page),
        }
    }

    fn apply_stream(&mut self, event: StreamEvent) -> usize {
        if self.is_done {
            return 0;
        }
        match event {
            StreamEvent::Heartbeat => 0,
            StreamEvent::Log(line) => {
                if !self.seen.insert(line.id.clone()) {
                    return 0;
                }
                if line.source == LogSource::System {
                    self.detect_auto_fix(&line.text);
                }
                self.lines.push(line);
                1
            }
            StreamEvent::Done(status) => {
                self.is_done = true;
                self.is_connected = false;
                self.closed = true;
                self.done_status = status;
                0
            }
        }
    }

    fn detect_auto_fix(&mut self, text: &str) {
        match autofix::detect(text) {
            Some(AutoFixSignal::Attempt { attempt, max }) => {
                self.auto_fix_attempt = Some(attempt);
                self.auto_fix_max = Some(max);
            }
            Some(AutoFixSignal::Cleared) => {
                self.auto_fix_attempt = None;
                self.auto_fix_max = None;
            }
            None => {}
        }
    }

    fn prepend(&mut self, page: LogsPage) -> usize {
        let earliest = self.lines.first().map(|l| l.timestamp);
        let mut fresh: Vec<LogLine> = page
            .lines
            .into_iter()
            .filter(|l| earliest.is_none_or(|ts| l.timestamp <= ts))
            .filter(|l| self.seen.insert(l.id.clone()))
            .collect();
        fresh.sort_by_key(|l| l.timestamp);

        let added = fresh.len();
        self.lines.splice(0..0, fresh);
        self.has_earlier_lines = page.has_more;
        self.oldest_id = self
            .lines
            .first()
            .map(|l| l.id.clone())
            .or(page.oldest_id);
        self.backfilled = true;
        added
    }
}
