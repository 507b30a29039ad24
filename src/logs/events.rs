use tracing::debug;

use crate::models::{DonePayload, DoneStatus, LogLine};

/// One event decoded from the log stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Keep-alive for intermediaries; carries no state.
    Heartbeat,
    Log(LogLine),
    /// End of the build. The status is `None` when the payload was unreadable.
    Done(Option<DoneStatus>),
}

impl StreamEvent {
    /// Decode an event block. Returns `None` for unknown event types and for
    /// `log` payloads that do not parse; those are dropped, never fatal.
    pub fn parse(event: &str, data: &str) -> Option<Self> {
        match event {
            "heartbeat" => Some(Self::Heartbeat),
            "log" => match serde_json::from_str::<LogLine>(data) {
                Ok(line) => Some(Self::Log(line)),
                Err(e) => {
                    debug!(error = %e, data, "dropping malformed log event");
                    None
                }
            },
            "done" => {
                let status = serde_json::from_str::<DonePayload>(data)
                    .map(|p| p.status)
                    .map_err(|e| debug!(error = %e, data, "unreadable done payload"))
                    .ok();
                Some(Self::Done(status))
            }
            other => {
                debug!(event = other, "ignoring unknown stream event");
                None
            }
        }
    }
}
