//! Log Stream Consumer: live build output plus paged backfill.
//!
//! - `events`: decoding of `heartbeat`, `log` and `done` stream events
//! - `autofix`: recognition of auto-fix progress in system lines
//! - `machine`: [`LogStreamState`], the pure line buffer
//! - `consumer`: [`LogStreamConsumer`], the task reading the stream

pub mod autofix;
pub mod consumer;
pub mod events;
pub mod machine;

pub use autofix::AutoFixSignal;
pub use consumer::LogStreamConsumer;
pub use events::StreamEvent;
pub use machine::{LogEvent, LogStreamState};
