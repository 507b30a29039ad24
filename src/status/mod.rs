//! Status Poller: periodic job status with a connection circuit breaker.
//!
//! - `machine`: [`StatusTracker`], the pure state and its `apply` function
//! - `poller`: [`StatusPoller`], the task that drives fetches on a timer

pub mod machine;
pub mod poller;

pub use machine::{FAILURE_THRESHOLD, StatusEvent, StatusTracker};
pub use poller::{POLL_INTERVAL, PollConfig, StatusPoller};
