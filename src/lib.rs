//! Client-side observability for remote build jobs.
//!
//! Three independent controllers watch one job each:
//!
//! - [`status::StatusPoller`] polls coarse job status with a circuit breaker
//! - [`logs::LogStreamConsumer`] follows the live log stream and pages back
//! - [`preview::PreviewController`] drives the preview sandbox lifecycle
//!
//! [`session::BuildSession`] points all three at the same job.

pub mod api;
pub mod config;
pub mod errors;
pub mod lifecycle;
pub mod logging;
pub mod logs;
pub mod models;
pub mod preview;
pub mod session;
pub mod status;
pub mod transport;
pub mod ui;

pub use api::BuildApi;
pub use errors::{ApiError, ResumeErrorKind};
pub use session::BuildSession;
