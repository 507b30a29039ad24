//! Preview Lifecycle: eligibility, loading, expiry countdown and resume of a
//! paused sandbox.

pub mod controller;
pub mod machine;

pub use controller::{Clock, PreviewController, PreviewNotice, SystemClock};
pub use machine::{
    PreviewEffect, PreviewEvent, PreviewParams, PreviewPhase, PreviewState, PreviewTiming,
};
