//! Typed error hierarchy for the buildwatch client.
//!
//! Library code returns `ApiError` from every backend call. Controllers never
//! propagate it: each failure is folded into an explicit state value, so the
//! only place these errors surface as `Err` is the one-shot CLI commands.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from a single request to the build backend.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Backend returned HTTP {status}")]
    Http { status: u16, body: Option<String> },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Invalid request URL '{0}'")]
    InvalidUrl(String),
}

impl ApiError {
    /// The HTTP status code, when the backend answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Value of the `error_type` field in a structured JSON error body.
    pub fn error_type(&self) -> Option<String> {
        let ApiError::Http {
            body: Some(body), ..
        } = self
        else {
            return None;
        };
        serde_json::from_str::<serde_json::Value>(body)
            .ok()?
            .get("error_type")?
            .as_str()
            .map(str::to_string)
    }
}

/// Why a resume attempt was given up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeErrorKind {
    /// The server reported the sandbox is gone for good.
    SandboxExpired,
    /// Anything else: network failure, other status codes, unparseable bodies.
    SandboxUnreachable,
}

impl ResumeErrorKind {
    pub fn classify(err: &ApiError) -> Self {
        match err.error_type().as_deref() {
            Some("sandbox_expired") => Self::SandboxExpired,
            _ => Self::SandboxUnreachable,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SandboxExpired => "sandbox_expired",
            Self::SandboxUnreachable => "sandbox_unreachable",
        }
    }
}
