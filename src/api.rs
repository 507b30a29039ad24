//! Typed client for the build backend endpoints.

use std::sync::Arc;

use reqwest::Method;
use serde::de::DeserializeOwned;

use crate::errors::ApiError;
use crate::models::{LogsPage, PreviewCheck, ResumeResponse, StatusResponse};
use crate::transport::{ByteStream, Transport};

/// Default page size for log backfill requests.
pub const BACKFILL_LIMIT: usize = 100;

#[derive(Clone)]
pub struct BuildApi {
    transport: Arc<dyn Transport>,
}

impl BuildApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn fetch_status(&self, job_id: &str) -> Result<StatusResponse, ApiError> {
        self.get_json(&paths::status(job_id), &[]).await
    }

    pub async fn open_log_stream(&self, job_id: &str) -> Result<ByteStream, ApiError> {
        self.transport.stream(&paths::log_stream(job_id)).await
    }

    /// Fetch up to `limit` lines older than `before_id`, or the newest
    /// `limit` lines when no cursor is given.
    pub async fn fetch_logs(
        &self,
        job_id: &str,
        before_id: Option<&str>,
        limit: usize,
    ) -> Result<LogsPage, ApiError> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(before) = before_id {
            query.push(("before_id", before.to_string()));
        }
        self.get_json(&paths::logs(job_id), &query).await
    }

    pub async fn check_preview(&self, job_id: &str) -> Result<PreviewCheck, ApiError> {
        self.get_json(&paths::preview_check(job_id), &[]).await
    }

    pub async fn resume(&self, job_id: &str) -> Result<ResumeResponse, ApiError> {
        let body = self
            .transport
            .request(Method::POST, &paths::resume(job_id), &[])
            .await?;
        decode(&body)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let body = self.transport.request(Method::GET, path, query).await?;
        decode(&body)
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::Decode(e.to_string()))
}

/// Endpoint paths relative to the configured base URL.
pub mod paths {
    pub fn status(job_id: &str) -> String {
        format!("/jobs/{}/status", job_id)
    }

    pub fn log_stream(job_id: &str) -> String {
        format!("/jobs/{}/logs/stream", job_id)
    }

    pub fn logs(job_id: &str) -> String {
        format!("/jobs/{}/logs", job_id)
    }

    pub fn preview_check(job_id: &str) -> String {
        format!("/jobs/{}/preview-check", job_id)
    }

    pub fn resume(job_id: &str) -> String {
        format!("/jobs/{}/resume", job_id)
    }
}
