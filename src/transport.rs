//! Authenticated HTTP transport.
//!
//! Every backend call goes through [`Transport`]. The production
//! implementation attaches a bearer credential from a [`CredentialSource`]
//! and turns non-2xx responses into [`ApiError::Http`]. Retries are not the
//! transport's business; the controllers own their retry policy.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::{Method, StatusCode};
use tracing::trace;

use crate::errors::ApiError;

pub type ByteStream = BoxStream<'static, Result<Bytes, ApiError>>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a request and return the whole response body.
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Bytes, ApiError>;

    /// Issue a GET and hand back the body as it arrives.
    async fn stream(&self, path: &str) -> Result<ByteStream, ApiError>;
}

/// Supplies the bearer credential attached to each request.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn bearer_token(&self) -> Option<String>;
}

/// A credential fixed at startup (config file, env var or CLI flag).
#[derive(Debug, Clone, Default)]
pub struct StaticToken(pub Option<String>);

#[async_trait]
impl CredentialSource for StaticToken {
    async fn bearer_token(&self) -> Option<String> {
        self.0.clone()
    }
}

pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
    credentials: Arc<dyn CredentialSource>,
    request_timeout: Option<Duration>,
}

impl ReqwestTransport {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            credentials,
            request_timeout: None,
        }
    }

    /// Per-request timeout for one-shot calls. Streams are never timed out.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    fn url(&self, path: &str) -> Result<reqwest::Url, ApiError> {
        let raw = format!("{}{}", self.base_url, path);
        reqwest::Url::parse(&raw).map_err(|_| ApiError::InvalidUrl(raw))
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let builder = match self.credentials.bearer_token().await {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        };
        let resp = builder.send().await.map_err(map_error)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.ok().filter(|b| !b.is_empty());
            return Err(http_error(status, body));
        }
        Ok(resp)
    }
}

fn map_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Network(err.to_string())
    }
}

fn http_error(status: StatusCode, body: Option<String>) -> ApiError {
    ApiError::Http {
        status: status.as_u16(),
        body,
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Bytes, ApiError> {
        let url = self.url(path)?;
        trace!(%method, %url, "request");
        let mut builder = self.client.request(method, url);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        let resp = self.send(builder).await?;
        resp.bytes().await.map_err(map_error)
    }

    async fn stream(&self, path: &str) -> Result<ByteStream, ApiError> {
        let url = self.url(path)?;
        trace!(%url, "stream");
        let builder = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream");
        let resp = self.send(builder).await?;
        Ok(resp.bytes_stream().map(|r| r.map_err(map_error)).boxed())
    }
}
