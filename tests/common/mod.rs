//! In-process build API used by the integration tests.

#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream;
use serde::Deserialize;
use serde_json::{Value, json};

pub const TOKEN: &str = "test-token";

/// Status sequence served for `GET /jobs/{id}/status`, one entry per call;
/// the last entry repeats.
pub const STATUS_SEQUENCE: &[&str] = &["queued", "code", "deps", "ready"];

#[derive(Default)]
pub struct Backend {
    pub status_calls: AtomicUsize,
    pub resume_calls: AtomicUsize,
    pub log_page_calls: AtomicUsize,
}

pub struct Running {
    pub addr: SocketAddr,
    pub backend: Arc<Backend>,
}

impl Running {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

pub async fn spawn() -> Running {
    let backend = Arc::new(Backend::default());
    let app = Router::new()
        .route("/jobs/{id}/status", get(status))
        .route("/jobs/{id}/logs/stream", get(log_stream))
        .route("/jobs/{id}/logs", get(log_page))
        .route("/jobs/{id}/preview-check", get(preview_check))
        .route("/jobs/{id}/resume", post(resume))
        .with_state(Arc::clone(&backend));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Running { addr, backend }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {}", TOKEN))
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({"error_type": "unauthorized"}))).into_response()
}

pub fn line(id: u32, source: &str, text: &str) -> Value {
    json!({
        "id": id.to_string(),
        "timestamp": format!("2026-03-01T10:{:02}:{:02}Z", id / 60, id % 60),
        "source": source,
        "text": text,
    })
}

async fn status(
    State(backend): State<Arc<Backend>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    if id == "broken" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
    }
    let n = backend.status_calls.fetch_add(1, Ordering::SeqCst);
    let status = if id == "doomed" {
        "failed"
    } else {
        STATUS_SEQUENCE[n.min(STATUS_SEQUENCE.len() - 1)]
    };
    let mut body = json!({
        "status": status,
        "stage_label": format!("Stage {}", status),
        "build_version": "v1",
        "sandbox_paused": id == "sleepy",
    });
    if status == "ready" {
        body["preview_url"] = json!(format!("https://{}.preview.test", id));
        body["sandbox_expires_at"] = json!("2099-01-01T00:00:00Z");
    }
    if status == "failed" {
        body["error_message"] = json!("type check failed");
        body["debug_id"] = json!("dbg-1");
    }
    Json(body).into_response()
}

async fn log_stream(Path(_id): Path<String>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let events = vec![
        Event::default().event("heartbeat").data(""),
        Event::default().event("log").data(line(100, "stdout", "installing deps").to_string()),
        Event::default().event("log").data("{not json"),
        Event::default()
            .event("log")
            .data(line(101, "system", "Auto-fix attempt 1 of 3").to_string()),
        Event::default().event("log").data(line(102, "stderr", "warning: unused").to_string()),
        Event::default().event("done").data(json!({"status": "ready"}).to_string()),
    ];
    Sse::new(stream::iter(events.into_iter().map(Ok::<_, Infallible>))).into_response()
}

#[derive(Deserialize)]
struct PageQuery {
    before_id: Option<String>,
    limit: Option<usize>,
}

/// Lines 1..=99 are stored; pages walk backwards from `before_id`.
async fn log_page(
    State(backend): State<Arc<Backend>>,
    Path(_id): Path<String>,
    Query(query): Query<PageQuery>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    backend.log_page_calls.fetch_add(1, Ordering::SeqCst);
    let limit = query.limit.unwrap_or(100) as u32;
    let end = match query.before_id.as_deref().map(str::parse::<u32>) {
        Some(Ok(before)) => before.saturating_sub(1),
        Some(Err(_)) => return (StatusCode::BAD_REQUEST, "bad cursor").into_response(),
        None => 99,
    };
    let start = end.saturating_sub(limit.saturating_sub(1)).max(1);
    let lines: Vec<Value> = if end == 0 {
        vec![]
    } else {
        (start..=end).map(|i| line(i, "stdout", &format!("stored {}", i))).collect()
    };
    Json(json!({
        "lines": lines,
        "has_more": start > 1,
        "oldest_id": if end == 0 { Value::Null } else { json!(start.to_string()) },
    }))
    .into_response()
}

async fn preview_check(Path(id): Path<String>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    if id == "framed" {
        return Json(json!({"embeddable": false, "preview_url": "", "reason": "X-Frame-Options"}))
            .into_response();
    }
    Json(json!({
        "embeddable": true,
        "preview_url": format!("https://{}.preview.test/app", id),
        "reason": null,
    }))
    .into_response()
}

/// Fails the first call with `sandbox_unavailable`, then succeeds.
async fn resume(
    State(backend): State<Arc<Backend>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    if backend.resume_calls.fetch_add(1, Ordering::SeqCst) == 0 {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error_type": "sandbox_unavailable"})),
        )
            .into_response();
    }
    Json(json!({
        "preview_url": format!("https://{}.resumed.test", id),
        "sandbox_id": "sb-1",
    }))
    .into_response()
}
