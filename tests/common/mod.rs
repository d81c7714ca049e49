//! # Mock Platform — Simulated greymoon HTTP Server for Tests
//!
//! A lightweight in-process axum server that mimics the greymoon REST
//! surface, so the blocking client code can be integration-tested without
//! a real backend.
//!
//! | Method | Path | Purpose |
//! |--------|------|---------|
//! | POST | `/api/token/` | Issue an access/refresh pair |
//! | POST | `/api/register/` | Create an account |
//! | GET | `/api/me/` | Current user |
//! | GET | `/api/services/` | Current lead set |
//! | GET | `/api/cities/` | City catalog |
//! | GET | `/api/scrape-status/` | Authoritative run status |
//! | POST | `/api/scrape-services/` | Start a run |
//! | POST | `/api/cancel-scrape/` | Cancel a run |
//! | PATCH | `/api/leads/{post_id}/status/` | Update one lead's status |
//! | GET | `/api/scrape-history/` | Past runs |
//!
//! The server binds `127.0.0.1:0` (random port) and runs as a background
//! tokio task, aborted on drop. All state sits behind `Arc<Mutex<..>>`:
//! tests reconfigure responses at runtime (`set_status`, `set_leads`,
//! error injection per endpoint) and inspect request logs afterwards
//! (`start_requests`, `cancel_requests`, `patch_requests`).
//!
//! Status scripting: `push_status` queues reports that are consumed one
//! per poll before falling back to the standing status — enough to script
//! RUNNING, RUNNING, SUCCEEDED against a live poll loop.

#![allow(dead_code)]

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

pub const VALID_ACCESS: &str = "test-access-token";
pub const VALID_REFRESH: &str = "test-refresh-token";
pub const VALID_PASSWORD: &str = "hunter2";

/// A recorded `POST /api/scrape-services/` payload.
#[derive(Debug, Clone)]
pub struct RecordedStart {
    pub cities: Vec<String>,
}

/// A recorded `PATCH /api/leads/{post_id}/status/` payload.
#[derive(Debug, Clone)]
pub struct RecordedPatch {
    pub post_id: String,
    pub status: String,
}

#[derive(Debug)]
struct MockState {
    /// Standing status report, returned when the script queue is empty.
    status: String,
    run_id: Option<String>,
    /// Scripted reports consumed one per poll.
    status_script: VecDeque<(String, Option<String>)>,

    leads: Value,
    cities: Value,
    history: Value,

    /// Forced HTTP errors per endpoint; `None` means normal behavior.
    login_error: Option<u16>,
    register_error: Option<u16>,
    status_error: Option<u16>,
    start_error: Option<u16>,
    cancel_error: Option<u16>,
    leads_error: Option<u16>,
    patch_error: Option<u16>,

    run_counter: u64,

    start_requests: Vec<RecordedStart>,
    cancel_requests: Vec<String>,
    patch_requests: Vec<RecordedPatch>,
    status_polls: u64,
    lead_fetches: u64,
}

impl Default for MockState {
    fn default() -> Self {
        MockState {
            status: "IDLE".to_string(),
            run_id: None,
            status_script: VecDeque::new(),
            leads: json!([]),
            cities: json!([
                {"code": "msp", "name": "Minneapolis", "state": "MN", "display": "Minneapolis, MN"},
                {"code": "chi", "name": "Chicago", "state": "IL", "display": "Chicago, IL"}
            ]),
            history: json!([]),
            login_error: None,
            register_error: None,
            status_error: None,
            start_error: None,
            cancel_error: None,
            leads_error: None,
            patch_error: None,
            run_counter: 0,
            start_requests: Vec::new(),
            cancel_requests: Vec::new(),
            patch_requests: Vec::new(),
            status_polls: 0,
            lead_fetches: 0,
        }
    }
}

type Shared = Arc<Mutex<MockState>>;

pub struct MockPlatform {
    base_url: String,
    abort_handle: tokio::task::AbortHandle,
    state: Shared,
}

impl Drop for MockPlatform {
    fn drop(&mut self) {
        self.abort_handle.abort();
    }
}

impl MockPlatform {
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(MockState::default()));

        let app = Router::new()
            .route("/api/token/", post(handle_token))
            .route("/api/register/", post(handle_register))
            .route("/api/me/", get(handle_me))
            .route("/api/services/", get(handle_services))
            .route("/api/cities/", get(handle_cities))
            .route("/api/scrape-status/", get(handle_status))
            .route("/api/scrape-services/", post(handle_start))
            .route("/api/cancel-scrape/", post(handle_cancel))
            .route("/api/leads/{post_id}/status/", patch(handle_patch_status))
            .route("/api/scrape-history/", get(handle_history))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock platform to a random port");
        let addr: SocketAddr = listener.local_addr().unwrap();
        let base_url = format!("http://127.0.0.1:{}/api", addr.port());

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock platform server failed");
        });
        // Give the listener a moment to start accepting.
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;

        MockPlatform {
            base_url,
            abort_handle: handle.abort_handle(),
            state,
        }
    }

    /// Base URL including the `/api` prefix — pass as the client's server.
    pub fn url(&self) -> String {
        self.base_url.clone()
    }

    // ── Runtime reconfiguration ─────────────────────────────────

    pub fn set_status(&self, status: &str, run_id: Option<&str>) {
        let mut s = self.state.lock().unwrap();
        s.status = status.to_string();
        s.run_id = run_id.map(|r| r.to_string());
    }

    /// Queue one scripted report, consumed by the next poll.
    pub fn push_status(&self, status: &str, run_id: Option<&str>) {
        self.state
            .lock()
            .unwrap()
            .status_script
            .push_back((status.to_string(), run_id.map(|r| r.to_string())));
    }

    pub fn set_leads(&self, leads: Value) {
        self.state.lock().unwrap().leads = leads;
    }

    pub fn set_history(&self, history: Value) {
        self.state.lock().unwrap().history = history;
    }

    pub fn set_login_error(&self, code: Option<u16>) {
        self.state.lock().unwrap().login_error = code;
    }

    pub fn set_register_error(&self, code: Option<u16>) {
        self.state.lock().unwrap().register_error = code;
    }

    pub fn set_status_error(&self, code: Option<u16>) {
        self.state.lock().unwrap().status_error = code;
    }

    pub fn set_start_error(&self, code: Option<u16>) {
        self.state.lock().unwrap().start_error = code;
    }

    pub fn set_cancel_error(&self, code: Option<u16>) {
        self.state.lock().unwrap().cancel_error = code;
    }

    pub fn set_leads_error(&self, code: Option<u16>) {
        self.state.lock().unwrap().leads_error = code;
    }

    pub fn set_patch_error(&self, code: Option<u16>) {
        self.state.lock().unwrap().patch_error = code;
    }

    // ── Request inspection ──────────────────────────────────────

    pub fn start_requests(&self) -> Vec<RecordedStart> {
        self.state.lock().unwrap().start_requests.clone()
    }

    pub fn cancel_requests(&self) -> Vec<String> {
        self.state.lock().unwrap().cancel_requests.clone()
    }

    pub fn patch_requests(&self) -> Vec<RecordedPatch> {
        self.state.lock().unwrap().patch_requests.clone()
    }

    pub fn status_polls(&self) -> u64 {
        self.state.lock().unwrap().status_polls
    }

    pub fn lead_fetches(&self) -> u64 {
        self.state.lock().unwrap().lead_fetches
    }
}

// ── Helpers ─────────────────────────────────────────────────────

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

fn require_auth(headers: &HeaderMap) -> Result<(), (StatusCode, Json<Value>)> {
    match bearer_token(headers).as_deref() {
        Some(VALID_ACCESS) => Ok(()),
        _ => Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Given token not valid for any token type"})),
        )),
    }
}

fn forced(code: Option<u16>) -> Option<(StatusCode, Json<Value>)> {
    code.map(|c| {
        (
            StatusCode::from_u16(c).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Json(json!({"error": format!("mock error {}", c)})),
        )
    })
}

// ── Route handlers ──────────────────────────────────────────────

async fn handle_token(
    State(state): State<Shared>,
    Json(payload): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if let Some(resp) = forced(state.lock().unwrap().login_error) {
        return resp;
    }
    let password = payload["password"].as_str().unwrap_or("");
    if password != VALID_PASSWORD {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "No active account found with the given credentials"})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({"access": VALID_ACCESS, "refresh": VALID_REFRESH})),
    )
}

async fn handle_register(
    State(state): State<Shared>,
    Json(payload): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if let Some(resp) = forced(state.lock().unwrap().register_error) {
        return resp;
    }
    let username = payload["username"].as_str().unwrap_or("");
    if username.len() < 3 {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Username must be at least 3 characters"})),
        );
    }
    (StatusCode::CREATED, Json(json!({"username": username})))
}

async fn handle_me(State(_state): State<Shared>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if let Err(resp) = require_auth(&headers) {
        return resp;
    }
    (
        StatusCode::OK,
        Json(json!({"id": 1, "username": "operator", "email": "ops@example.com"})),
    )
}

async fn handle_services(
    State(state): State<Shared>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if let Err(resp) = require_auth(&headers) {
        return resp;
    }
    let mut s = state.lock().unwrap();
    s.lead_fetches += 1;
    if let Some(resp) = forced(s.leads_error) {
        return resp;
    }
    (StatusCode::OK, Json(s.leads.clone()))
}

async fn handle_cities(
    State(state): State<Shared>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if let Err(resp) = require_auth(&headers) {
        return resp;
    }
    let cities = state.lock().unwrap().cities.clone();
    (StatusCode::OK, Json(json!({"cities": cities})))
}

async fn handle_status(
    State(state): State<Shared>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if let Err(resp) = require_auth(&headers) {
        return resp;
    }
    let mut s = state.lock().unwrap();
    s.status_polls += 1;
    if let Some(resp) = forced(s.status_error) {
        return resp;
    }
    let (status, run_id) = match s.status_script.pop_front() {
        Some(scripted) => scripted,
        None => (s.status.clone(), s.run_id.clone()),
    };
    match run_id {
        Some(run_id) => (StatusCode::OK, Json(json!({"status": status, "run_id": run_id}))),
        None => (StatusCode::OK, Json(json!({"status": status}))),
    }
}

async fn handle_start(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if let Err(resp) = require_auth(&headers) {
        return resp;
    }
    let cities: Vec<String> = payload["cities"]
        .as_array()
        .map(|a| {
            a.iter()
                .filter_map(|c| c.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();

    let mut s = state.lock().unwrap();
    s.start_requests.push(RecordedStart {
        cities: cities.clone(),
    });
    if let Some(resp) = forced(s.start_error) {
        return resp;
    }
    if cities.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "At least one city must be selected"})),
        );
    }
    s.run_counter += 1;
    let run_id = format!("run-{}", s.run_counter);
    s.status = "RUNNING".to_string();
    s.run_id = Some(run_id.clone());
    (StatusCode::OK, Json(json!({"message": "Scraping started", "run_id": run_id})))
}

async fn handle_cancel(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if let Err(resp) = require_auth(&headers) {
        return resp;
    }
    let run_id = payload["run_id"].as_str().unwrap_or("").to_string();
    let mut s = state.lock().unwrap();
    s.cancel_requests.push(run_id.clone());
    if let Some(resp) = forced(s.cancel_error) {
        return resp;
    }
    if run_id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "run_id required"})),
        );
    }
    // Acceptance only. Tests script the status transition themselves, so
    // the client's CANCELLING discipline stays observable.
    (StatusCode::OK, Json(json!({"message": "Scrape aborted"})))
}

async fn handle_patch_status(
    State(state): State<Shared>,
    Path(post_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if let Err(resp) = require_auth(&headers) {
        return resp;
    }
    let status = payload["status"].as_str().unwrap_or("").to_string();
    let mut s = state.lock().unwrap();
    s.patch_requests.push(RecordedPatch {
        post_id: post_id.clone(),
        status: status.clone(),
    });
    if let Some(resp) = forced(s.patch_error) {
        return resp;
    }
    let valid = ["NEW", "CONTACTED", "QUALIFIED", "WON", "LOST"];
    if !valid.contains(&status.as_str()) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Invalid status"})),
        );
    }
    (StatusCode::OK, Json(json!({"message": "Status updated"})))
}

async fn handle_history(
    State(state): State<Shared>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if let Err(resp) = require_auth(&headers) {
        return resp;
    }
    let history = state.lock().unwrap().history.clone();
    (StatusCode::OK, Json(history))
}

#[cfg(test)]
mod self_tests {
    //! Self-tests for the mock platform itself.
    //!
    //! Uses `reqwest` (async) rather than `ureq` (blocking): a blocking
    //! client would starve the mock's server task on the default
    //! single-threaded test runtime. The wire format is identical to what
    //! the real client sends.

    use super::*;

    #[tokio::test]
    async fn token_endpoint_issues_pair_for_valid_password() {
        let mock = MockPlatform::start().await;
        let client = reqwest::Client::new();
        let resp = client
            .post(format!("{}/token/", mock.url()))
            .json(&json!({"username": "operator", "password": VALID_PASSWORD}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["access"], VALID_ACCESS);
        assert_eq!(body["refresh"], VALID_REFRESH);
    }

    #[tokio::test]
    async fn authenticated_endpoints_reject_missing_bearer() {
        let mock = MockPlatform::start().await;
        let client = reqwest::Client::new();
        for path in ["services/", "cities/", "scrape-status/", "scrape-history/", "me/"] {
            let resp = client
                .get(format!("{}/{}", mock.url(), path))
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), 401, "expected 401 for {}", path);
        }
    }

    #[tokio::test]
    async fn start_records_cities_and_flips_status() {
        let mock = MockPlatform::start().await;
        let client = reqwest::Client::new();
        let resp = client
            .post(format!("{}/scrape-services/", mock.url()))
            .bearer_auth(VALID_ACCESS)
            .json(&json!({"cities": ["msp"]}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["run_id"], "run-1");

        assert_eq!(mock.start_requests().len(), 1);
        assert_eq!(mock.start_requests()[0].cities, vec!["msp"]);

        let status: Value = client
            .get(format!("{}/scrape-status/", mock.url()))
            .bearer_auth(VALID_ACCESS)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["status"], "RUNNING");
        assert_eq!(status["run_id"], "run-1");
    }

    #[tokio::test]
    async fn status_script_is_consumed_in_order() {
        let mock = MockPlatform::start().await;
        mock.set_status("RUNNING", Some("run-9"));
        mock.push_status("RUNNING", Some("run-9"));
        mock.push_status("SUCCEEDED", Some("run-9"));

        let client = reqwest::Client::new();
        let mut seen = Vec::new();
        for _ in 0..3 {
            let body: Value = client
                .get(format!("{}/scrape-status/", mock.url()))
                .bearer_auth(VALID_ACCESS)
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            seen.push(body["status"].as_str().unwrap().to_string());
        }
        // script first, then the standing status
        assert_eq!(seen, vec!["RUNNING", "SUCCEEDED", "RUNNING"]);
    }

    #[tokio::test]
    async fn patch_records_post_id_and_status() {
        let mock = MockPlatform::start().await;
        let client = reqwest::Client::new();
        let resp = client
            .patch(format!("{}/leads/p7/status/", mock.url()))
            .bearer_auth(VALID_ACCESS)
            .json(&json!({"status": "WON"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let patches = mock.patch_requests();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].post_id, "p7");
        assert_eq!(patches[0].status, "WON");
    }

    #[tokio::test]
    async fn forced_errors_apply_per_endpoint() {
        let mock = MockPlatform::start().await;
        mock.set_cancel_error(Some(503));
        let client = reqwest::Client::new();
        let resp = client
            .post(format!("{}/cancel-scrape/", mock.url()))
            .bearer_auth(VALID_ACCESS)
            .json(&json!({"run_id": "run-1"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 503);
        // the request is still recorded
        assert_eq!(mock.cancel_requests(), vec!["run-1"]);
    }
}

/// A lead payload with every field the server serializes.
pub fn lead_json(post_id: &str, score: i64) -> Value {
    json!({
        "post_id": post_id,
        "url": format!("https://example.org/post/{}", post_id),
        "title": format!("Lead {}", post_id),
        "datetime": "2026-08-01T14:30:00Z",
        "location": "Minneapolis",
        "category": "hss",
        "label": "household",
        "state": "Minnesota",
        "latitude": "44.9778",
        "longitude": "-93.2650",
        "map_accuracy": "rooftop",
        "post": "Burst pipe, call 555-0100",
        "phone": "555-0100",
        "email": null,
        "zip_code": "55401",
        "status": "NEW",
        "score": score,
        "score_reason": {"phone": 25},
        "raw_json": {"id": post_id},
        "created_at": "2026-08-01T14:31:02Z"
    })
}
