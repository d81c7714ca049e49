//! # API Client — greymoon REST Surface
//!
//! One method per operation the platform exposes. All authenticated
//! requests carry `Authorization: Bearer <access>`; a 401 from any of
//! them clears the persisted session before the error surfaces, so every
//! component observes the same logged-out state afterwards.
//!
//! HTTP status codes are handled here, not by the transport: the agent is
//! configured with `http_status_as_error(false)` so rejection bodies
//! (`{"error": ...}` / `{"detail": ...}`) can be read and shown to the
//! operator. Transport-level failures (refused, timed out, dropped) map
//! to [`ApiError::Transient`] and are the only errors the polling loop
//! swallows.

use crate::catalog::City;
use crate::error::ApiError;
use crate::leads::{Lead, LeadStatus};
use crate::session::{SessionStore, TokenPair};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

/// Response of `GET /me/`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub id: Option<i64>,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Response of `GET /scrape-status/`. `status` is the raw server-side
/// state string; `run_id` is absent when no run has ever started.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusReport {
    pub status: String,
    #[serde(default)]
    pub run_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StartAck {
    run_id: String,
}

#[derive(Debug, Deserialize)]
struct CitiesEnvelope {
    cities: Vec<City>,
}

/// One row of `GET /scrape-history/`.
#[derive(Debug, Clone, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub status: String,
    #[serde(default)]
    pub leads_collected: i64,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

pub struct ApiClient {
    base: String,
    agent: ureq::Agent,
    session: SessionStore,
}

impl ApiClient {
    /// Client against `server` (e.g. `http://127.0.0.1:8000/api`), using
    /// the default session location.
    pub fn new(server: &str) -> Result<Self, ApiError> {
        Ok(Self::with_session(server, SessionStore::open_default()?))
    }

    pub fn with_session(server: &str, session: SessionStore) -> Self {
        let agent = ureq::Agent::new_with_config(
            ureq::config::Config::builder()
                .timeout_connect(Some(Duration::from_secs(5)))
                .timeout_global(Some(Duration::from_secs(10)))
                .http_status_as_error(false)
                .build(),
        );
        ApiClient {
            base: server.trim_end_matches('/').to_string(),
            agent,
            session,
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path)
    }

    fn bearer(&self) -> Result<String, ApiError> {
        Ok(format!("Bearer {}", self.session.load()?.access))
    }

    // ── Auth operations ─────────────────────────────────────────

    /// `POST /token/`. Stores both tokens on success.
    pub fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let body = serde_json::json!({ "username": username, "password": password });
        let mut resp = self
            .agent
            .post(&self.url("token/"))
            .send_json(&body)
            .map_err(transport)?;
        // Bad credentials also arrive as 401 here; that is a rejection of
        // this attempt, not an invalidation signal for a stored session.
        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(ApiError::Rejected {
                status,
                message: read_error_message(&mut resp),
            });
        }
        let tokens: TokenPair = resp
            .body_mut()
            .read_json()
            .map_err(|e| ApiError::Transient(format!("bad token response: {}", e)))?;
        self.session.save(&tokens)
    }

    /// `POST /register/`.
    pub fn register(&self, username: &str, email: &str, password: &str) -> Result<(), ApiError> {
        let body = serde_json::json!({
            "username": username,
            "email": email,
            "password": password,
        });
        let resp = self
            .agent
            .post(&self.url("register/"))
            .send_json(&body)
            .map_err(transport)?;
        self.check(resp).map(|_| ())
    }

    /// Clears the local session. The server keeps no logout state.
    pub fn logout(&self) {
        self.session.clear();
    }

    /// `GET /me/`.
    pub fn current_user(&self) -> Result<UserInfo, ApiError> {
        let resp = self
            .agent
            .get(&self.url("me/"))
            .header("Authorization", &self.bearer()?)
            .call()
            .map_err(transport)?;
        self.read_json(resp)
    }

    // ── Run control ─────────────────────────────────────────────

    /// `POST /scrape-services/` with the selected city codes. Returns the
    /// server-assigned run id.
    pub fn start_scrape(&self, cities: &[String]) -> Result<String, ApiError> {
        let body = serde_json::json!({ "cities": cities });
        let resp = self
            .agent
            .post(&self.url("scrape-services/"))
            .header("Authorization", &self.bearer()?)
            .send_json(&body)
            .map_err(transport)?;
        let ack: StartAck = self.read_json(resp)?;
        Ok(ack.run_id)
    }

    /// `POST /cancel-scrape/` for a specific run.
    pub fn cancel_scrape(&self, run_id: &str) -> Result<(), ApiError> {
        let body = serde_json::json!({ "run_id": run_id });
        let resp = self
            .agent
            .post(&self.url("cancel-scrape/"))
            .header("Authorization", &self.bearer()?)
            .send_json(&body)
            .map_err(transport)?;
        self.check(resp).map(|_| ())
    }

    /// `GET /scrape-status/`, the authoritative run state.
    pub fn scrape_status(&self) -> Result<StatusReport, ApiError> {
        let resp = self
            .agent
            .get(&self.url("scrape-status/"))
            .header("Authorization", &self.bearer()?)
            .call()
            .map_err(transport)?;
        self.read_json(resp)
    }

    // ── Dataset ─────────────────────────────────────────────────

    /// `GET /services/`, the full current lead set, newest first.
    pub fn list_leads(&self) -> Result<Vec<Lead>, ApiError> {
        let resp = self
            .agent
            .get(&self.url("services/"))
            .header("Authorization", &self.bearer()?)
            .call()
            .map_err(transport)?;
        self.read_json(resp)
    }

    /// `PATCH /leads/{post_id}/status/`. The success body is ignored —
    /// the caller already holds the optimistically updated record.
    pub fn update_lead_status(&self, post_id: &str, status: LeadStatus) -> Result<(), ApiError> {
        let body = serde_json::json!({ "status": status });
        let resp = self
            .agent
            .patch(&self.url(&format!("leads/{}/status/", post_id)))
            .header("Authorization", &self.bearer()?)
            .send_json(&body)
            .map_err(transport)?;
        self.check(resp).map(|_| ())
    }

    // ── Catalog / history ───────────────────────────────────────

    /// `GET /cities/`.
    pub fn list_cities(&self) -> Result<Vec<City>, ApiError> {
        let resp = self
            .agent
            .get(&self.url("cities/"))
            .header("Authorization", &self.bearer()?)
            .call()
            .map_err(transport)?;
        let envelope: CitiesEnvelope = self.read_json(resp)?;
        Ok(envelope.cities)
    }

    /// `GET /scrape-history/`, newest first.
    pub fn scrape_history(&self) -> Result<Vec<RunRecord>, ApiError> {
        let resp = self
            .agent
            .get(&self.url("scrape-history/"))
            .header("Authorization", &self.bearer()?)
            .call()
            .map_err(transport)?;
        self.read_json(resp)
    }

    // ── Response handling ───────────────────────────────────────

    fn check(
        &self,
        mut resp: ureq::http::Response<ureq::Body>,
    ) -> Result<ureq::http::Response<ureq::Body>, ApiError> {
        let status = resp.status().as_u16();
        if (200..300).contains(&status) {
            return Ok(resp);
        }
        if status == 401 {
            self.session.clear();
            return Err(ApiError::Auth);
        }
        Err(ApiError::Rejected {
            status,
            message: read_error_message(&mut resp),
        })
    }

    fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        resp: ureq::http::Response<ureq::Body>,
    ) -> Result<T, ApiError> {
        let mut resp = self.check(resp)?;
        resp.body_mut()
            .read_json()
            .map_err(|e| ApiError::Transient(format!("bad response body: {}", e)))
    }
}

fn transport(e: ureq::Error) -> ApiError {
    ApiError::Transient(e.to_string())
}

/// Pull a human-readable message out of a rejection body. The platform
/// uses `{"error": ...}`; its auth layer uses `{"detail": ...}`.
fn read_error_message(resp: &mut ureq::http::Response<ureq::Body>) -> String {
    resp.body_mut()
        .read_to_string()
        .ok()
        .and_then(|body| {
            serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| {
                    v.get("error")
                        .or_else(|| v.get("detail"))
                        .and_then(|m| m.as_str())
                        .map(|m| m.to_string())
                })
                .or(Some(body))
        })
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| "request failed".to_string())
}
