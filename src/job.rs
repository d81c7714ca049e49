//! # Job Controller — Run Lifecycle State Machine
//!
//! Owns the single active collection run and reconciles the local view
//! with the server's authoritative status:
//!
//! ```text
//! IDLE ──start──> RUNNING ──poll:terminal──> COMPLETED | FAILED
//!                    │
//!                 cancel (optimistic)
//!                    ▼
//!               CANCELLING ──poll:terminal──> COMPLETED | FAILED
//! ```
//!
//! Transitions out of RUNNING/CANCELLING happen only when a poll observes
//! a terminal status — never optimistically. A poll that still reports
//! RUNNING never downgrades CANCELLING: the cancel request was already
//! accepted, and only the server's terminal report settles the outcome.
//! There is no local cancel timeout; request-level timeouts bound each
//! poll, and the machine waits for the authoritative report rather than
//! inventing one.
//!
//! ## Polling Discipline
//!
//! Fixed 5-second cadence with at most one in-flight status request,
//! enforced by a busy flag: an overlapping tick is skipped, not queued,
//! so status reports can never apply out of order. Transient failures are
//! logged and swallowed — a dropped poll never flips the machine to
//! FAILED. A 401 aborts polling; the session layer has already dropped
//! the credential by the time it surfaces.

use crate::api::{ApiClient, StatusReport};
use crate::error::ApiError;
use crate::leads::LeadStore;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Idle,
    Running,
    Cancelling,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    pub fn is_active(self) -> bool {
        matches!(self, RunStatus::Running | RunStatus::Cancelling)
    }

    /// Map a server-side status string onto the machine's states. The
    /// upstream executor reports `SUCCEEDED`/`FAILED`/`ABORTED`/
    /// `TIMED-OUT`; an aborted run did not complete its collection, so it
    /// lands in `Failed`. Unknown strings yield `None` and the caller
    /// keeps its current state.
    pub fn from_wire(s: &str) -> Option<RunStatus> {
        match s {
            "RUNNING" => Some(RunStatus::Running),
            "SUCCEEDED" | "COMPLETED" => Some(RunStatus::Completed),
            "FAILED" | "ABORTED" | "TIMED-OUT" => Some(RunStatus::Failed),
            "IDLE" => Some(RunStatus::Idle),
            _ => None,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Idle => "IDLE",
            RunStatus::Running => "RUNNING",
            RunStatus::Cancelling => "CANCELLING",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Pure transition function applied to every authoritative observation.
///
/// - Terminal local states only move via a new `start`, never via polls.
/// - CANCELLING holds through RUNNING/IDLE observations.
/// - An idle machine adopts a live run the server reports (the client
///   restarted while a run was in flight); it ignores terminal reports
///   of runs it never owned.
/// - A stale IDLE report never resets an active machine.
pub fn next_status(local: RunStatus, observed: RunStatus) -> RunStatus {
    use RunStatus::*;
    match (local, observed) {
        (Completed, _) | (Failed, _) => local,
        (Running, Completed) | (Cancelling, Completed) => Completed,
        (Running, Failed) | (Cancelling, Failed) => Failed,
        (Idle, Running) => Running,
        (Idle, _) => Idle,
        (Cancelling, _) => Cancelling,
        (Running, _) => Running,
    }
}

#[derive(Debug)]
struct RunState {
    status: RunStatus,
    run_id: Option<String>,
    cities: Vec<String>,
}

/// Snapshot of the controller for display.
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub status: RunStatus,
    pub run_id: Option<String>,
    pub cities: Vec<String>,
}

pub struct JobController {
    api: ApiClient,
    state: Mutex<RunState>,
    poll_busy: AtomicBool,
    shutdown: AtomicBool,
    poll_interval: Duration,
}

impl JobController {
    pub fn new(api: ApiClient) -> Self {
        Self::with_poll_interval(api, POLL_INTERVAL)
    }

    pub fn with_poll_interval(api: ApiClient, poll_interval: Duration) -> Self {
        JobController {
            api,
            state: Mutex::new(RunState {
                status: RunStatus::Idle,
                run_id: None,
                cities: Vec::new(),
            }),
            poll_busy: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            poll_interval,
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn current_status(&self) -> RunStatus {
        self.state.lock().unwrap().status
    }

    pub fn snapshot(&self) -> RunSnapshot {
        let st = self.state.lock().unwrap();
        RunSnapshot {
            status: st.status,
            run_id: st.run_id.clone(),
            cities: st.cities.clone(),
        }
    }

    /// Start a run over the selected cities. Empty selections are
    /// rejected before any network call. On request failure the machine
    /// stays where it was; there is no automatic retry.
    pub fn start(&self, cities: Vec<String>) -> Result<String, ApiError> {
        if cities.is_empty() {
            return Err(ApiError::Validation(
                "at least one city must be selected".into(),
            ));
        }
        {
            let st = self.state.lock().unwrap();
            if st.status.is_active() {
                return Err(ApiError::Validation(format!(
                    "a run is already {} (run_id {})",
                    st.status,
                    st.run_id.as_deref().unwrap_or("unknown")
                )));
            }
        }

        let run_id = self.api.start_scrape(&cities)?;

        let mut st = self.state.lock().unwrap();
        st.status = RunStatus::Running;
        st.run_id = Some(run_id.clone());
        st.cities = cities;
        info!(run_id = %run_id, cities = st.cities.len(), "run started");
        Ok(run_id)
    }

    /// Request cancellation of the active run. Only legal while RUNNING.
    /// The machine moves to CANCELLING as soon as the request is sent —
    /// acceptance is optimistic, completion is confirmed by polling. If
    /// the request itself fails, the machine reverts to RUNNING.
    pub fn cancel(&self) -> Result<(), ApiError> {
        let run_id = {
            let mut st = self.state.lock().unwrap();
            if st.status != RunStatus::Running {
                return Err(ApiError::Validation(format!(
                    "no run to cancel (status {})",
                    st.status
                )));
            }
            let run_id = st
                .run_id
                .clone()
                .ok_or_else(|| ApiError::Validation("running without a run_id".into()))?;
            st.status = RunStatus::Cancelling;
            run_id
        };

        if let Err(e) = self.api.cancel_scrape(&run_id) {
            let mut st = self.state.lock().unwrap();
            // A poll may have observed a terminal state while the cancel
            // request was in flight; only revert a still-pending cancel.
            if st.status == RunStatus::Cancelling {
                st.status = RunStatus::Running;
            }
            return Err(e);
        }

        info!(run_id = %run_id, "cancel requested, awaiting confirmation");
        Ok(())
    }

    /// One poll of the authoritative status. Skipped (not queued) when a
    /// previous tick is still in flight. Transient and rejection failures
    /// are swallowed and retried next tick; only a 401 propagates.
    pub fn poll_tick(&self) -> Result<RunStatus, ApiError> {
        if self.poll_busy.swap(true, Ordering::SeqCst) {
            return Ok(self.current_status());
        }
        let outcome = self.api.scrape_status();
        self.poll_busy.store(false, Ordering::SeqCst);

        match outcome {
            Ok(report) => Ok(self.apply_report(&report)),
            Err(ApiError::Auth) => Err(ApiError::Auth),
            Err(e) => {
                warn!(error = %e, "status poll failed, retrying next tick");
                Ok(self.current_status())
            }
        }
    }

    /// Fold an authoritative report into the machine.
    pub fn apply_report(&self, report: &StatusReport) -> RunStatus {
        let mut st = self.state.lock().unwrap();
        let Some(observed) = RunStatus::from_wire(&report.status) else {
            warn!(status = %report.status, "unknown run status from server, keeping state");
            return st.status;
        };

        let next = next_status(st.status, observed);
        if st.status == RunStatus::Idle && next == RunStatus::Running {
            st.run_id = report.run_id.clone();
            info!(run_id = ?st.run_id, "adopted live run from server");
        } else if next != st.status {
            info!(from = %st.status, to = %next, run_id = ?st.run_id, "run state changed");
        }
        st.status = next;
        st.status
    }

    /// Drive the poll loop until the run settles: each tick polls status,
    /// refreshes the lead set into `store`, and reports through
    /// `on_tick`. Returns the final status — terminal, or IDLE when there
    /// was nothing to watch. Lead-refresh failures follow the same
    /// swallow-and-retry policy as status polls.
    pub fn run_until_terminal(
        &self,
        store: &mut LeadStore,
        mut on_tick: impl FnMut(RunStatus, &LeadStore),
    ) -> Result<RunStatus, ApiError> {
        loop {
            let status = self.poll_tick()?;

            match self.api.list_leads() {
                Ok(records) => store.replace_all(records),
                Err(ApiError::Auth) => return Err(ApiError::Auth),
                Err(e) => warn!(error = %e, "lead refresh failed, retrying next tick"),
            }

            on_tick(status, store);

            if !status.is_active() || self.shutdown.load(Ordering::Relaxed) {
                return Ok(status);
            }
            std::thread::sleep(self.poll_interval);
        }
    }

    /// Stop the poll loop at the next tick boundary.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}
