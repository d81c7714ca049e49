//! # Leads — Dataset, Filter and Pagination Engine
//!
//! Holds the full fetched lead set and a derived filtered/paginated view.
//! `replace_all` swaps the whole set atomically (the refresh path calls it
//! on every poll tick), `apply_filter` rebuilds the view from compound
//! criteria, and the aggregates are eager O(n) scans over the full set —
//! n is bounded (a run collects at most a few thousand leads), so nothing
//! is maintained incrementally.
//!
//! Ordering: the filtered view preserves fetch order. The server already
//! returns leads newest-first; the store never re-sorts.
//!
//! ## Optimistic Status Edits
//!
//! `set_status` writes the new status locally before the PATCH round-trip
//! and reverts the single field on failure. A refresh that lands between
//! the optimistic write and the server confirmation can overwrite it with
//! stale data until the next refresh; this race is accepted rather than
//! versioned away.

use crate::api::ApiClient;
use crate::error::ApiError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Pipeline stage of a collected lead, operator-assigned.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
    Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadStatus {
    #[default]
    New,
    Contacted,
    Qualified,
    Won,
    Lost,
}

/// One collected record, as served by `GET /services/`.
///
/// `latitude`/`longitude` are strings on the wire (the collector stores
/// them verbatim); [`Lead::coords`] parses them on demand. A lead is
/// map-eligible only when both parse as finite floats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub post_id: String,
    #[serde(default)]
    pub url: Option<String>,
    pub title: String,
    #[serde(default)]
    pub datetime: Option<DateTime<Utc>>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub latitude: Option<String>,
    #[serde(default)]
    pub longitude: Option<String>,
    #[serde(default)]
    pub map_accuracy: Option<String>,
    /// Post body text the contact details were extracted from.
    #[serde(default)]
    pub post: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub zip_code: Option<String>,
    #[serde(default)]
    pub status: LeadStatus,
    /// 0–100, assigned by the collector's scoring pass.
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub score_reason: Option<serde_json::Value>,
    /// Untouched collector payload, kept opaque.
    #[serde(default)]
    pub raw_json: Option<serde_json::Value>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Lead {
    /// Empty strings count as absent — the collector emits both.
    pub fn has_phone(&self) -> bool {
        self.phone.as_deref().is_some_and(|p| !p.is_empty())
    }

    pub fn has_email(&self) -> bool {
        self.email.as_deref().is_some_and(|e| !e.is_empty())
    }

    /// Both coordinates present and numeric, or nothing.
    pub fn coords(&self) -> Option<(f64, f64)> {
        let lat = self.latitude.as_deref()?.trim().parse::<f64>().ok()?;
        let lon = self.longitude.as_deref()?.trim().parse::<f64>().ok()?;
        if lat.is_finite() && lon.is_finite() {
            Some((lat, lon))
        } else {
            None
        }
    }
}

/// Compound filter. Absent fields impose no constraint; present fields
/// are ANDed. Score bounds are inclusive on both ends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub category: Option<String>,
    pub state: Option<String>,
    pub status: Option<LeadStatus>,
    pub has_phone: Option<bool>,
    pub has_email: Option<bool>,
    pub score_min: Option<i64>,
    pub score_max: Option<i64>,
}

impl FilterCriteria {
    pub fn matches(&self, lead: &Lead) -> bool {
        if let Some(category) = &self.category {
            if lead.category.as_deref() != Some(category.as_str()) {
                return false;
            }
        }
        if let Some(state) = &self.state {
            if lead.state.as_deref() != Some(state.as_str()) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if lead.status != status {
                return false;
            }
        }
        if let Some(expected) = self.has_phone {
            if lead.has_phone() != expected {
                return false;
            }
        }
        if let Some(expected) = self.has_email {
            if lead.has_email() != expected {
                return false;
            }
        }
        if let Some(min) = self.score_min {
            if lead.score < min {
                return false;
            }
        }
        if let Some(max) = self.score_max {
            if lead.score > max {
                return false;
            }
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.category.is_none()
            && self.state.is_none()
            && self.status.is_none()
            && self.has_phone.is_none()
            && self.has_email.is_none()
            && self.score_min.is_none()
            && self.score_max.is_none()
    }
}

/// Derived counts over the full (unfiltered) set.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Aggregates {
    pub total: usize,
    pub by_status: BTreeMap<LeadStatus, usize>,
    pub with_phone: usize,
    pub with_email: usize,
    pub geolocated: usize,
}

impl Aggregates {
    fn compute(records: &[Lead]) -> Self {
        let mut agg = Aggregates {
            total: records.len(),
            ..Default::default()
        };
        for lead in records {
            *agg.by_status.entry(lead.status).or_insert(0) += 1;
            if lead.has_phone() {
                agg.with_phone += 1;
            }
            if lead.has_email() {
                agg.with_email += 1;
            }
            if lead.coords().is_some() {
                agg.geolocated += 1;
            }
        }
        agg
    }
}

/// The dataset engine: full record set + filtered view + cursor.
///
/// Single-writer: callers serialize mutation (the watch loop is the only
/// background writer, and it owns the store while it runs).
pub struct LeadStore {
    records: Vec<Lead>,
    filter: FilterCriteria,
    /// Indices into `records`, in fetch order.
    filtered: Vec<usize>,
    aggregates: Aggregates,
    /// 1-based, always within `[1, max(total_pages, 1)]`.
    page: usize,
    page_size: usize,
}

impl Default for LeadStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LeadStore {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        LeadStore {
            records: Vec::new(),
            filter: FilterCriteria::default(),
            filtered: Vec::new(),
            aggregates: Aggregates::default(),
            page: 1,
            page_size: page_size.max(1),
        }
    }

    /// Swap the full set, recompute aggregates, re-apply the active
    /// filter, and clamp the cursor. Whole-set replacement: the most
    /// recent arrival wins, regardless of fetch start order.
    pub fn replace_all(&mut self, records: Vec<Lead>) {
        self.records = records;
        self.aggregates = Aggregates::compute(&self.records);
        self.rebuild_filtered();
        self.page = self.page.clamp(1, self.total_pages().max(1));
    }

    /// Set new criteria and rebuild the view. Resets the cursor to page 1.
    pub fn apply_filter(&mut self, criteria: FilterCriteria) {
        self.filter = criteria;
        self.rebuild_filtered();
        self.page = 1;
    }

    fn rebuild_filtered(&mut self) {
        self.filtered = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, lead)| self.filter.matches(lead))
            .map(|(i, _)| i)
            .collect();
    }

    /// The requested page of the filtered view, in fetch order. `n` is
    /// clamped to `[1, total_pages]` (page 1 when the view is empty); the
    /// clamped value becomes the current cursor.
    pub fn page(&mut self, n: usize) -> Vec<&Lead> {
        self.page = n.clamp(1, self.total_pages().max(1));
        let start = (self.page - 1) * self.page_size;
        self.filtered
            .iter()
            .skip(start)
            .take(self.page_size)
            .map(|&i| &self.records[i])
            .collect()
    }

    /// Optimistically set one lead's status, PATCH it upstream, and roll
    /// the field back if the server refuses. All other fields are left
    /// untouched either way.
    pub fn set_status(
        &mut self,
        api: &ApiClient,
        post_id: &str,
        new_status: LeadStatus,
    ) -> Result<(), ApiError> {
        let idx = self
            .records
            .iter()
            .position(|l| l.post_id == post_id)
            .ok_or_else(|| ApiError::Validation(format!("no lead with post_id {}", post_id)))?;

        let prior = self.records[idx].status;
        self.records[idx].status = new_status;

        if let Err(e) = api.update_lead_status(post_id, new_status) {
            self.records[idx].status = prior;
            return Err(e);
        }

        self.aggregates = Aggregates::compute(&self.records);
        self.rebuild_filtered();
        Ok(())
    }

    pub fn aggregates(&self) -> &Aggregates {
        &self.aggregates
    }

    pub fn filter(&self) -> &FilterCriteria {
        &self.filter
    }

    pub fn get(&self, post_id: &str) -> Option<&Lead> {
        self.records.iter().find(|l| l.post_id == post_id)
    }

    /// Leads with usable coordinates, from the full set.
    pub fn map_eligible(&self) -> Vec<&Lead> {
        self.records.iter().filter(|l| l.coords().is_some()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn filtered_len(&self) -> usize {
        self.filtered.len()
    }

    pub fn total_pages(&self) -> usize {
        self.filtered.len().div_ceil(self.page_size)
    }

    pub fn current_page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }
}
