//! # City Catalog — Scrapeable Locations and Run Selection
//!
//! Loads the list of locations the collector can target and keeps the
//! operator's selection set for the next run. Cities are grouped by state
//! for display, states ascending, cities in server-supplied order within
//! each state. The catalog is selection-only: leads carry their own
//! `state`/`zip_code` and are never joined back to a `City`.

use crate::api::ApiClient;
use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// One scrapeable location, as served by `GET /cities/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct City {
    /// Unique key, passed to the start request.
    pub code: String,
    pub name: String,
    pub state: String,
    /// Server-rendered label, e.g. `"Minneapolis, MN"`.
    #[serde(default)]
    pub display: Option<String>,
}

impl City {
    pub fn display_name(&self) -> String {
        self.display
            .clone()
            .unwrap_or_else(|| format!("{}, {}", self.name, self.state))
    }
}

#[derive(Default)]
pub struct CityCatalog {
    cities: Vec<City>,
    selected: HashSet<String>,
    loaded: bool,
}

impl CityCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the city list once; later calls are no-ops.
    pub fn load(&mut self, api: &ApiClient) -> Result<(), ApiError> {
        if self.loaded {
            return Ok(());
        }
        self.cities = api.list_cities()?;
        self.loaded = true;
        Ok(())
    }

    pub fn cities(&self) -> &[City] {
        &self.cities
    }

    /// States ascending; within a state, server order is preserved.
    pub fn by_state(&self) -> BTreeMap<&str, Vec<&City>> {
        let mut grouped: BTreeMap<&str, Vec<&City>> = BTreeMap::new();
        for city in &self.cities {
            grouped.entry(city.state.as_str()).or_default().push(city);
        }
        grouped
    }

    /// Flip one code in or out of the selection. Unknown codes are
    /// ignored so a stale saved selection cannot poison a start request.
    pub fn toggle(&mut self, code: &str) {
        if !self.cities.iter().any(|c| c.code == code) {
            return;
        }
        if !self.selected.remove(code) {
            self.selected.insert(code.to_string());
        }
    }

    pub fn select_all(&mut self) {
        self.selected = self.cities.iter().map(|c| c.code.clone()).collect();
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    pub fn is_selected(&self, code: &str) -> bool {
        self.selected.contains(code)
    }

    /// Selected codes in catalog order, ready for `JobController::start`.
    pub fn selected(&self) -> Vec<String> {
        self.cities
            .iter()
            .filter(|c| self.selected.contains(&c.code))
            .map(|c| c.code.clone())
            .collect()
    }
}
