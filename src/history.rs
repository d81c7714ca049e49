//! # History — Read-Only View Over Past Runs
//!
//! Pages through the rows of `GET /scrape-history/`. No mutation, no
//! refresh loop; the CLI fetches once per invocation. Clamping rules
//! match the lead store's cursor.

use crate::api::RunRecord;

pub const HISTORY_PAGE_SIZE: usize = 10;

pub struct HistoryLog {
    runs: Vec<RunRecord>,
    page_size: usize,
}

impl HistoryLog {
    pub fn new(runs: Vec<RunRecord>) -> Self {
        Self::with_page_size(runs, HISTORY_PAGE_SIZE)
    }

    pub fn with_page_size(runs: Vec<RunRecord>, page_size: usize) -> Self {
        HistoryLog {
            runs,
            page_size: page_size.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn total_pages(&self) -> usize {
        self.runs.len().div_ceil(self.page_size)
    }

    /// Page `n` (1-based), clamped to the last page; page 1 when empty.
    pub fn page(&self, n: usize) -> &[RunRecord] {
        let page = n.clamp(1, self.total_pages().max(1));
        let start = (page - 1) * self.page_size;
        let end = (start + self.page_size).min(self.runs.len());
        if start >= self.runs.len() {
            &[]
        } else {
            &self.runs[start..end]
        }
    }
}
