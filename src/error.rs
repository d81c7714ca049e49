//! # Error Taxonomy
//!
//! Every network-facing operation returns `Result<T, ApiError>`. The four
//! variants are the complete set of failure classes the console
//! distinguishes:
//!
//! | Variant | Meaning | Recovery |
//! |---------|---------|----------|
//! | `Validation` | caller-side precondition failed, no request was sent | fix the input |
//! | `Transient` | the request never completed (timeout, refused, dropped) | retry; the poll loop retries automatically |
//! | `Auth` | server answered 401; the stored credential is gone | log in again |
//! | `Rejected` | server answered with any other 4xx/5xx | operator decision |
//!
//! The CLI boundary wraps these in `anyhow` for display; library callers
//! (`JobController`, `LeadStore`) branch on the variant.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// A precondition failed before any network call was made.
    #[error("{0}")]
    Validation(String),

    /// The request did not complete: connect timeout, connection refused,
    /// dropped mid-flight. The polling retry policy recovers these.
    #[error("network error: {0}")]
    Transient(String),

    /// The server answered 401. The local credential has already been
    /// cleared by the time this surfaces.
    #[error("authentication required — run `greymoon login`")]
    Auth,

    /// The server understood the request and refused it (4xx other than
    /// 401) or failed internally (5xx).
    #[error("server rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl ApiError {
    /// True for failures the poll loop swallows and retries.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Transient(_))
    }
}
