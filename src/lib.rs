//! # greymoon — Operator Console for the Lead-Collection Platform
//!
//! Client library behind the `greymoon` binary. Two pieces carry the real
//! state: [`job::JobController`] owns the lifecycle of the active
//! collection run (start, authoritative polling, optimistic cancel), and
//! [`leads::LeadStore`] owns the fetched record set with its compound
//! filters, aggregates and pagination. Everything else — session tokens,
//! the REST surface, the city catalog, run history — is thin glue around
//! those two.

pub mod api;
pub mod catalog;
pub mod error;
pub mod history;
pub mod job;
pub mod leads;
pub mod session;
