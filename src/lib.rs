//! `aim_jira` polls Jira for incident tickets, normalizes their fields and
//! keeps the latest snapshot for metric export.

/// Shared snapshot of the last successful refresh.
pub mod cache;
/// Runtime configuration loading and validation.
pub mod config;
/// Prometheus text endpoint over the snapshot and counters.
pub mod exposition;
/// Raw and normalized issue models.
pub mod issue;
/// Jira REST client.
pub mod jira;
/// Logging helpers used throughout the crate.
pub mod logging;
/// Raw issue to normalized record mapping.
pub mod mapper;
/// Runtime metrics counters.
pub mod metrics;
/// JQL construction and paginated retrieval.
pub mod query;
/// Periodic refresh loop and cancellation.
pub mod scheduler;
