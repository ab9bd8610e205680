use thiserror::Error;

/// Failures surfaced by the tracking facade. Every variant leaves in-memory state untouched, so
/// callers can always retry or render the message directly.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("already tracking time")]
    AlreadyTracking,
    #[error("no active time entry")]
    NoActiveEntry,
    #[error("an idle time decision is pending and must be resolved before stopping")]
    PendingIdleDecision,
    #[error("no idle time decision is pending")]
    NoPendingDecision,
    #[error("a reason is required to keep idle time")]
    ReasonRequired,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("storage failure: {0}")]
    Storage(#[source] anyhow::Error),
}
