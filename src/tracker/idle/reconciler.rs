use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::detector::IdleTransition;
use crate::tracker::{entry::IdleInterval, error::TrackerError};

/// The unresolved question of whether a detected idle interval should count toward worked time.
/// Surfaced to the presentation layer; at most one exists at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdleDecisionRequest {
    #[serde(with = "chrono::serde::ts_seconds")]
    pub start: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub end: DateTime<Utc>,
    pub requires_reason: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Tracking,
    Idle {
        since: DateTime<Utc>,
    },
    AwaitingDecision {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Per-session state machine that freezes idle intervals and holds them until the user keeps or
/// discards them.
///
/// While a decision is pending, detector transitions keep flowing in but are ignored for
/// new-interval purposes. Rapid idle/active flapping therefore collapses into the one frozen
/// interval instead of producing overlapping ones.
#[derive(Debug)]
pub struct IdleReconciler {
    state: State,
}

impl Default for IdleReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl IdleReconciler {
    pub fn new() -> Self {
        Self {
            state: State::Tracking,
        }
    }

    pub fn is_awaiting_decision(&self) -> bool {
        matches!(self.state, State::AwaitingDecision { .. })
    }

    pub fn pending(&self, requires_reason: bool) -> Option<IdleDecisionRequest> {
        match self.state {
            State::AwaitingDecision { start, end } => Some(IdleDecisionRequest {
                start,
                end,
                requires_reason,
            }),
            _ => None,
        }
    }

    pub fn on_transition(&mut self, transition: IdleTransition) {
        match (self.state, transition) {
            (State::Tracking, IdleTransition::BecameIdle { since }) => {
                debug!(%since, "idle interval opened");
                self.state = State::Idle { since };
            }
            (State::Idle { since }, IdleTransition::BecameActive { at }) => {
                debug!(start = %since, end = %at, "idle interval frozen, awaiting decision");
                self.state = State::AwaitingDecision {
                    start: since,
                    end: at,
                };
            }
            // Everything else is ignored, most importantly any transition that arrives while a
            // decision is pending.
            _ => {}
        }
    }

    /// Resolves the pending interval into a record for the entry. On validation failure the
    /// request stays pending.
    pub fn resolve(
        &mut self,
        keep: bool,
        reason: Option<String>,
        requires_reason: bool,
    ) -> Result<IdleInterval, TrackerError> {
        let State::AwaitingDecision { start, end } = self.state else {
            return Err(TrackerError::NoPendingDecision);
        };

        let reason = reason.filter(|r| !r.trim().is_empty());
        if keep && requires_reason && reason.is_none() {
            return Err(TrackerError::ReasonRequired);
        }

        self.state = State::Tracking;
        Ok(IdleInterval {
            start,
            end,
            discarded: !keep,
            reason,
        })
    }

    /// Tears the machine down. Any unresolved interval is dropped without ever being recorded;
    /// this is the sanctioned behavior for session stop and for disabling idle detection
    /// mid-session.
    pub fn reset(&mut self) {
        match self.state {
            State::Tracking => {}
            State::Idle { since } => {
                warn!(%since, "dropping idle span without a frozen interval");
            }
            State::AwaitingDecision { start, end } => {
                warn!(%start, %end, "dropping unresolved idle interval");
            }
        }
        self.state = State::Tracking;
    }
}
