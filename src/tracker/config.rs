use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::error::TrackerError;

pub const MIN_IDLE_THRESHOLD_MINUTES: u32 = 1;
pub const MAX_IDLE_THRESHOLD_MINUTES: u32 = 60;

/// Process-wide tracking policy. Loaded once at startup and mutated only through
/// [Tracker::configure](super::Tracker::configure).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub track_keyboard: bool,
    pub track_mouse: bool,
    pub idle_detection_enabled: bool,
    pub idle_threshold_minutes: u32,
    /// When true, keeping an idle interval requires a non-empty reason. Discarding never does.
    pub require_idle_reason: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            track_keyboard: true,
            track_mouse: true,
            idle_detection_enabled: true,
            idle_threshold_minutes: 5,
            require_idle_reason: true,
        }
    }
}

impl TrackerConfig {
    pub fn idle_threshold(&self) -> Duration {
        Duration::minutes(i64::from(self.idle_threshold_minutes))
    }

    /// Applies a patch, rejecting out-of-range thresholds without touching `self`.
    pub fn merged(&self, patch: &ConfigPatch) -> Result<Self, TrackerError> {
        if let Some(minutes) = patch.idle_threshold_minutes {
            if !(MIN_IDLE_THRESHOLD_MINUTES..=MAX_IDLE_THRESHOLD_MINUTES).contains(&minutes) {
                return Err(TrackerError::InvalidConfig(format!(
                    "idle threshold must be between {MIN_IDLE_THRESHOLD_MINUTES} and {MAX_IDLE_THRESHOLD_MINUTES} minutes, got {minutes}"
                )));
            }
        }

        let mut next = self.clone();
        if let Some(v) = patch.track_keyboard {
            next.track_keyboard = v;
        }
        if let Some(v) = patch.track_mouse {
            next.track_mouse = v;
        }
        if let Some(v) = patch.idle_detection_enabled {
            next.idle_detection_enabled = v;
        }
        if let Some(v) = patch.idle_threshold_minutes {
            next.idle_threshold_minutes = v;
        }
        if let Some(v) = patch.require_idle_reason {
            next.require_idle_reason = v;
        }
        Ok(next)
    }
}

/// Partial update for [TrackerConfig]. Absent fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigPatch {
    pub track_keyboard: Option<bool>,
    pub track_mouse: Option<bool>,
    pub idle_detection_enabled: Option<bool>,
    pub idle_threshold_minutes: Option<u32>,
    pub require_idle_reason: Option<bool>,
}
