use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A sub-span of a time entry during which no qualifying input activity was observed, together
/// with the user's verdict on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdleInterval {
    #[serde(with = "chrono::serde::ts_seconds")]
    pub start: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub end: DateTime<Utc>,
    /// When true the span does not count towards the entry's final duration.
    pub discarded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl IdleInterval {
    pub fn seconds(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }
}

/// One recorded start-to-stop work interval tied to a project/task. At most one entry is open
/// (no `end_time`) at any moment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: Uuid,
    pub project_id: String,
    pub task_id: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub start_time: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub end_time: Option<DateTime<Utc>>,
    /// Final duration in seconds, settled at close: wall-clock elapsed minus every discarded
    /// idle interval.
    pub duration_secs: Option<i64>,
    #[serde(default)]
    pub idle_intervals: Vec<IdleInterval>,
}

impl TimeEntry {
    pub fn new(project_id: String, task_id: String, start_time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            task_id,
            start_time,
            end_time: None,
            duration_secs: None,
            idle_intervals: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    pub fn discarded_idle_seconds(&self) -> i64 {
        self.idle_intervals
            .iter()
            .filter(|interval| interval.discarded)
            .map(IdleInterval::seconds)
            .sum()
    }

    /// Produces the closed version of this entry. Idle accounting happens here and only here,
    /// so a live elapsed display never dips backwards.
    pub fn into_closed(mut self, end_time: DateTime<Utc>) -> Self {
        let elapsed = (end_time - self.start_time).num_seconds();
        self.duration_secs = Some(elapsed - self.discarded_idle_seconds());
        self.end_time = Some(end_time);
        self
    }
}
