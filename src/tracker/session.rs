use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use super::{
    entry::{IdleInterval, TimeEntry},
    error::TrackerError,
};

/// Owns the single open [TimeEntry], or none. All timestamps are passed in explicitly so the
/// manager itself stays deterministic; the orchestrator supplies clock readings.
///
/// Closing is split into `prepare_close`/`commit_close` so that the caller can persist the
/// closed entry between the two phases. A storage failure then leaves the entry open instead of
/// silently losing it.
#[derive(Debug, Default)]
pub struct SessionManager {
    current: Option<TimeEntry>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_tracking(&self) -> bool {
        self.current.is_some()
    }

    pub fn current(&self) -> Option<&TimeEntry> {
        self.current.as_ref()
    }

    /// Opens a new entry, becoming the current one.
    pub fn start(
        &mut self,
        project_id: &str,
        task_id: &str,
        now: DateTime<Utc>,
    ) -> Result<TimeEntry, TrackerError> {
        if self.current.is_some() {
            return Err(TrackerError::AlreadyTracking);
        }
        let entry = TimeEntry::new(project_id.to_owned(), task_id.to_owned(), now);
        debug!(id = %entry.id, project_id, task_id, "opened time entry");
        self.current = Some(entry.clone());
        Ok(entry)
    }

    /// Undoes a `start` whose persistence failed. A no-op unless `id` still is the current
    /// entry.
    pub fn rollback_start(&mut self, id: Uuid) {
        if self.current.as_ref().is_some_and(|entry| entry.id == id) {
            debug!(%id, "rolling back unpersisted time entry");
            self.current = None;
        }
    }

    /// Adopts an entry recovered from storage after an unclean shutdown.
    pub fn resume(&mut self, entry: TimeEntry) -> Result<(), TrackerError> {
        if self.current.is_some() {
            return Err(TrackerError::AlreadyTracking);
        }
        debug!(id = %entry.id, "resuming open time entry");
        self.current = Some(entry);
        Ok(())
    }

    /// Computes the closed version of the current entry without mutating anything.
    pub fn prepare_close(&self, now: DateTime<Utc>) -> Result<TimeEntry, TrackerError> {
        let entry = self.current.clone().ok_or(TrackerError::NoActiveEntry)?;
        Ok(entry.into_closed(now))
    }

    /// Clears the current entry once its closed version has been persisted.
    pub fn commit_close(&mut self) -> Result<(), TrackerError> {
        match self.current.take() {
            Some(entry) => {
                debug!(id = %entry.id, "closed time entry");
                Ok(())
            }
            None => Err(TrackerError::NoActiveEntry),
        }
    }

    /// Live wall-clock elapsed time. Idle time is never subtracted here; the discount is a
    /// settlement applied at close so the running display never dips backwards.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> i64 {
        self.current
            .as_ref()
            .map_or(0, |entry| (now - entry.start_time).num_seconds())
    }

    /// The only mutation path for idle intervals, driven by the orchestrator after a decision
    /// resolves.
    pub fn append_idle_interval(&mut self, interval: IdleInterval) -> Result<(), TrackerError> {
        let entry = self.current.as_mut().ok_or(TrackerError::NoActiveEntry)?;
        entry.idle_intervals.push(interval);
        Ok(())
    }
}
