use chrono::{DateTime, Duration, Utc};
use tracing::debug;

/// A state change reported by the [IdleDetector]. Transitions are delivered as events rather
/// than flags so the reconciler never misses one between polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleTransition {
    /// Inactivity crossed the threshold. `since` is backdated to the first sample without
    /// input, so the idle interval covers the whole quiet span.
    BecameIdle { since: DateTime<Utc> },
    BecameActive { at: DateTime<Utc> },
}

/// Watches the stream of activity samples and turns threshold crossings into
/// [IdleTransition] events. Starts out assuming the user is active.
#[derive(Debug)]
pub struct IdleDetector {
    idle: bool,
    inactive_since: Option<DateTime<Utc>>,
    state_changed_at: DateTime<Utc>,
}

impl IdleDetector {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            idle: false,
            inactive_since: None,
            state_changed_at: start,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.idle
    }

    pub fn state_changed_at(&self) -> DateTime<Utc> {
        self.state_changed_at
    }

    /// Feeds one poll sample into the detector. `active` is the probe sample after the
    /// per-channel tracking flags were applied.
    pub fn observe(
        &mut self,
        active: bool,
        threshold: Duration,
        now: DateTime<Utc>,
    ) -> Option<IdleTransition> {
        if active {
            self.inactive_since = None;
            if self.idle {
                self.idle = false;
                self.state_changed_at = now;
                debug!(%now, "user became active after being idle");
                return Some(IdleTransition::BecameActive { at: now });
            }
            return None;
        }

        match self.inactive_since {
            None => {
                self.inactive_since = Some(now);
                None
            }
            Some(since) if !self.idle && now - since >= threshold => {
                self.idle = true;
                self.state_changed_at = now;
                debug!(%since, "inactivity crossed idle threshold");
                Some(IdleTransition::BecameIdle { since })
            }
            Some(_) => None,
        }
    }

    /// Forgets any in-flight inactivity. Used at session teardown and when idle detection gets
    /// disabled mid-session.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.idle = false;
        self.inactive_since = None;
        self.state_changed_at = now;
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

    use super::{IdleDetector, IdleTransition};

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), NaiveTime::MIN);
    const THRESHOLD: Duration = Duration::minutes(1);

    fn start() -> chrono::DateTime<Utc> {
        Utc.from_utc_datetime(&TEST_START_DATE)
    }

    #[test]
    fn idle_start_backdates_to_first_inactive_sample() {
        let mut detector = IdleDetector::new(start());

        assert_eq!(detector.observe(false, THRESHOLD, start()), None);
        assert_eq!(
            detector.observe(false, THRESHOLD, start() + Duration::seconds(30)),
            None
        );
        assert_eq!(
            detector.observe(false, THRESHOLD, start() + Duration::seconds(60)),
            Some(IdleTransition::BecameIdle { since: start() })
        );
        assert!(detector.is_idle());
    }

    #[test]
    fn no_duplicate_idle_transition_while_idle() {
        let mut detector = IdleDetector::new(start());
        detector.observe(false, THRESHOLD, start());
        detector.observe(false, THRESHOLD, start() + Duration::seconds(60));

        assert_eq!(
            detector.observe(false, THRESHOLD, start() + Duration::seconds(120)),
            None
        );
    }

    #[test]
    fn activity_below_threshold_never_reports() {
        let mut detector = IdleDetector::new(start());
        detector.observe(false, THRESHOLD, start());
        // User came back before the threshold, never having been marked idle
        assert_eq!(
            detector.observe(true, THRESHOLD, start() + Duration::seconds(30)),
            None
        );
        // The quiet span counter restarted
        detector.observe(false, THRESHOLD, start() + Duration::seconds(40));
        assert_eq!(
            detector.observe(false, THRESHOLD, start() + Duration::seconds(80)),
            None
        );
    }

    #[test]
    fn active_sample_while_idle_reports_became_active() {
        let mut detector = IdleDetector::new(start());
        detector.observe(false, THRESHOLD, start());
        detector.observe(false, THRESHOLD, start() + Duration::seconds(60));

        let at = start() + Duration::seconds(90);
        assert_eq!(
            detector.observe(true, THRESHOLD, at),
            Some(IdleTransition::BecameActive { at })
        );
        assert!(!detector.is_idle());
        assert_eq!(detector.state_changed_at(), at);
    }

    #[test]
    fn reset_clears_in_flight_inactivity() {
        let mut detector = IdleDetector::new(start());
        detector.observe(false, THRESHOLD, start());
        detector.reset(start() + Duration::seconds(30));

        detector.observe(false, THRESHOLD, start() + Duration::seconds(40));
        assert_eq!(
            detector.observe(false, THRESHOLD, start() + Duration::seconds(90)),
            None
        );
        assert_eq!(
            detector.observe(false, THRESHOLD, start() + Duration::seconds(100)),
            Some(IdleTransition::BecameIdle {
                since: start() + Duration::seconds(40)
            })
        );
    }
}
