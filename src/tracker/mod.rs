//! The tracking core: one open time entry, a polling idle detector and the keep-or-discard
//! reconciliation of detected idle intervals. [Tracker] is the single public facade the
//! presentation layer talks to.

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    probe::{ActivityProbe, ActivityStatus},
    storage::EntryStore,
    utils::clock::Clock,
};

pub mod config;
pub mod entry;
pub mod error;
pub mod idle;
pub mod session;

use config::{ConfigPatch, TrackerConfig};
use entry::TimeEntry;
use error::TrackerError;
use idle::{detector::IdleDetector, reconciler::IdleReconciler};
use session::SessionManager;

pub use idle::reconciler::IdleDecisionRequest;

/// Cadence of the elapsed-time/status tick.
pub const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(1);
/// Cadence of activity probe sampling while a session is open.
pub const IDLE_SAMPLE_INTERVAL: Duration = Duration::from_secs(10);

/// What the presentation layer renders. Recomputed on every tick and on every state-changing
/// operation, published through a watch channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub is_tracking: bool,
    pub elapsed_seconds: i64,
    pub activity: Option<ActivityStatus>,
    pub pending_decision: Option<IdleDecisionRequest>,
}

/// Everything mutable behind the single lock. There is exactly one logical writer per
/// operation, so plain mutual exclusion is all the serialization the core needs.
struct TrackerCore {
    config: TrackerConfig,
    session: SessionManager,
    detector: IdleDetector,
    reconciler: IdleReconciler,
    last_activity: Option<ActivityStatus>,
    /// Cancellation handle of the per-session idle sampling loop, when armed.
    idle_loop: Option<CancellationToken>,
}

impl TrackerCore {
    fn snapshot(&self, now: chrono::DateTime<chrono::Utc>) -> StatusSnapshot {
        StatusSnapshot {
            is_tracking: self.session.is_tracking(),
            elapsed_seconds: self.session.elapsed_seconds(now),
            activity: self.last_activity,
            pending_decision: self.reconciler.pending(self.config.require_idle_reason),
        }
    }

    /// Applies one probe sample. `entry_id` is the session the sample was taken for; a sample
    /// that arrives after that entry closed is discarded.
    fn apply_sample(
        &mut self,
        entry_id: Uuid,
        status: ActivityStatus,
        now: chrono::DateTime<chrono::Utc>,
    ) {
        if !self.config.idle_detection_enabled {
            return;
        }
        // A tick already past its cancellation check can land here while stop or configure is
        // mid-flight; the taken token marks the loop as retired.
        if self.idle_loop.is_none() {
            return;
        }
        let Some(entry) = self.session.current() else {
            return;
        };
        if entry.id != entry_id {
            return;
        }

        self.last_activity = Some(status);
        let active = status.is_active(&self.config);
        if let Some(transition) = self.detector.observe(active, self.config.idle_threshold(), now)
        {
            self.reconciler.on_transition(transition);
        }
    }

    fn begin_session(&mut self, now: chrono::DateTime<chrono::Utc>) {
        self.detector = IdleDetector::new(now);
        self.reconciler = IdleReconciler::new();
        self.last_activity = None;
    }

    fn end_session(&mut self, now: chrono::DateTime<chrono::Utc>) {
        self.reconciler.reset();
        self.detector.reset(now);
        self.last_activity = None;
    }
}

/// Public facade wiring the session manager, idle detector and idle reconciler together.
///
/// The facade owns two timer loops: a 1 second snapshot tick running for the tracker's
/// lifetime, and a 10 second idle sampling loop armed per session. Both are scheduled through
/// the injected [Clock] and torn down through cancellation tokens, so stopping is an explicit
/// operation instead of a cleanup side effect.
pub struct Tracker {
    core: Arc<Mutex<TrackerCore>>,
    store: Arc<dyn EntryStore>,
    probe: Arc<Mutex<Box<dyn ActivityProbe>>>,
    clock: Arc<dyn Clock>,
    snapshot_tx: watch::Sender<StatusSnapshot>,
    shutdown: CancellationToken,
}

impl Tracker {
    /// Builds the tracker, loading persisted configuration and recovering an entry left open
    /// by an unclean shutdown. The snapshot loop starts immediately.
    pub async fn open(
        store: Arc<dyn EntryStore>,
        probe: Box<dyn ActivityProbe>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TrackerError> {
        let config = store
            .load_config()
            .await
            .map_err(TrackerError::Storage)?
            .unwrap_or_default();
        let recovered = store.get_open_entry().await.map_err(TrackerError::Storage)?;

        let now = clock.time();
        let core = TrackerCore {
            config,
            session: SessionManager::new(),
            detector: IdleDetector::new(now),
            reconciler: IdleReconciler::new(),
            last_activity: None,
            idle_loop: None,
        };
        let (snapshot_tx, _) = watch::channel(core.snapshot(now));

        let tracker = Self {
            core: Arc::new(Mutex::new(core)),
            store,
            probe: Arc::new(Mutex::new(probe)),
            clock,
            snapshot_tx,
            shutdown: CancellationToken::new(),
        };

        if let Some(entry) = recovered {
            info!(id = %entry.id, "recovered open entry from previous run");
            let entry_id = entry.id;
            let enabled = {
                let mut core = tracker.lock_core();
                core.session.resume(entry)?;
                core.config.idle_detection_enabled
            };
            if enabled {
                tracker.arm_idle_loop(entry_id);
            }
        }

        tracker.spawn_snapshot_loop();
        Ok(tracker)
    }

    fn lock_core(&self) -> MutexGuard<'_, TrackerCore> {
        self.core.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Merges a configuration patch, persists it and applies its side effects. Disabling idle
    /// detection mid-session drops any unresolved idle interval (observed behavior of the
    /// original tracker, kept deliberately); enabling it arms the sampling loop for the
    /// current session.
    pub async fn configure(&self, patch: ConfigPatch) -> Result<TrackerConfig, TrackerError> {
        let (next, was_enabled) = {
            let core = self.lock_core();
            let next = core.config.merged(&patch)?;
            (next, core.config.idle_detection_enabled)
        };

        self.store
            .save_config(&next)
            .await
            .map_err(TrackerError::Storage)?;

        let mut arm_for = None;
        {
            let mut core = self.lock_core();
            core.config = next.clone();
            if was_enabled && !next.idle_detection_enabled {
                if core.reconciler.is_awaiting_decision() {
                    warn!("idle detection disabled with a pending decision, interval dropped");
                }
                core.reconciler.reset();
                core.detector.reset(self.clock.time());
                if let Some(token) = core.idle_loop.take() {
                    token.cancel();
                }
            } else if !was_enabled && next.idle_detection_enabled {
                arm_for = core.session.current().map(|entry| entry.id);
            }
        }
        if let Some(entry_id) = arm_for {
            self.arm_idle_loop(entry_id);
        }

        self.publish_snapshot();
        Ok(next)
    }

    /// Opens a new time entry and, when idle detection is enabled, arms the sampling loop. The
    /// entry is fully created and persisted before the first sample can be processed.
    pub async fn start(&self, project_id: &str, task_id: &str) -> Result<TimeEntry, TrackerError> {
        let now = self.clock.time();
        let entry = {
            let mut core = self.lock_core();
            let entry = core.session.start(project_id, task_id, now)?;
            core.begin_session(now);
            entry
        };

        if let Err(e) = self.store.create_entry(&entry).await {
            self.lock_core().session.rollback_start(entry.id);
            return Err(TrackerError::Storage(e));
        }

        let enabled = self.lock_core().config.idle_detection_enabled;
        if enabled {
            self.arm_idle_loop(entry.id);
        }

        info!(id = %entry.id, project_id, task_id, "tracking started");
        self.publish_snapshot();
        Ok(entry)
    }

    /// Closes the current entry: cancels the sampling loop first so it cannot fire after the
    /// close, persists the settled entry, then commits. Refused while an idle decision is
    /// pending, which guarantees known idle intervals are never silently lost.
    pub async fn stop(&self) -> Result<TimeEntry, TrackerError> {
        let closed = {
            let mut core = self.lock_core();
            if core.reconciler.is_awaiting_decision() {
                return Err(TrackerError::PendingIdleDecision);
            }
            let closed = core.session.prepare_close(self.clock.time())?;
            if let Some(token) = core.idle_loop.take() {
                token.cancel();
            }
            closed
        };

        if let Err(e) = self.store.close_entry(&closed).await {
            // The entry stays open; re-arm sampling for it since the loop was already cancelled.
            if self.lock_core().config.idle_detection_enabled {
                self.arm_idle_loop(closed.id);
            }
            return Err(TrackerError::Storage(e));
        }

        {
            let mut core = self.lock_core();
            core.session.commit_close()?;
            core.end_session(self.clock.time());
        }

        info!(id = %closed.id, duration_secs = closed.duration_secs, "tracking stopped");
        self.publish_snapshot();
        Ok(closed)
    }

    /// Resolves the pending idle decision, appending the interval to the open entry.
    pub fn resolve_idle(&self, keep: bool, reason: Option<String>) -> Result<(), TrackerError> {
        {
            let mut core = self.lock_core();
            let requires_reason = core.config.require_idle_reason;
            let interval = core.reconciler.resolve(keep, reason, requires_reason)?;
            core.session.append_idle_interval(interval)?;
        }
        info!(keep, "idle time decision applied");
        self.publish_snapshot();
        Ok(())
    }

    pub fn config(&self) -> TrackerConfig {
        self.lock_core().config.clone()
    }

    pub fn current_entry(&self) -> Option<TimeEntry> {
        self.lock_core().session.current().cloned()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.lock_core().snapshot(self.clock.time())
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.snapshot_tx.subscribe()
    }

    fn publish_snapshot(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }

    fn spawn_snapshot_loop(&self) {
        let core = Arc::clone(&self.core);
        let clock = Arc::clone(&self.clock);
        let tx = self.snapshot_tx.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut tick = clock.instant();
            loop {
                tick += SNAPSHOT_INTERVAL;
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = clock.sleep_until(tick) => {}
                }
                let snapshot = {
                    let core = core.lock().unwrap_or_else(|e| e.into_inner());
                    core.snapshot(clock.time())
                };
                tx.send_replace(snapshot);
            }
        });
    }

    /// Spawns the idle sampling loop bound to `entry_id`. Probe failures skip the tick;
    /// detection degrades instead of halting tracking.
    fn arm_idle_loop(&self, entry_id: Uuid) {
        let token = self.shutdown.child_token();
        {
            let mut core = self.lock_core();
            if core.idle_loop.is_some() {
                return;
            }
            core.idle_loop = Some(token.clone());
        }

        let core = Arc::clone(&self.core);
        let probe = Arc::clone(&self.probe);
        let clock = Arc::clone(&self.clock);
        tokio::spawn(async move {
            let mut tick = clock.instant();
            loop {
                tick += IDLE_SAMPLE_INTERVAL;
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = clock.sleep_until(tick) => {}
                }

                let sampled = {
                    let mut probe = probe.lock().unwrap_or_else(|e| e.into_inner());
                    probe.sample()
                };
                match sampled {
                    Ok(status) => {
                        let mut core = core.lock().unwrap_or_else(|e| e.into_inner());
                        core.apply_sample(entry_id, status, clock.time());
                    }
                    Err(e) => {
                        warn!("Activity probe unavailable, skipping sample {e:?}");
                    }
                }
            }
        });
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tracker_tests {
    use std::{
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
    use tempfile::tempdir;
    use tokio::time::Instant;

    use super::{Tracker, IDLE_SAMPLE_INTERVAL};
    use crate::{
        probe::{ActivityStatus, MockActivityProbe},
        storage::{EntryStore, JsonEntryStore},
        tracker::{
            config::{ConfigPatch, TrackerConfig},
            entry::TimeEntry,
            error::TrackerError,
        },
        utils::{clock::Clock, logging::TEST_LOGGING},
    };

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), NaiveTime::MIN);

    #[derive(Clone)]
    struct TestClock {
        start_time: DateTime<Utc>,
        reference: Instant,
    }

    impl TestClock {
        fn new() -> Self {
            Self {
                start_time: Utc.from_utc_datetime(&TEST_START_DATE),
                reference: Instant::now(),
            }
        }
    }

    #[async_trait]
    impl Clock for TestClock {
        fn time(&self) -> DateTime<Utc> {
            self.start_time + self.reference.elapsed()
        }

        fn instant(&self) -> Instant {
            Instant::now()
        }

        async fn sleep(&self, duration: Duration) {
            tokio::time::sleep(duration).await;
        }

        async fn sleep_until(&self, instant: tokio::time::Instant) {
            tokio::time::sleep_until(instant).await;
        }
    }

    fn active() -> ActivityStatus {
        ActivityStatus {
            keyboard_active: true,
            mouse_active: true,
        }
    }

    fn inactive() -> ActivityStatus {
        ActivityStatus {
            keyboard_active: false,
            mouse_active: false,
        }
    }

    /// Probe whose samples are inactive for ticks in `idle_ticks`, active otherwise.
    fn scripted_probe(idle_ticks: std::ops::Range<usize>) -> MockActivityProbe {
        let mut probe = MockActivityProbe::new();
        let calls = AtomicUsize::new(0);
        probe.expect_sample().returning(move || {
            let tick = calls.fetch_add(1, Ordering::SeqCst);
            if idle_ticks.contains(&tick) {
                Ok(inactive())
            } else {
                Ok(active())
            }
        });
        probe
    }

    async fn open_tracker(
        dir: &std::path::Path,
        probe: MockActivityProbe,
    ) -> Result<(Tracker, Arc<JsonEntryStore>)> {
        let store = Arc::new(JsonEntryStore::new(dir.to_owned())?);
        let tracker = Tracker::open(
            Arc::clone(&store) as Arc<dyn EntryStore>,
            Box::new(probe),
            Arc::new(TestClock::new()),
        )
        .await?;
        Ok((tracker, store))
    }

    /// Store whose create/close operations can be made to fail on demand; everything else is
    /// delegated to a real file store.
    struct FlakyStore {
        inner: JsonEntryStore,
        fail_create: AtomicBool,
        fail_close: AtomicBool,
    }

    impl FlakyStore {
        fn new(dir: &std::path::Path) -> Result<Self> {
            Ok(Self {
                inner: JsonEntryStore::new(dir.to_owned())?,
                fail_create: AtomicBool::new(false),
                fail_close: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl EntryStore for FlakyStore {
        async fn create_entry(&self, entry: &TimeEntry) -> Result<()> {
            if self.fail_create.load(Ordering::SeqCst) {
                bail!("disk full");
            }
            self.inner.create_entry(entry).await
        }

        async fn close_entry(&self, entry: &TimeEntry) -> Result<()> {
            if self.fail_close.load(Ordering::SeqCst) {
                bail!("disk full");
            }
            self.inner.close_entry(entry).await
        }

        async fn get_open_entry(&self) -> Result<Option<TimeEntry>> {
            self.inner.get_open_entry().await
        }

        async fn load_config(&self) -> Result<Option<TrackerConfig>> {
            self.inner.load_config().await
        }

        async fn save_config(&self, config: &TrackerConfig) -> Result<()> {
            self.inner.save_config(config).await
        }
    }

    /// Full flow through the real loops: go idle past the threshold, come back, discard the
    /// interval, stop. Timers run on paused tokio time.
    #[tokio::test(start_paused = true)]
    async fn smoke_test_idle_reconciliation() -> Result<()> {
        *TEST_LOGGING;
        // Samples land at 10s, 20s, ... Ticks 0..=6 (10s..=70s) are inactive, so with a one
        // minute threshold the idle transition fires at 70s backdated to 10s, and the return
        // to activity lands at 80s.
        let probe = scripted_probe(0..7);
        let dir = tempdir()?;
        let (tracker, store) = open_tracker(dir.path(), probe).await?;

        tracker
            .configure(ConfigPatch {
                idle_threshold_minutes: Some(1),
                ..ConfigPatch::default()
            })
            .await?;

        let started = tracker.start("proj1", "task1").await?;
        assert!(tracker.snapshot().is_tracking);

        for _ in 0..9 {
            tokio::time::sleep(IDLE_SAMPLE_INTERVAL).await;
        }

        let snapshot = tracker.snapshot();
        let pending = snapshot.pending_decision.expect("decision should be pending");
        // Backdated to the first inactive sample, frozen at the return to activity
        assert_eq!((pending.end - pending.start).num_seconds(), 70);
        assert!(pending.start >= started.start_time + chrono::Duration::seconds(10));
        assert!(pending.requires_reason);

        // Stop is refused mid-decision
        assert!(matches!(
            tracker.stop().await,
            Err(TrackerError::PendingIdleDecision)
        ));

        tracker.resolve_idle(false, None)?;
        let closed = tracker.stop().await?;

        let elapsed = (closed.end_time.unwrap() - closed.start_time).num_seconds();
        assert_eq!(closed.duration_secs, Some(elapsed - 70));
        assert_eq!(closed.idle_intervals.len(), 1);
        assert!(closed.idle_intervals[0].discarded);

        let listed = store.list_entries().await?;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, closed.id);
        assert_eq!(listed[0].duration_secs, closed.duration_secs);
        assert_eq!(store.get_open_entry().await?, None);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn kept_idle_time_counts_toward_duration() -> Result<()> {
        *TEST_LOGGING;
        let probe = scripted_probe(0..7);
        let dir = tempdir()?;
        let (tracker, _store) = open_tracker(dir.path(), probe).await?;

        tracker
            .configure(ConfigPatch {
                idle_threshold_minutes: Some(1),
                ..ConfigPatch::default()
            })
            .await?;
        tracker.start("proj1", "task1").await?;

        for _ in 0..9 {
            tokio::time::sleep(IDLE_SAMPLE_INTERVAL).await;
        }
        assert!(tracker.snapshot().pending_decision.is_some());

        // require_idle_reason is on by default
        assert!(matches!(
            tracker.resolve_idle(true, None),
            Err(TrackerError::ReasonRequired)
        ));
        tracker.resolve_idle(true, Some("meeting".into()))?;

        // A second resolve has nothing left to act on
        assert!(matches!(
            tracker.resolve_idle(true, Some("meeting".into())),
            Err(TrackerError::NoPendingDecision)
        ));

        let closed = tracker.stop().await?;
        let elapsed = (closed.end_time.unwrap() - closed.start_time).num_seconds();
        assert_eq!(closed.duration_secs, Some(elapsed));
        assert_eq!(closed.idle_intervals[0].reason.as_deref(), Some("meeting"));
        assert!(!closed.idle_intervals[0].discarded);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn disabling_idle_detection_drops_pending_decision() -> Result<()> {
        *TEST_LOGGING;
        let probe = scripted_probe(0..7);
        let dir = tempdir()?;
        let (tracker, _store) = open_tracker(dir.path(), probe).await?;

        tracker
            .configure(ConfigPatch {
                idle_threshold_minutes: Some(1),
                ..ConfigPatch::default()
            })
            .await?;
        tracker.start("proj1", "task1").await?;

        for _ in 0..9 {
            tokio::time::sleep(IDLE_SAMPLE_INTERVAL).await;
        }
        assert!(tracker.snapshot().pending_decision.is_some());

        tracker
            .configure(ConfigPatch {
                idle_detection_enabled: Some(false),
                ..ConfigPatch::default()
            })
            .await?;

        // The pending interval is gone for good and stop succeeds
        assert!(tracker.snapshot().pending_decision.is_none());
        let closed = tracker.stop().await?;
        assert!(closed.idle_intervals.is_empty());
        let elapsed = (closed.end_time.unwrap() - closed.start_time).num_seconds();
        assert_eq!(closed.duration_secs, Some(elapsed));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn double_start_is_rejected() -> Result<()> {
        *TEST_LOGGING;
        let mut probe = MockActivityProbe::new();
        probe.expect_sample().returning(|| Ok(active()));
        let dir = tempdir()?;
        let (tracker, _store) = open_tracker(dir.path(), probe).await?;

        let first = tracker.start("proj1", "task1").await?;
        assert!(matches!(
            tracker.start("proj2", "task2").await,
            Err(TrackerError::AlreadyTracking)
        ));
        assert_eq!(tracker.current_entry().unwrap().id, first.id);

        tracker.stop().await?;
        assert!(matches!(
            tracker.stop().await,
            Err(TrackerError::NoActiveEntry)
        ));
        Ok(())
    }

    /// Store failures are all-or-nothing: a failed start leaves nothing tracking, a failed
    /// stop leaves the entry open, and the exact same operation succeeds on retry.
    #[tokio::test(start_paused = true)]
    async fn store_failures_leave_tracking_state_unchanged() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let store = Arc::new(FlakyStore::new(dir.path())?);
        let mut probe = MockActivityProbe::new();
        probe.expect_sample().returning(|| Ok(active()));
        let tracker = Tracker::open(
            Arc::clone(&store) as Arc<dyn EntryStore>,
            Box::new(probe),
            Arc::new(TestClock::new()),
        )
        .await?;

        store.fail_create.store(true, Ordering::SeqCst);
        assert!(matches!(
            tracker.start("proj1", "task1").await,
            Err(TrackerError::Storage(_))
        ));
        assert_eq!(tracker.current_entry(), None);
        assert!(!tracker.snapshot().is_tracking);

        store.fail_create.store(false, Ordering::SeqCst);
        let started = tracker.start("proj1", "task1").await?;

        store.fail_close.store(true, Ordering::SeqCst);
        assert!(matches!(
            tracker.stop().await,
            Err(TrackerError::Storage(_))
        ));
        let current = tracker.current_entry().expect("entry should stay open");
        assert_eq!(current.id, started.id);
        assert!(current.is_open());
        assert!(tracker.snapshot().is_tracking);

        store.fail_close.store(false, Ordering::SeqCst);
        let closed = tracker.stop().await?;
        assert_eq!(closed.id, started.id);
        assert_eq!(store.inner.get_open_entry().await?, None);
        assert_eq!(store.inner.list_entries().await?.len(), 1);
        Ok(())
    }

    /// A sample whose loop token was already taken by stop or configure must be a no-op, even
    /// though the entry it was taken for is still open.
    #[tokio::test(start_paused = true)]
    async fn sample_after_loop_retires_is_ignored() -> Result<()> {
        *TEST_LOGGING;
        let mut probe = MockActivityProbe::new();
        probe.expect_sample().returning(|| Ok(active()));
        let dir = tempdir()?;
        let (tracker, _store) = open_tracker(dir.path(), probe).await?;

        let started = tracker.start("proj1", "task1").await?;
        let now = Utc.from_utc_datetime(&TEST_START_DATE) + chrono::Duration::seconds(10);

        let mut core = tracker.core.lock().unwrap();
        let token = core.idle_loop.take().expect("loop should be armed");
        token.cancel();

        core.apply_sample(started.id, inactive(), now);
        assert_eq!(core.last_activity, None);
        assert!(core.session.is_tracking());

        // With the loop armed the identical sample does apply
        core.idle_loop = Some(tokio_util::sync::CancellationToken::new());
        core.apply_sample(started.id, inactive(), now);
        assert_eq!(core.last_activity, Some(inactive()));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn open_recovers_orphaned_entry() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let store = Arc::new(JsonEntryStore::new(dir.path().to_owned())?);

        let orphan = crate::tracker::entry::TimeEntry::new(
            "proj1".into(),
            "task1".into(),
            Utc.from_utc_datetime(&TEST_START_DATE),
        );
        store.create_entry(&orphan).await?;

        let mut probe = MockActivityProbe::new();
        probe.expect_sample().returning(|| Ok(active()));
        let tracker = Tracker::open(
            Arc::clone(&store) as Arc<dyn EntryStore>,
            Box::new(probe),
            Arc::new(TestClock::new()),
        )
        .await?;

        let current = tracker.current_entry().expect("entry should be resumed");
        assert_eq!(current.id, orphan.id);
        assert!(tracker.snapshot().is_tracking);

        let closed = tracker.stop().await?;
        assert_eq!(closed.id, orphan.id);
        assert_eq!(store.get_open_entry().await?, None);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_loop_reports_elapsed_time() -> Result<()> {
        *TEST_LOGGING;
        let mut probe = MockActivityProbe::new();
        probe.expect_sample().returning(|| Ok(active()));
        let dir = tempdir()?;
        let (tracker, _store) = open_tracker(dir.path(), probe).await?;

        let mut updates = tracker.subscribe();
        tracker.start("proj1", "task1").await?;

        tokio::time::sleep(Duration::from_secs(5)).await;
        updates.changed().await?;
        let snapshot = updates.borrow_and_update().clone();
        assert!(snapshot.is_tracking);
        assert!(snapshot.elapsed_seconds >= 1);

        tracker.stop().await?;
        tokio::time::sleep(Duration::from_secs(2)).await;
        let snapshot = tracker.snapshot();
        assert!(!snapshot.is_tracking);
        assert_eq!(snapshot.elapsed_seconds, 0);
        Ok(())
    }
}
