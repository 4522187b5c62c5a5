//! Interval-aligned refresh scheduling.
//!
//! Fetches are aligned to wall-clock 5-minute boundaries rather than to
//! process start, so every client refreshes against the same interval grid.
//! The pure decision layer ([`SyncState`], boundary arithmetic, delta
//! counting) is separated from the tokio driver ([`Scheduler`]) that arms
//! the timers.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{broadcast, watch};
use tokio::time::{interval_at, sleep, Instant};

use crate::client::FeedSource;
use crate::filters::FilterState;
use crate::models::{Envelope, FeedMetadata, Quake};

/// Width of the refresh grid in seconds.
pub const REFRESH_INTERVAL_SECS: i64 = 300;

/// The same width as a std duration, for timer arming.
pub const REFRESH_PERIOD: Duration = Duration::from_secs(REFRESH_INTERVAL_SECS as u64);

const UPDATE_CHANNEL_CAPACITY: usize = 100;

/// Floor of `now` to the 5-minute grid, sub-minute components zeroed.
#[must_use]
pub fn current_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
    let secs = now.timestamp();
    let floored = secs - secs.rem_euclid(REFRESH_INTERVAL_SECS);
    DateTime::from_timestamp(floored, 0).unwrap_or(now)
}

/// Ceiling of `now` to the 5-minute grid, always strictly in the future.
///
/// When `now` sits exactly on a mark the ceiling equals `now`, so one full
/// interval is added to keep the result ahead of it.
#[must_use]
pub fn next_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
    let floor = current_boundary(now);
    let ceil = if floor == now {
        floor
    } else {
        floor + TimeDelta::seconds(REFRESH_INTERVAL_SECS)
    };
    if ceil <= now {
        ceil + TimeDelta::seconds(REFRESH_INTERVAL_SECS)
    } else {
        ceil
    }
}

/// The interval an instant falls in and the deadline of the one after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshWindow {
    pub current: DateTime<Utc>,
    pub next: DateTime<Utc>,
}

impl RefreshWindow {
    #[must_use]
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            current: current_boundary(now),
            next: next_boundary(now),
        }
    }
}

/// Count incoming events whose `earthquake_id` is not in `previous`.
///
/// The lookup set is built once per call. An empty `previous` yields 0: a
/// first load has nothing to be "new" relative to.
#[must_use]
pub fn count_new_events(previous: &[Quake], incoming: &[Quake]) -> usize {
    if previous.is_empty() {
        return 0;
    }
    let seen: HashSet<&str> = previous.iter().map(|q| q.earthquake_id.as_str()).collect();
    incoming
        .iter()
        .filter(|q| !seen.contains(q.earthquake_id.as_str()))
        .count()
}

/// The most recently accepted feed state.
///
/// Owned by the scheduler and replaced wholesale on each successful fetch;
/// consumers only ever see it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub events: Vec<Quake>,
    pub metadata: FeedMetadata,
    pub dropped: usize,
    /// Grid interval the fetch was performed for
    pub interval: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
}

/// Result of accepting one successful fetch.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub snapshot: Arc<Snapshot>,
    /// Events not present in the previous snapshot (empty on first load)
    pub fresh: Vec<Quake>,
    pub first_load: bool,
}

impl RefreshOutcome {
    #[must_use]
    pub fn new_events(&self) -> usize {
        self.fresh.len()
    }
}

/// Pure refresh/caching decisions, no I/O.
#[derive(Debug, Default)]
pub struct SyncState {
    last_interval: Option<DateTime<Utc>>,
    snapshot: Option<Arc<Snapshot>>,
}

impl SyncState {
    /// Whether a fetch is due at `now`.
    ///
    /// True when nothing was fetched yet, when `now` has crossed into a
    /// later interval than the last successful fetch, or whenever any
    /// filter criterion is active (filtered queries bypass the cache).
    #[must_use]
    pub fn should_refresh(&self, filters: &FilterState, now: DateTime<Utc>) -> bool {
        if filters.is_active() {
            return true;
        }
        match self.last_interval {
            None => true,
            Some(last) => current_boundary(now) > last,
        }
    }

    /// Accept a successful fetch, replacing the snapshot and recording the
    /// interval marker. Failures never reach this point.
    pub fn accept(&mut self, envelope: Envelope, now: DateTime<Utc>) -> RefreshOutcome {
        let first_load = self.snapshot.is_none();
        let fresh = match self.snapshot.as_deref() {
            None => Vec::new(),
            Some(prev) if prev.events.is_empty() => Vec::new(),
            Some(prev) => {
                let seen: HashSet<&str> = prev
                    .events
                    .iter()
                    .map(|q| q.earthquake_id.as_str())
                    .collect();
                envelope
                    .events
                    .iter()
                    .filter(|q| !seen.contains(q.earthquake_id.as_str()))
                    .cloned()
                    .collect()
            }
        };

        let snapshot = Arc::new(Snapshot {
            events: envelope.events,
            metadata: envelope.metadata,
            dropped: envelope.dropped,
            interval: current_boundary(now),
            fetched_at: now,
        });
        self.last_interval = Some(snapshot.interval);
        self.snapshot = Some(Arc::clone(&snapshot));
        RefreshOutcome {
            snapshot,
            fresh,
            first_load,
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<&Arc<Snapshot>> {
        self.snapshot.as_ref()
    }
}

/// Driver lifecycle, published on a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Initial fetch done or in flight; one-shot armed for the next boundary
    ArmedOneShot,
    /// Fixed 5-minute cadence
    ArmedPeriodic,
    Stopped,
}

/// One scheduler cycle's outcome, broadcast to consumers.
#[derive(Debug, Clone)]
pub enum SyncUpdate {
    Refreshed {
        snapshot: Arc<Snapshot>,
        fresh: Vec<Quake>,
        first_load: bool,
        window: RefreshWindow,
    },
    /// The interval was already fetched; cached snapshot still current
    Skipped { window: RefreshWindow },
    Failed { error: String, window: RefreshWindow },
}

/// Async driver: immediate fetch, one-shot to the next grid boundary, then
/// a fixed 5-minute period. At most one fetch is ever in flight because the
/// single driver task awaits each fetch before re-arming.
pub struct Scheduler {
    source: Arc<dyn FeedSource + Send + Sync>,
    filters: FilterState,
    state: SyncState,
    shutdown: watch::Receiver<bool>,
    phase_tx: watch::Sender<Phase>,
    snapshot_tx: watch::Sender<Option<Arc<Snapshot>>>,
    updates_tx: broadcast::Sender<SyncUpdate>,
}

/// Consumer endpoint for a running [`Scheduler`].
///
/// Dropping the handle disposes the scheduler.
pub struct ScheduleHandle {
    shutdown_tx: watch::Sender<bool>,
    phase_rx: watch::Receiver<Phase>,
    snapshot_rx: watch::Receiver<Option<Arc<Snapshot>>>,
    updates_tx: broadcast::Sender<SyncUpdate>,
}

impl Scheduler {
    #[must_use]
    pub fn new(
        source: Arc<dyn FeedSource + Send + Sync>,
        filters: FilterState,
    ) -> (Self, ScheduleHandle) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (phase_tx, phase_rx) = watch::channel(Phase::ArmedOneShot);
        let (snapshot_tx, snapshot_rx) = watch::channel(None);
        let (updates_tx, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);

        let scheduler = Self {
            source,
            filters,
            state: SyncState::default(),
            shutdown: shutdown_rx,
            phase_tx,
            snapshot_tx,
            updates_tx: updates_tx.clone(),
        };
        let handle = ScheduleHandle {
            shutdown_tx,
            phase_rx,
            snapshot_rx,
            updates_tx,
        };
        (scheduler, handle)
    }

    /// Run until disposed. Terminal in the `Stopped` phase.
    pub async fn run(mut self) {
        self.arm_and_poll().await;
        let _ = self.phase_tx.send(Phase::Stopped);
        tracing::debug!("scheduler stopped");
    }

    async fn arm_and_poll(&mut self) {
        if !self.cycle().await {
            return;
        }

        let now = Utc::now();
        let deadline = next_boundary(now);
        let delay = (deadline - now).to_std().unwrap_or(Duration::ZERO);
        tracing::debug!(deadline = %deadline, "one-shot armed for next boundary");
        tokio::select! {
            _ = self.shutdown.changed() => return,
            () = sleep(delay) => {}
        }
        if !self.cycle().await {
            return;
        }

        let _ = self.phase_tx.send(Phase::ArmedPeriodic);
        tracing::debug!("periodic refresh armed");
        let mut ticker = interval_at(Instant::now() + REFRESH_PERIOD, REFRESH_PERIOD);
        loop {
            tokio::select! {
                _ = self.shutdown.changed() => return,
                _ = ticker.tick() => {
                    if !self.cycle().await {
                        return;
                    }
                }
            }
        }
    }

    /// One gated fetch cycle. Returns false when shutdown was observed
    /// mid-fetch; the in-flight result is dropped, never applied.
    async fn cycle(&mut self) -> bool {
        let now = Utc::now();
        let window = RefreshWindow::at(now);
        if !self.state.should_refresh(&self.filters, now) {
            tracing::debug!(interval = %window.current, "interval already fetched, snapshot still current");
            let _ = self.updates_tx.send(SyncUpdate::Skipped { window });
            return true;
        }

        let plan = self.filters.plan();
        let result = tokio::select! {
            _ = self.shutdown.changed() => return false,
            result = self.source.fetch(&plan) => result,
        };
        match result {
            Ok(envelope) => {
                let outcome = self.state.accept(envelope, now);
                let _ = self.snapshot_tx.send(Some(Arc::clone(&outcome.snapshot)));
                tracing::info!(
                    events = outcome.snapshot.events.len(),
                    new = outcome.new_events(),
                    dropped = outcome.snapshot.dropped,
                    "snapshot refreshed"
                );
                let _ = self.updates_tx.send(SyncUpdate::Refreshed {
                    snapshot: outcome.snapshot,
                    fresh: outcome.fresh,
                    first_load: outcome.first_load,
                    window,
                });
            }
            Err(err) => {
                tracing::warn!(error = %err, "fetch failed, keeping previous snapshot");
                let _ = self.updates_tx.send(SyncUpdate::Failed {
                    error: err.to_string(),
                    window,
                });
            }
        }
        true
    }
}

impl ScheduleHandle {
    /// Stop the scheduler. Idempotent; pending timers are cancelled and an
    /// in-flight fetch result is discarded.
    pub fn dispose(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        *self.phase_rx.borrow()
    }

    /// Subscribe to per-cycle updates.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncUpdate> {
        self.updates_tx.subscribe()
    }

    /// Watch the current snapshot.
    #[must_use]
    pub fn snapshots(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.snapshot_rx.clone()
    }

    /// The current snapshot, if any fetch has succeeded yet.
    #[must_use]
    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.snapshot_rx.borrow().clone()
    }
}

impl Drop for ScheduleHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::TimeZone;

    use crate::errors::QuakewatchError;
    use crate::filters::QueryPlan;
    use crate::models::test_quake;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 12, h, m, s).unwrap()
    }

    fn envelope(events: Vec<Quake>) -> Envelope {
        let total = events.len() as u64;
        Envelope {
            events,
            metadata: FeedMetadata {
                date_starts: "2025-03-11 10:00:00".to_owned(),
                date_ends: "2025-03-12 10:00:00".to_owned(),
                total,
            },
            dropped: 0,
        }
    }

    fn filtered_state() -> FilterState {
        FilterState {
            min_magnitude: 1.0,
            ..FilterState::default()
        }
    }

    enum Script {
        Deliver(Vec<Quake>),
        Fail(&'static str),
        Hang,
    }

    struct ScriptedSource {
        calls: AtomicUsize,
        script: Mutex<VecDeque<Script>>,
        hang_reached: tokio::sync::Notify,
    }

    impl ScriptedSource {
        fn new(script: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                script: Mutex::new(script.into()),
                hang_reached: tokio::sync::Notify::new(),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FeedSource for ScriptedSource {
        async fn fetch(&self, _plan: &QueryPlan) -> Result<Envelope, QuakewatchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self.script.lock().unwrap().pop_front();
            match step {
                None => Ok(envelope(Vec::new())),
                Some(Script::Deliver(events)) => Ok(envelope(events)),
                Some(Script::Fail(msg)) => Err(QuakewatchError::InvalidResponse(msg.into())),
                Some(Script::Hang) => {
                    self.hang_reached.notify_one();
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }
    }

    #[test]
    fn test_current_boundary_floors_to_grid() {
        assert_eq!(current_boundary(at(10, 7, 33)), at(10, 5, 0));
        assert_eq!(current_boundary(at(10, 5, 0)), at(10, 5, 0));
        assert_eq!(current_boundary(at(10, 0, 1)), at(10, 0, 0));
        assert_eq!(current_boundary(at(10, 59, 59)), at(10, 55, 0));
    }

    #[test]
    fn test_next_boundary_is_strictly_future() {
        assert_eq!(next_boundary(at(10, 7, 33)), at(10, 10, 0));
        // exactly on a mark: the ceiling equals now, so a full interval is added
        assert_eq!(next_boundary(at(10, 5, 0)), at(10, 10, 0));
        assert_eq!(next_boundary(at(10, 59, 59)), at(11, 0, 0));
    }

    #[test]
    fn test_window_ordering_holds() {
        for (h, m, s) in [(0, 0, 0), (9, 4, 59), (10, 5, 0), (23, 57, 12)] {
            let now = at(h, m, s);
            let window = RefreshWindow::at(now);
            assert!(window.current <= now, "floor above now at {now}");
            assert!(window.next > now, "deadline not in the future at {now}");
            assert_eq!(
                window.current.timestamp().rem_euclid(REFRESH_INTERVAL_SECS),
                0
            );
        }
        // on a mark the two bounds span exactly one interval
        let window = RefreshWindow::at(at(10, 5, 0));
        assert_eq!(
            (window.next - window.current).num_seconds(),
            REFRESH_INTERVAL_SECS
        );
    }

    #[test]
    fn test_count_new_events_rules() {
        let a = test_quake("a", 2.0, 5.0, "2025-03-12 08:00:00");
        let b = test_quake("b", 3.0, 6.0, "2025-03-12 08:10:00");
        let c = test_quake("c", 4.0, 7.0, "2025-03-12 08:20:00");

        assert_eq!(count_new_events(&[], std::slice::from_ref(&a)), 0);
        assert_eq!(count_new_events(&[a.clone(), b.clone()], &[a.clone(), b.clone()]), 0);
        assert_eq!(count_new_events(&[a.clone(), b.clone()], &[a, b, c]), 1);
    }

    #[test]
    fn test_should_refresh_policy() {
        let mut state = SyncState::default();
        let unfiltered = FilterState::default();
        let now = at(10, 6, 0);

        // nothing fetched yet
        assert!(state.should_refresh(&unfiltered, now));
        assert!(state.should_refresh(&filtered_state(), now));

        state.accept(envelope(Vec::new()), now);
        // same interval is a cache hit
        assert!(!state.should_refresh(&unfiltered, now));
        assert!(!state.should_refresh(&unfiltered, at(10, 9, 59)));
        // next interval is due again
        assert!(state.should_refresh(&unfiltered, at(10, 10, 0)));
        // active filters always bypass the cache
        assert!(state.should_refresh(&filtered_state(), now));
    }

    #[test]
    fn test_accept_tracks_delta_and_first_load() {
        let mut state = SyncState::default();
        let a = test_quake("a", 2.0, 5.0, "2025-03-12 08:00:00");
        let b = test_quake("b", 3.0, 6.0, "2025-03-12 08:10:00");

        let first = state.accept(envelope(vec![a.clone()]), at(10, 6, 0));
        assert!(first.first_load);
        assert_eq!(first.new_events(), 0);
        assert_eq!(first.snapshot.interval, at(10, 5, 0));

        let second = state.accept(envelope(vec![a.clone(), b.clone()]), at(10, 11, 0));
        assert!(!second.first_load);
        assert_eq!(second.new_events(), 1);
        assert_eq!(second.fresh[0].id, "b");
        assert_eq!(
            second.new_events(),
            count_new_events(&[a], &second.snapshot.events)
        );
        assert_eq!(state.snapshot().unwrap().events.len(), 2);
    }

    #[test]
    fn test_accept_after_empty_snapshot_reports_no_delta() {
        let mut state = SyncState::default();
        state.accept(envelope(Vec::new()), at(10, 6, 0));

        let b = test_quake("b", 3.0, 6.0, "2025-03-12 08:10:00");
        let outcome = state.accept(envelope(vec![b]), at(10, 11, 0));
        assert!(!outcome.first_load);
        assert_eq!(outcome.new_events(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_fetches_immediately_then_per_tick() {
        let source = ScriptedSource::new(Vec::new());
        let (scheduler, handle) = Scheduler::new(source.clone(), filtered_state());
        let mut updates = handle.subscribe();
        assert_eq!(handle.phase(), Phase::ArmedOneShot);

        let task = tokio::spawn(scheduler.run());
        for _ in 0..3 {
            match updates.recv().await.expect("update") {
                SyncUpdate::Refreshed { .. } => {}
                other => panic!("expected refresh, got {other:?}"),
            }
        }
        assert!(source.calls() >= 3);
        assert_eq!(handle.phase(), Phase::ArmedPeriodic);

        handle.dispose();
        task.await.expect("driver task");
        assert_eq!(handle.phase(), Phase::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_serves_cache_within_interval() {
        let source = ScriptedSource::new(Vec::new());
        let (scheduler, handle) = Scheduler::new(source.clone(), FilterState::default());
        let mut updates = handle.subscribe();

        let task = tokio::spawn(scheduler.run());
        assert!(matches!(
            updates.recv().await.expect("update"),
            SyncUpdate::Refreshed { first_load: true, .. }
        ));

        // The one-shot fires after five paused-clock minutes while the wall
        // clock barely moves, so the cycle normally lands in the same
        // interval; a real boundary can still slip in between cycles.
        match updates.recv().await.expect("update") {
            SyncUpdate::Skipped { .. } => assert_eq!(source.calls(), 1),
            SyncUpdate::Refreshed { .. } => assert_eq!(source.calls(), 2),
            SyncUpdate::Failed { error, .. } => panic!("unexpected failure: {error}"),
        }

        handle.dispose();
        task.await.expect("driver task");
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_failure_keeps_previous_snapshot() {
        let a = test_quake("a", 2.0, 5.0, "2025-03-12 08:00:00");
        let source = ScriptedSource::new(vec![
            Script::Deliver(vec![a.clone()]),
            Script::Fail("boom"),
            Script::Deliver(vec![a]),
        ]);
        let (scheduler, handle) = Scheduler::new(source.clone(), filtered_state());
        let mut updates = handle.subscribe();

        let task = tokio::spawn(scheduler.run());
        assert!(matches!(
            updates.recv().await.expect("update"),
            SyncUpdate::Refreshed { .. }
        ));
        match updates.recv().await.expect("update") {
            SyncUpdate::Failed { error, .. } => assert!(error.contains("boom")),
            other => panic!("expected failure, got {other:?}"),
        }
        // previous snapshot survived the failed cycle
        let snapshot = handle.latest().expect("snapshot");
        assert_eq!(snapshot.events.len(), 1);

        // and the schedule kept running
        assert!(matches!(
            updates.recv().await.expect("update"),
            SyncUpdate::Refreshed { .. }
        ));
        assert_eq!(source.calls(), 3);

        handle.dispose();
        task.await.expect("driver task");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_discards_in_flight_fetch() {
        let a = test_quake("a", 2.0, 5.0, "2025-03-12 08:00:00");
        let source = ScriptedSource::new(vec![Script::Deliver(vec![a]), Script::Hang]);
        let (scheduler, handle) = Scheduler::new(source.clone(), filtered_state());
        let mut updates = handle.subscribe();

        let task = tokio::spawn(scheduler.run());
        assert!(matches!(
            updates.recv().await.expect("update"),
            SyncUpdate::Refreshed { .. }
        ));

        // wait until the hanging second fetch is actually in flight
        source.hang_reached.notified().await;
        assert_eq!(source.calls(), 2);
        handle.dispose();
        handle.dispose();
        task.await.expect("driver task");

        assert_eq!(handle.phase(), Phase::Stopped);
        // the hung fetch was dropped without touching the snapshot
        assert_eq!(handle.latest().expect("snapshot").events.len(), 1);
        assert!(matches!(
            updates.try_recv(),
            Err(broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed)
        ));

        // timers are gone; nothing fires afterwards
        tokio::time::advance(Duration::from_secs(1800)).await;
        assert_eq!(source.calls(), 2);
    }
}
