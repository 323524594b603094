// Generic live-state reconciliation engine.
//
// One instance per feature module (events, wvw, commerce, tasks). Each
// instance owns its view state, its cycle lock and its refresh loop; the
// concrete domain plugs in through `EntityData`, a `SnapshotSource` and an
// `EligibilityPolicy`.

pub mod policy;

mod lifecycle;
mod notify;

use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use tokio::sync::{broadcast, watch};

use super::config::Settings;
use super::model::{EntityData, Notification, TrackedEntity};
use super::source::SnapshotSource;
use super::view::{ViewEvent, ViewState};
use self::lifecycle::{RefreshCycleState, StartAction, StopAction};
use self::policy::EligibilityPolicy;

/// A live-state reconciliation engine instance.
///
/// Lifecycle is ref-counted: multiple UI windows may hold the engine
/// "running" independently; polling stops only when every `start()` has
/// been matched by a `stop()`. `shutdown()` is final. All other state
/// changes originate from the scheduler.
///
/// Must be created and started inside a tokio runtime.
pub struct Engine<D: EntityData> {
    shared: Arc<EngineShared<D>>,
}

pub(crate) struct EngineShared<D: EntityData> {
    pub(crate) label: &'static str,
    /// The single lock serializing start/stop/shutdown against the
    /// scheduler's gate check. Never held across an await.
    pub(crate) cycle: Mutex<RefreshCycleState>,
    pub(crate) view: Mutex<ViewState<D>>,
    pub(crate) settings: RwLock<Settings>,
    /// Bumped on every settings swap; dismissal tasks watch it to
    /// re-evaluate eligibility.
    pub(crate) settings_version: watch::Sender<u64>,
    pub(crate) source: Arc<dyn SnapshotSource<D>>,
    pub(crate) policy: Arc<dyn EligibilityPolicy<D>>,
    pub(crate) events: broadcast::Sender<ViewEvent>,
    /// Start of the previous pass. Per-tick advances get the measured
    /// elapsed time, not the configured interval, so countdowns stay on
    /// the wall clock when a pass runs long.
    pub(crate) last_pass: Mutex<Option<Instant>>,
}

impl<D: EntityData> Engine<D> {
    pub fn new(
        label: &'static str,
        source: Arc<dyn SnapshotSource<D>>,
        policy: Arc<dyn EligibilityPolicy<D>>,
        settings: Settings,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        let (settings_version, _) = watch::channel(0);
        Self {
            shared: Arc::new(EngineShared {
                label,
                cycle: Mutex::new(RefreshCycleState::new()),
                view: Mutex::new(ViewState::new(events.clone())),
                settings: RwLock::new(settings),
                settings_version,
                source,
                policy,
                events,
                last_pass: Mutex::new(None),
            }),
        }
    }

    /// Subscribe to view-state changes. Multiple consumers may subscribe
    /// independently.
    pub fn subscribe(&self) -> broadcast::Receiver<ViewEvent> {
        self.shared.events.subscribe()
    }

    pub fn settings(&self) -> Settings {
        self.shared.settings.read().unwrap().clone()
    }

    /// Swap the settings snapshot. Live dismissal sequences re-check
    /// eligibility; a category turned off dismisses its notifications
    /// early.
    pub fn update_settings(&self, settings: Settings) {
        *self.shared.settings.write().unwrap() = settings;
        self.shared.settings_version.send_modify(|v| *v += 1);
    }

    /// Tracked entities in insertion order (clone-on-read).
    pub fn entities(&self) -> Vec<TrackedEntity<D>> {
        self.shared.view.lock().unwrap().entities()
    }

    /// Live notifications, oldest first (clone-on-read).
    pub fn notifications(&self) -> Vec<Notification> {
        self.shared.view.lock().unwrap().notifications()
    }

    /// Increment the start ref count; on the first reference, spawn the
    /// refresh loop. The first reconciliation pass runs immediately on the
    /// loop task, so the caller never blocks on the initial fetch.
    pub fn start(&self) {
        let action = { self.shared.cycle.lock().unwrap().begin_start() };
        match action {
            StartAction::SpawnLoop(generation) => {
                log::info!(
                    "{}: starting refresh loop (generation {})",
                    self.shared.label,
                    generation
                );
                let shared = self.shared.clone();
                tokio::spawn(async move {
                    EngineShared::run_loop(shared, generation).await;
                });
            }
            StartAction::Resumed => {
                log::info!(
                    "{}: restarted while the previous loop drains; resuming it",
                    self.shared.label
                );
            }
            StartAction::AlreadyRunning => {}
            StartAction::Refused => {
                log::warn!("{}: start() after shutdown ignored", self.shared.label);
            }
        }
    }

    /// Decrement the start ref count; on the last reference, the loop
    /// observes the stop and exits without rearming.
    pub fn stop(&self) {
        let action = { self.shared.cycle.lock().unwrap().end_stop() };
        match action {
            StopAction::Stopping => log::info!("{}: stopped", self.shared.label),
            StopAction::StillRunning => {}
            StopAction::Unbalanced => {
                log::warn!(
                    "{}: stop() without matching start(); ref count stays at zero",
                    self.shared.label
                );
            }
        }
    }

    /// Unconditional teardown regardless of ref count. Does not interrupt
    /// an in-flight fetch, only prevents further scheduling. Not
    /// restartable.
    pub fn shutdown(&self) {
        self.shared.cycle.lock().unwrap().shutdown();
        log::info!("{}: shut down", self.shared.label);
    }

    pub fn is_running(&self) -> bool {
        self.shared.cycle.lock().unwrap().is_running()
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<EngineShared<D>> {
        &self.shared
    }

    /// Drive one scheduler tick deterministically, bypassing the loop.
    #[cfg(test)]
    pub(crate) async fn run_pass(&self, tick: u64) {
        EngineShared::pass(&self.shared, tick).await;
    }
}

impl<D: EntityData> EngineShared<D> {
    /// Restart-each-time single-shot scheduling: the next sleep is armed
    /// only after the previous pass fully completes, so at most one pass is
    /// ever in flight no matter how slow the fetch is.
    async fn run_loop(shared: Arc<Self>, generation: u64) {
        loop {
            let claimed = { shared.cycle.lock().unwrap().claim_tick(generation) };
            let Some(tick) = claimed else {
                break;
            };
            Self::pass(&shared, tick).await;
            let interval = { shared.settings.read().unwrap().refresh_interval() };
            tokio::time::sleep(interval).await;
        }
        log::debug!(
            "{}: refresh loop exited (generation {})",
            shared.label,
            generation
        );
    }

    /// One reconciliation pass. Cheap per-entity recomputes run every tick;
    /// the full fetch+diff runs on every Nth tick (and on tick 0, which is
    /// the synchronous initial load).
    pub(crate) async fn pass(shared: &Arc<Self>, tick: u64) {
        let (interval, full_every) = {
            let settings = shared.settings.read().unwrap();
            (
                settings.refresh_interval(),
                u64::from(settings.full_refresh_every.max(1)),
            )
        };

        let now = Instant::now();
        let elapsed = {
            let mut last_pass = shared.last_pass.lock().unwrap();
            let elapsed = last_pass.map_or(interval, |prev| now.duration_since(prev));
            *last_pass = Some(now);
            elapsed
        };
        if tick > 0 {
            shared.view.lock().unwrap().advance_all(elapsed);
        }
        if tick % full_every != 0 {
            return;
        }

        // The fetch is synchronous-blocking; keep it off the async workers.
        let source = shared.source.clone();
        let fetched = tokio::task::spawn_blocking(move || source.fetch()).await;
        let snapshot = match fetched {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => {
                // Transient: state stays frozen at last good values and the
                // next tick retries at the regular interval.
                log::warn!("{}: snapshot fetch failed: {}", shared.label, e);
                return;
            }
            Err(e) => {
                log::warn!("{}: snapshot fetch task failed: {}", shared.label, e);
                return;
            }
        };

        let transitions = { shared.view.lock().unwrap().apply_snapshot(snapshot) };
        for (entity, detail) in transitions {
            Self::try_notify(shared, &entity, detail);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{
        EntityKind, Reconciliation, TeamColor, TransitionDetail, TriggerValue,
    };
    use crate::core::source::{FetchError, RemoteEntity, Snapshot};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    struct Owner(TeamColor);

    impl EntityData for Owner {
        fn reconcile(&self, incoming: &Self) -> Reconciliation {
            let mut outcome = Reconciliation::unchanged();
            if self.0 != incoming.0 {
                outcome.push(
                    crate::core::model::TransitionKind::OwnerChanged,
                    TriggerValue::Owner(self.0),
                    TriggerValue::Owner(incoming.0),
                );
            }
            outcome
        }

        fn neutral(&self) -> Self {
            Owner(TeamColor::Neutral)
        }
    }

    /// Source that records call counts and can simulate slowness.
    struct CountingSource {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay: Duration,
    }

    impl CountingSource {
        fn new(delay: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                delay,
            }
        }
    }

    impl SnapshotSource<Owner> for CountingSource {
        fn fetch(&self) -> Result<Snapshot<Owner>, FetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Snapshot::new(vec![RemoteEntity {
                id: 1,
                kind: EntityKind::Tower,
                data: Owner(TeamColor::Red),
            }]))
        }
    }

    fn allow_all(_: &Settings, _: &TrackedEntity<Owner>, _: &TransitionDetail) -> bool {
        true
    }

    fn fast_settings() -> Settings {
        Settings {
            refresh_interval_ms: 20,
            full_refresh_every: 1,
            ..Settings::default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_at_most_one_pass_in_flight() {
        let source = Arc::new(CountingSource::new(Duration::from_millis(120)));
        let engine = Engine::new("test", source.clone(), Arc::new(allow_all), fast_settings());

        engine.start();
        tokio::time::sleep(Duration::from_millis(500)).await;
        engine.shutdown();

        assert!(source.calls.load(Ordering::SeqCst) >= 2);
        assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_restart_during_inflight_pass_keeps_single_pass() {
        let source = Arc::new(CountingSource::new(Duration::from_millis(200)));
        let engine = Engine::new("test", source.clone(), Arc::new(allow_all), fast_settings());

        engine.start();
        tokio::time::sleep(Duration::from_millis(50)).await; // first fetch in flight
        engine.stop();
        engine.start();
        assert!(engine.is_running());

        // The draining loop must be resumed, not raced by a second one.
        tokio::time::sleep(Duration::from_millis(600)).await;
        engine.shutdown();
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert!(source.calls.load(Ordering::SeqCst) >= 2);
        assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(!engine.is_running());
    }

    /// Records what elapsed time per-tick advances are handed.
    #[derive(Clone)]
    struct Recorder {
        seen: Arc<Mutex<Vec<Duration>>>,
    }

    impl EntityData for Recorder {
        fn reconcile(&self, _incoming: &Self) -> Reconciliation {
            Reconciliation::unchanged()
        }

        fn neutral(&self) -> Self {
            self.clone()
        }

        fn advance(&mut self, elapsed: Duration) -> bool {
            self.seen.lock().unwrap().push(elapsed);
            false
        }
    }

    struct RecorderSource(Recorder);

    impl SnapshotSource<Recorder> for RecorderSource {
        fn fetch(&self) -> Result<Snapshot<Recorder>, FetchError> {
            Ok(Snapshot::new(vec![RemoteEntity {
                id: 1,
                kind: EntityKind::Task,
                data: self.0.clone(),
            }]))
        }
    }

    fn allow_recorder(_: &Settings, _: &TrackedEntity<Recorder>, _: &TransitionDetail) -> bool {
        true
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_advance_gets_measured_elapsed_not_interval() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let engine = Engine::new(
            "test",
            Arc::new(RecorderSource(Recorder { seen: seen.clone() })),
            Arc::new(allow_recorder),
            fast_settings(),
        );

        engine.run_pass(0).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        engine.run_pass(1).await;

        // The configured interval is 20ms; a pass that actually comes
        // 150ms later must advance countdowns by the measured time.
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0] >= Duration::from_millis(120), "elapsed {:?}", seen[0]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_ref_counted_lifecycle() {
        let source = Arc::new(CountingSource::new(Duration::ZERO));
        let engine = Engine::new("test", source.clone(), Arc::new(allow_all), fast_settings());

        assert!(!engine.is_running());

        engine.start();
        engine.start();
        assert!(engine.is_running());

        engine.stop();
        assert!(engine.is_running());

        engine.stop();
        assert!(!engine.is_running());

        // Polling actually ceases: call count settles.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let settled = source.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), settled);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unbalanced_stop_does_not_break_restart() {
        let source = Arc::new(CountingSource::new(Duration::ZERO));
        let engine = Engine::new("test", source.clone(), Arc::new(allow_all), fast_settings());

        engine.stop(); // misuse: warned and clamped
        assert!(!engine.is_running());

        engine.start();
        assert!(engine.is_running());
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(source.calls.load(Ordering::SeqCst) >= 1);
        assert_eq!(engine.entities().len(), 1);
        engine.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_is_final() {
        let source = Arc::new(CountingSource::new(Duration::ZERO));
        let engine = Engine::new("test", source.clone(), Arc::new(allow_all), fast_settings());

        engine.start();
        engine.shutdown();
        assert!(!engine.is_running());

        engine.start();
        assert!(!engine.is_running());

        tokio::time::sleep(Duration::from_millis(100)).await;
        let settled = source.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), settled);
    }

    struct FailingSource;

    impl SnapshotSource<Owner> for FailingSource {
        fn fetch(&self) -> Result<Snapshot<Owner>, FetchError> {
            Err(FetchError::Unavailable("down".to_string()))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_fetch_failure_freezes_state() {
        let engine = Engine::new(
            "test",
            Arc::new(FailingSource),
            Arc::new(allow_all),
            fast_settings(),
        );

        // Seed one entity, then let the failing source run a few passes.
        engine
            .shared()
            .view
            .lock()
            .unwrap()
            .apply_snapshot(Snapshot::new(vec![RemoteEntity {
                id: 7,
                kind: EntityKind::Keep,
                data: Owner(TeamColor::Green),
            }]));

        engine.start();
        tokio::time::sleep(Duration::from_millis(150)).await;
        engine.shutdown();

        let entities = engine.entities();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].data.0, TeamColor::Green);
        assert!(!entities[0].stale);
        assert!(engine.notifications().is_empty());
    }
}
