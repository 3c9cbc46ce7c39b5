use std::{future::Future, sync::Arc};

use anyhow::Result;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    db::SleepNight,
    format::{format_nights, Resources},
    observable::{Mapped, Observer, ValueCell},
    store::SleepStore,
};

use super::{TrackerPhase, TrackerState};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Completion handle for one triggered operation. Storage errors come back
/// through it untouched; a cancelled operation resolves to `Ok(())`.
pub type TrackerTask = JoinHandle<Result<()>>;

struct TrackerInner {
    store: Arc<dyn SleepStore>,
    resources: Arc<Resources>,
    tonight: ValueCell<Option<SleepNight>>,
    state: watch::Sender<TrackerState>,
    scope: CancellationToken,
}

impl TrackerInner {
    async fn tonight_from_store(&self) -> Result<Option<SleepNight>> {
        let night = self.store.get_tonight().await?;
        Ok(night.filter(SleepNight::is_active))
    }

    fn publish_tonight(&self, night: Option<SleepNight>) {
        if self.tonight.publish(night) {
            log_debug!("tonight refreshed");
        } else {
            log_debug!("tonight is sealed; dropping late result");
        }
    }

    fn tear_down(&self) {
        if !self.state.send_if_modified(TrackerState::tear_down) {
            return;
        }
        self.scope.cancel();
        self.tonight.seal();
        log_info!("sleep tracker torn down");
    }
}

/// Tears the tracker down when the last user-facing handle goes away.
/// Spawned operations hold `TrackerInner` directly and do not count.
struct TeardownOnDrop(Arc<TrackerInner>);

impl Drop for TeardownOnDrop {
    fn drop(&mut self) {
        self.0.tear_down();
    }
}

/// Sits between the UI surface and the night store. Keeps `tonight` and the
/// formatted history current and runs every operation inside one
/// cancellable scope.
#[derive(Clone)]
pub struct SleepTracker {
    inner: Arc<TrackerInner>,
    _teardown: Arc<TeardownOnDrop>,
}

impl SleepTracker {
    /// Must be called from inside a tokio runtime: loading tonight starts
    /// right away.
    pub fn new(store: Arc<dyn SleepStore>, resources: Resources) -> Self {
        let (state, _) = watch::channel(TrackerState::new());
        let inner = Arc::new(TrackerInner {
            store,
            resources: Arc::new(resources),
            tonight: ValueCell::new(None),
            state,
            scope: CancellationToken::new(),
        });

        let tracker = Self {
            _teardown: Arc::new(TeardownOnDrop(Arc::clone(&inner))),
            inner,
        };
        // Failures are logged by `launch`; callers observe progress through `phase`.
        drop(tracker.initialize_tonight());
        tracker
    }

    fn initialize_tonight(&self) -> TrackerTask {
        self.launch(TrackerPhase::Initializing, "initialize tonight", |inner| async move {
            let tonight = inner.tonight_from_store().await?;
            inner.publish_tonight(tonight);
            Ok(())
        })
    }

    /// Stores a fresh night, then republishes tonight once the insert has
    /// landed. Two overlapping calls are not serialized: both insert.
    pub fn start_tracking(&self) -> TrackerTask {
        self.launch(TrackerPhase::Starting, "start tracking", |inner| async move {
            let night = SleepNight::new();
            inner.store.insert(&night).await?;
            log_info!("started tracking night at {}", night.start_time);

            let tonight = inner.tonight_from_store().await?;
            inner.publish_tonight(tonight);
            Ok(())
        })
    }

    /// Cancels outstanding work and stops both observables. Later calls do
    /// nothing.
    pub fn clear(&self) {
        self.inner.tear_down();
    }

    /// The night currently being tracked, if any.
    pub fn tonight(&self) -> Observer<Option<SleepNight>> {
        self.inner
            .tonight
            .observe()
            .until(self.inner.scope.clone())
    }

    /// Stored history rendered with this tracker's resources.
    pub fn night_string(&self) -> Mapped<Vec<SleepNight>, String> {
        let resources = Arc::clone(&self.inner.resources);
        self.inner
            .store
            .all_nights()
            .until(self.inner.scope.clone())
            .map(move |nights| format_nights(nights, &resources))
    }

    pub fn phase(&self) -> TrackerPhase {
        self.inner.state.borrow().phase
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.state.borrow().is_torn_down()
    }

    /// Resolves once nothing is in flight or the tracker has been torn down.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.state.subscribe();
        let _ = rx.wait_for(TrackerState::is_settled).await;
    }

    fn launch<F, Fut>(&self, phase: TrackerPhase, label: &'static str, work: F) -> TrackerTask
    where
        F: FnOnce(Arc<TrackerInner>) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        if !self.inner.state.send_if_modified(|state| state.begin(phase)) {
            log_warn!("{label} ignored: tracker already torn down");
            return tokio::spawn(async { Ok(()) });
        }

        let inner = Arc::clone(&self.inner);
        let scope = inner.scope.clone();
        let work = work(Arc::clone(&inner));

        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = scope.cancelled() => {
                    log_debug!("{label} cancelled");
                    Ok(())
                }
                result = work => result,
            };

            if let Err(err) = &result {
                log_error!("{label} failed: {err:?}");
            }

            inner.state.send_if_modified(TrackerState::finish);
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use tokio::sync::Semaphore;

    use crate::db::{models::now_millis, Database};

    async fn tracker_over(db: &Database) -> SleepTracker {
        let tracker = SleepTracker::new(Arc::new(db.clone()), Resources::default());
        tracker.wait_idle().await;
        tracker
    }

    fn completed_night() -> SleepNight {
        let mut night = SleepNight::new();
        night.start_time = night.start_time - ChronoDuration::hours(8);
        night.sleep_quality = 3;
        night
    }

    struct FailingStore {
        nights: ValueCell<Vec<SleepNight>>,
    }

    #[async_trait]
    impl SleepStore for FailingStore {
        async fn get_tonight(&self) -> Result<Option<SleepNight>> {
            Ok(None)
        }

        async fn insert(&self, _night: &SleepNight) -> Result<()> {
            Err(anyhow!("disk full"))
        }

        fn all_nights(&self) -> Observer<Vec<SleepNight>> {
            self.nights.observe()
        }
    }

    /// Holds reads or writes until the test hands out permits.
    struct GatedStore {
        db: Database,
        gate: Arc<Semaphore>,
        gate_reads: bool,
        gate_writes: bool,
    }

    impl GatedStore {
        fn new(db: &Database, gate_reads: bool, gate_writes: bool) -> (Arc<Self>, Arc<Semaphore>) {
            let gate = Arc::new(Semaphore::new(0));
            let store = Arc::new(Self {
                db: db.clone(),
                gate: Arc::clone(&gate),
                gate_reads,
                gate_writes,
            });
            (store, gate)
        }

        async fn pass(&self, gated: bool) -> Result<()> {
            if gated {
                self.gate.acquire().await.map_err(|e| anyhow!(e))?.forget();
            }
            Ok(())
        }
    }

    #[async_trait]
    impl SleepStore for GatedStore {
        async fn get_tonight(&self) -> Result<Option<SleepNight>> {
            self.pass(self.gate_reads).await?;
            self.db.get_tonight().await
        }

        async fn insert(&self, night: &SleepNight) -> Result<()> {
            self.pass(self.gate_writes).await?;
            self.db.insert_night(night).await.map(|_| ())
        }

        fn all_nights(&self) -> Observer<Vec<SleepNight>> {
            self.db.nights()
        }
    }

    #[tokio::test]
    async fn empty_store_initializes_to_nothing() {
        let db = Database::open_in_memory().unwrap();
        let tracker = tracker_over(&db).await;

        assert_eq!(tracker.phase(), TrackerPhase::Ready);
        assert!(tracker.tonight().get().is_none());
        assert_eq!(tracker.night_string().get(), "Here is your sleep data");
    }

    #[tokio::test]
    async fn completed_night_is_not_tonight() {
        let db = Database::open_in_memory().unwrap();
        db.insert_night(&completed_night()).await.unwrap();

        let tracker = tracker_over(&db).await;
        assert!(tracker.tonight().get().is_none());
    }

    #[tokio::test]
    async fn active_night_is_picked_up_on_creation() {
        let db = Database::open_in_memory().unwrap();
        db.insert_night(&completed_night()).await.unwrap();
        db.insert_night(&SleepNight::new()).await.unwrap();
        let stored = db.get_tonight().await.unwrap().unwrap();

        let tracker = tracker_over(&db).await;
        assert_eq!(tracker.tonight().get(), Some(stored));
    }

    #[tokio::test]
    async fn start_tracking_persists_one_active_night() {
        let db = Database::open_in_memory().unwrap();
        let tracker = tracker_over(&db).await;

        let before = now_millis();
        tracker.start_tracking().await.unwrap().unwrap();
        let after = now_millis();

        let nights = db.get_all_nights().await.unwrap();
        assert_eq!(nights.len(), 1);
        let night = &nights[0];
        assert!(night.is_active());
        assert!(night.start_time >= before && night.start_time <= after);

        assert_eq!(tracker.tonight().get().as_ref(), Some(night));
        assert_eq!(tracker.phase(), TrackerPhase::Ready);
    }

    #[tokio::test]
    async fn history_string_tracks_the_store() {
        let db = Database::open_in_memory().unwrap();
        let tracker = tracker_over(&db).await;
        let mut history = tracker.night_string();
        let resources = Resources::default();

        tracker.start_tracking().await.unwrap().unwrap();
        assert!(history.changed().await);
        assert_eq!(
            history.get(),
            format_nights(&db.get_all_nights().await.unwrap(), &resources)
        );

        let idle = tokio::time::timeout(Duration::from_millis(50), history.changed()).await;
        assert!(idle.is_err(), "no write happened, so nothing should wake");

        db.insert_night(&completed_night()).await.unwrap();
        let changed = tokio::time::timeout(Duration::from_secs(1), history.changed())
            .await
            .unwrap();
        assert!(changed);
        assert_eq!(
            history.get(),
            format_nights(&db.get_all_nights().await.unwrap(), &resources)
        );
        assert!(history.get().contains("Quality:\tOK"));
    }

    #[tokio::test]
    async fn insert_failure_reaches_the_handle() {
        let store = Arc::new(FailingStore {
            nights: ValueCell::new(Vec::new()),
        });
        let tracker = SleepTracker::new(store, Resources::default());
        tracker.wait_idle().await;

        let err = tracker.start_tracking().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("disk full"));
        assert!(tracker.tonight().get().is_none());
        assert_eq!(tracker.phase(), TrackerPhase::Ready);
    }

    #[tokio::test]
    async fn teardown_during_start_suppresses_everything() {
        let db = Database::open_in_memory().unwrap();
        let (store, gate) = GatedStore::new(&db, false, true);
        let tracker = SleepTracker::new(store, Resources::default());
        tracker.wait_idle().await;

        let task = tracker.start_tracking();
        tokio::task::yield_now().await;
        assert_eq!(tracker.phase(), TrackerPhase::Starting);

        tracker.clear();
        gate.add_permits(1);
        task.await.unwrap().unwrap();

        assert_eq!(tracker.phase(), TrackerPhase::TornDown);
        assert!(tracker.tonight().get().is_none());
        assert!(db.get_all_nights().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn teardown_during_initialize_keeps_tonight_empty() {
        let db = Database::open_in_memory().unwrap();
        db.insert_night(&SleepNight::new()).await.unwrap();
        let (store, gate) = GatedStore::new(&db, true, false);

        let tracker = SleepTracker::new(store, Resources::default());
        assert_eq!(tracker.phase(), TrackerPhase::Initializing);
        tracker.clear();
        gate.add_permits(1);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(tracker.is_torn_down());
        assert!(tracker.tonight().get().is_none());
    }

    #[tokio::test]
    async fn observers_go_quiet_after_teardown() {
        let db = Database::open_in_memory().unwrap();
        let tracker = tracker_over(&db).await;
        let mut tonight = tracker.tonight();
        let mut history = tracker.night_string();

        tracker.clear();
        db.insert_night(&SleepNight::new()).await.unwrap();

        assert!(!tonight.changed().await);
        assert!(!history.changed().await);
    }

    #[tokio::test]
    async fn clear_is_idempotent_and_final() {
        let db = Database::open_in_memory().unwrap();
        let tracker = tracker_over(&db).await;

        tracker.clear();
        tracker.clear();
        tracker.start_tracking().await.unwrap().unwrap();

        assert_eq!(tracker.phase(), TrackerPhase::TornDown);
        assert!(db.get_all_nights().await.unwrap().is_empty());
        tracker.wait_idle().await;
    }

    #[tokio::test]
    async fn dropping_the_tracker_cancels_its_work() {
        let db = Database::open_in_memory().unwrap();
        let (store, gate) = GatedStore::new(&db, false, true);
        let tracker = SleepTracker::new(store, Resources::default());
        tracker.wait_idle().await;

        let tonight = tracker.tonight();
        let task = tracker.start_tracking();
        drop(tracker);
        gate.add_permits(1);
        task.await.unwrap().unwrap();

        assert!(tonight.get().is_none());
        assert!(db.get_all_nights().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn back_to_back_starts_both_insert() {
        let db = Database::open_in_memory().unwrap();
        let tracker = tracker_over(&db).await;

        let first = tracker.start_tracking();
        let second = tracker.start_tracking();
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        // Which insert wins the final publish is not defined.
        let nights = db.get_all_nights().await.unwrap();
        assert_eq!(nights.len(), 2);
        let tonight = tracker.tonight().get().unwrap();
        assert!(tonight.is_active());
        assert!(nights.contains(&tonight));
    }
}
