use crate::errors::{AppError, AppResult};
use crate::models::{ReloadOutcome, WorkspaceKey};
use crate::source::DataSource;
use crate::workspace::SharedStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};

pub const DEFAULT_TIMER_CAPACITY: usize = 1000;
pub const DEFAULT_RELOAD_INTERVAL: Duration = Duration::from_millis(30_000);

/// Invoked after every tick. Runs on the reload task, so it must not call
/// `stop` for its own workspace.
pub type TickCallback = Arc<dyn Fn(WorkspaceKey, AppResult<ReloadOutcome>) + Send + Sync>;

struct ReloadTask {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// A stopped task stays in the table as `Draining` until it has been
/// joined, so the key cannot be started again while a tick may still land.
enum TaskState {
    Running(ReloadTask),
    Draining,
}

/// Fetches fresh points and swaps them into `store`. The fetch runs without
/// holding the store lock; an empty result leaves the store untouched.
pub async fn reload_store(source: &dyn DataSource, store: &SharedStore) -> AppResult<ReloadOutcome> {
    let records = source.fetch().await?;
    if records.is_empty() {
        return Ok(ReloadOutcome::NoData);
    }
    store.lock().await.replace_all(records.clone());
    Ok(ReloadOutcome::refreshed(records))
}

#[derive(Clone)]
pub struct ReloadScheduler {
    tasks: Arc<Mutex<HashMap<WorkspaceKey, TaskState>>>,
    running_global: Arc<Mutex<usize>>,
    source: Arc<dyn DataSource>,
    interval: Duration,
    capacity: usize,
}

impl ReloadScheduler {
    pub fn new(source: Arc<dyn DataSource>, capacity: usize, interval: Duration) -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            running_global: Arc::new(Mutex::new(0)),
            source,
            interval,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn active_count(&self) -> usize {
        *self.running_global.lock().await
    }

    /// True from `start` until `stop` has fully drained the task.
    pub async fn is_running(&self, key: WorkspaceKey) -> bool {
        self.tasks.lock().await.contains_key(&key)
    }

    /// Starts periodic reloads for `key`. The first tick fires immediately.
    ///
    /// The capacity check is global: it counts every active task, not just
    /// the ones belonging to this workspace.
    pub async fn start(&self, key: WorkspaceKey, store: SharedStore, on_tick: TickCallback) -> AppResult<()> {
        let mut tasks = self.tasks.lock().await;
        if tasks.contains_key(&key) {
            return Err(AppError::AlreadyRunning(format!(
                "auto reload already active for workspace {}",
                key
            )));
        }
        if !self.try_reserve_slot().await {
            tracing::warn!(workspace = %key, capacity = self.capacity, "reload timer pool exhausted");
            return Err(AppError::PoolExhausted(self.capacity));
        }

        let (stop, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(run_loop(
            self.source.clone(),
            store,
            key,
            self.interval,
            on_tick,
            stop_rx,
        ));
        tasks.insert(key, TaskState::Running(ReloadTask { stop, handle }));
        tracing::info!(workspace = %key, interval_ms = self.interval.as_millis() as u64, "auto reload started");
        Ok(())
    }

    /// Stops the task for `key` and waits for an in-flight tick to finish.
    /// Returns `false` when nothing was running or another caller is
    /// already stopping it.
    pub async fn stop(&self, key: WorkspaceKey) -> bool {
        let task = {
            let mut tasks = self.tasks.lock().await;
            let Some(state) = tasks.get_mut(&key) else {
                return false;
            };
            let TaskState::Running(task) = std::mem::replace(state, TaskState::Draining) else {
                return false;
            };
            task
        };

        let _ = task.stop.send(());
        if let Err(error) = task.handle.await {
            tracing::warn!(workspace = %key, error = %error, "reload task ended abnormally");
        }
        self.release_slot().await;
        self.tasks.lock().await.remove(&key);
        tracing::info!(workspace = %key, "auto reload stopped");
        true
    }

    pub async fn stop_all(&self) -> usize {
        let keys = self.tasks.lock().await.keys().copied().collect::<Vec<_>>();
        let mut stopped = 0usize;
        for key in keys {
            if self.stop(key).await {
                stopped += 1;
            }
        }
        stopped
    }

    async fn try_reserve_slot(&self) -> bool {
        let mut global = self.running_global.lock().await;
        if *global >= self.capacity {
            return false;
        }
        *global += 1;
        true
    }

    async fn release_slot(&self) {
        let mut global = self.running_global.lock().await;
        if *global > 0 {
            *global -= 1;
        }
    }
}

async fn run_loop(
    source: Arc<dyn DataSource>,
    store: SharedStore,
    key: WorkspaceKey,
    period: Duration,
    on_tick: TickCallback,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            _ = ticker.tick() => {}
        }

        // Not raced against the stop signal: a started tick always lands.
        let result = reload_store(source.as_ref(), &store).await;
        match &result {
            Ok(outcome) => {
                tracing::debug!(workspace = %key, records = outcome.records().len(), "auto reload tick")
            }
            Err(error) => tracing::warn!(workspace = %key, error = %error, "auto reload tick failed"),
        }
        on_tick(key, result);
    }
}

#[cfg(test)]
mod tests {
    use super::{reload_store, ReloadScheduler, TickCallback, DEFAULT_TIMER_CAPACITY};
    use crate::errors::{AppError, AppResult};
    use crate::models::{Record, ReloadOutcome, WorkspaceKey};
    use crate::source::{DataSource, FetchFuture};
    use crate::store::RecordStore;
    use crate::workspace::SharedStore;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::{mpsc, Mutex};
    use tokio::time::{sleep, timeout, Duration};

    struct SlowSource {
        delay: Duration,
        calls: AtomicUsize,
    }

    impl SlowSource {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl DataSource for SlowSource {
        fn fetch(&self) -> FetchFuture<'_> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = self.delay;
            Box::pin(async move {
                sleep(delay).await;
                Ok(vec![Record::new(1.0, 1.0, "Slow")])
            })
        }
    }

    #[derive(Default)]
    struct ScriptedSource {
        responses: std::sync::Mutex<VecDeque<AppResult<Vec<Record>>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn with(responses: Vec<AppResult<Vec<Record>>>) -> Arc<Self> {
            Arc::new(Self {
                responses: std::sync::Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl DataSource for ScriptedSource {
        fn fetch(&self) -> FetchFuture<'_> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self
                .responses
                .lock()
                .expect("responses lock")
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()));
            Box::pin(async move { next })
        }
    }

    fn shared_store() -> SharedStore {
        Arc::new(Mutex::new(RecordStore::new()))
    }

    fn noop_callback() -> TickCallback {
        Arc::new(|_, _| {})
    }

    fn channel_callback() -> (TickCallback, mpsc::UnboundedReceiver<(WorkspaceKey, AppResult<ReloadOutcome>)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback: TickCallback = Arc::new(move |key, result| {
            let _ = tx.send((key, result));
        });
        (callback, rx)
    }

    fn points() -> Vec<Record> {
        vec![Record::new(10.0, 20.0, "Alpha"), Record::new(15.0, 25.0, "Beta")]
    }

    #[tokio::test]
    async fn reload_store_distinguishes_no_data_from_failure() {
        let store = shared_store();
        let source = ScriptedSource::with(vec![
            Ok(Vec::new()),
            Err(AppError::FetchFailed("connection refused".to_string())),
            Ok(points()),
        ]);

        let empty = reload_store(source.as_ref(), &store).await.expect("no data is ok");
        assert!(empty.is_no_data());
        assert!(store.lock().await.is_unloaded());

        let failed = reload_store(source.as_ref(), &store).await.expect_err("fetch failure");
        assert!(matches!(failed, AppError::FetchFailed(_)));

        let refreshed = reload_store(source.as_ref(), &store).await.expect("refresh");
        assert_eq!(refreshed.records(), points().as_slice());
        assert_eq!(store.lock().await.records(), points());
    }

    #[tokio::test]
    async fn first_tick_is_immediate_and_replaces_store() {
        let source = ScriptedSource::with(vec![Ok(points())]);
        let scheduler = ReloadScheduler::new(source, 4, Duration::from_secs(3600));
        let store = shared_store();
        let key = WorkspaceKey::new();
        let (callback, mut rx) = channel_callback();

        scheduler.start(key, store.clone(), callback).await.expect("start");
        let (ticked_key, result) = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("tick within timeout")
            .expect("channel open");

        assert_eq!(ticked_key, key);
        assert_eq!(result.expect("refreshed").records().len(), 2);
        assert_eq!(store.lock().await.size(), 2);
        assert!(scheduler.stop(key).await);
    }

    #[tokio::test]
    async fn empty_tick_reports_no_data_and_keeps_store() {
        let source = ScriptedSource::with(vec![Ok(Vec::new())]);
        let scheduler = ReloadScheduler::new(source, 4, Duration::from_secs(3600));
        let store = Arc::new(Mutex::new(RecordStore::with_records(points())));
        let key = WorkspaceKey::new();
        let (callback, mut rx) = channel_callback();

        scheduler.start(key, store.clone(), callback).await.expect("start");
        let (_, result) = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("tick within timeout")
            .expect("channel open");

        assert!(result.expect("no data is ok").is_no_data());
        assert_eq!(store.lock().await.records(), points());
        scheduler.stop(key).await;
    }

    #[tokio::test]
    async fn pool_exhaustion_is_global() {
        let source = ScriptedSource::with(Vec::new());
        let scheduler = ReloadScheduler::new(source, DEFAULT_TIMER_CAPACITY, Duration::from_secs(3600));
        let mut keys = Vec::new();
        for _ in 0..DEFAULT_TIMER_CAPACITY {
            let key = WorkspaceKey::new();
            scheduler
                .start(key, shared_store(), noop_callback())
                .await
                .expect("slot available");
            keys.push(key);
        }
        assert_eq!(scheduler.active_count().await, DEFAULT_TIMER_CAPACITY);

        let newcomer = WorkspaceKey::new();
        assert!(!scheduler.is_running(newcomer).await);
        let error = scheduler
            .start(newcomer, shared_store(), noop_callback())
            .await
            .expect_err("pool is full");
        assert!(matches!(error, AppError::PoolExhausted(DEFAULT_TIMER_CAPACITY)));

        assert!(scheduler.stop(keys[0]).await);
        scheduler
            .start(newcomer, shared_store(), noop_callback())
            .await
            .expect("freed slot is reusable");

        assert_eq!(scheduler.stop_all().await, DEFAULT_TIMER_CAPACITY);
        assert_eq!(scheduler.active_count().await, 0);
    }

    #[tokio::test]
    async fn starting_twice_is_rejected() {
        let scheduler = ReloadScheduler::new(ScriptedSource::with(Vec::new()), 4, Duration::from_secs(3600));
        let key = WorkspaceKey::new();
        scheduler.start(key, shared_store(), noop_callback()).await.expect("first start");
        let error = scheduler
            .start(key, shared_store(), noop_callback())
            .await
            .expect_err("second start");
        assert!(matches!(error, AppError::AlreadyRunning(_)));
        assert_eq!(scheduler.active_count().await, 1);

        assert!(scheduler.stop(key).await);
        scheduler
            .start(key, shared_store(), noop_callback())
            .await
            .expect("restart after stop");
        scheduler.stop(key).await;
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let scheduler = ReloadScheduler::new(ScriptedSource::with(Vec::new()), 2, Duration::from_secs(3600));
        let key = WorkspaceKey::new();
        scheduler.start(key, shared_store(), noop_callback()).await.expect("start");

        assert!(scheduler.stop(key).await);
        assert!(!scheduler.stop(key).await);
        assert_eq!(scheduler.active_count().await, 0);
        assert!(!scheduler.stop(WorkspaceKey::new()).await);
    }

    #[tokio::test]
    async fn no_ticks_after_stop_returns() {
        let source = ScriptedSource::with(Vec::new());
        let scheduler = ReloadScheduler::new(source.clone(), 2, Duration::from_millis(10));
        let key = WorkspaceKey::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let callback: TickCallback = Arc::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        scheduler.start(key, shared_store(), callback).await.expect("start");
        timeout(Duration::from_secs(2), async {
            while ticks.load(Ordering::SeqCst) < 3 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("periodic ticks fire");

        scheduler.stop(key).await;
        let after_stop = ticks.load(Ordering::SeqCst);
        sleep(Duration::from_millis(60)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
        assert_eq!(source.calls.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn start_while_stop_drains_is_rejected() {
        let source = SlowSource::new(Duration::from_millis(200));
        let scheduler = ReloadScheduler::new(source.clone(), 4, Duration::from_secs(3600));
        let key = WorkspaceKey::new();
        scheduler.start(key, shared_store(), noop_callback()).await.expect("start");
        timeout(Duration::from_secs(2), async {
            while source.calls.load(Ordering::SeqCst) == 0 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("first fetch begins");

        let stopper = scheduler.clone();
        let stopping = tokio::spawn(async move { stopper.stop(key).await });
        sleep(Duration::from_millis(50)).await;

        let error = scheduler
            .start(key, shared_store(), noop_callback())
            .await
            .expect_err("key is still draining");
        assert!(matches!(error, AppError::AlreadyRunning(_)));
        assert!(scheduler.is_running(key).await);
        assert!(!scheduler.stop(key).await);

        assert!(stopping.await.expect("stop task joins"));
        assert!(!scheduler.is_running(key).await);
        assert_eq!(scheduler.active_count().await, 0);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }
}
