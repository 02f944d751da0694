//! Event queue: per-path debounce, then fan-out to a fixed pool of copy
//! workers.
//!
//! Every path hashes to exactly one worker, so events for the same file are
//! copied in order while unrelated files proceed in parallel. Workers run the
//! blocking [`CopyExecutor`] on tokio's blocking pool.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use mirror_core::{CopyOutcome, CopyResult, WatchEvent};
use mirror_sync::{CopyExecutor, Transfer};

use crate::error::DaemonError;
use crate::watcher::{translate, RawEvent};

/// A path that keeps changing is still flushed after this many windows.
const MAX_HOLD_WINDOWS: u32 = 10;

/// How long the dispatcher sleeps when nothing is pending.
const IDLE_WAKE: Duration = Duration::from_secs(3600);

// ---------------------------------------------------------------------------
// Debouncer
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Pending {
    event: WatchEvent,
    first_seen: Instant,
    due: Instant,
}

/// Trailing-edge debounce keyed by path.
///
/// Each new event for a pending path pushes its deadline out by one window
/// (capped at `MAX_HOLD_WINDOWS` windows after the first event) and merges
/// its kind, so a burst collapses into one dispatch.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: HashMap<PathBuf, Pending>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    pub fn push(&mut self, event: WatchEvent, now: Instant) {
        let window = self.window;
        match self.pending.get_mut(&event.path) {
            Some(pending) => {
                pending.event.change_kind = pending.event.change_kind.merge(event.change_kind);
                let cap = pending.first_seen + window * MAX_HOLD_WINDOWS;
                pending.due = (now + window).min(cap);
            }
            None => {
                self.pending.insert(
                    event.path.clone(),
                    Pending {
                        event,
                        first_seen: now,
                        due: now + window,
                    },
                );
            }
        }
    }

    /// Remove and return every event whose quiet window has elapsed.
    pub fn drain_due(&mut self, now: Instant) -> Vec<WatchEvent> {
        let due: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.due <= now)
            .map(|(path, _)| path.clone())
            .collect();
        let mut events: Vec<WatchEvent> = due
            .into_iter()
            .filter_map(|path| self.pending.remove(&path))
            .map(|pending| pending.event)
            .collect();
        events.sort_by(|a, b| a.path.cmp(&b.path));
        events
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|pending| pending.due).min()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Worker pool
// ---------------------------------------------------------------------------

/// Fixed set of copy workers, each behind its own bounded queue.
#[derive(Debug)]
pub struct WorkerPool {
    senders: Vec<mpsc::Sender<WatchEvent>>,
    handles: Vec<JoinHandle<()>>,
    dispatched: Arc<AtomicU64>,
}

/// What every worker needs to turn an event into a copy.
pub struct WorkerContext<T: Transfer> {
    pub executor: Arc<CopyExecutor<T>>,
    pub destination: PathBuf,
    pub cancel: Arc<AtomicBool>,
    /// Optional observer of every outcome, in addition to the log line.
    pub outcomes: Option<mpsc::UnboundedSender<CopyOutcome>>,
}

impl<T: Transfer> Clone for WorkerContext<T> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            destination: self.destination.clone(),
            cancel: self.cancel.clone(),
            outcomes: self.outcomes.clone(),
        }
    }
}

impl WorkerPool {
    pub fn spawn<T: Transfer + 'static>(
        workers: usize,
        queue_capacity: usize,
        context: WorkerContext<T>,
    ) -> Self {
        let workers = workers.max(1);
        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let (tx, rx) = mpsc::channel::<WatchEvent>(queue_capacity.max(1));
            senders.push(tx);
            handles.push(tokio::spawn(worker_loop(id, rx, context.clone())));
        }
        Self {
            senders,
            handles,
            dispatched: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn workers(&self) -> usize {
        self.senders.len()
    }

    /// Number of events handed to workers so far.
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Queue `event` on the worker that owns its path. Waits if that worker's
    /// queue is full.
    pub async fn dispatch(&self, event: WatchEvent) -> Result<(), DaemonError> {
        let index = worker_index(&event.path, self.senders.len());
        self.senders[index]
            .send(event)
            .await
            .map_err(|_| DaemonError::ChannelClosed("worker queue"))?;
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Close every queue and wait for in-flight copies to finish.
    pub async fn shutdown(self) {
        let WorkerPool {
            senders, handles, ..
        } = self;
        drop(senders);
        for handle in handles {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "copy worker panicked");
            }
        }
    }
}

fn worker_index(path: &Path, workers: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    (hasher.finish() % workers as u64) as usize
}

async fn worker_loop<T: Transfer + 'static>(
    id: usize,
    mut rx: mpsc::Receiver<WatchEvent>,
    context: WorkerContext<T>,
) {
    while let Some(event) = rx.recv().await {
        if context.cancel.load(Ordering::SeqCst) {
            tracing::debug!(worker = id, file = %event.file_name, "shutting down, event dropped");
            continue;
        }
        if !event.path.is_file() {
            tracing::debug!(worker = id, path = %event.path.display(), "not a regular file, ignored");
            continue;
        }

        let dest = event.destination_in(&context.destination);
        let executor = context.executor.clone();
        let source = event.path.clone();
        let kind = event.change_kind;
        let joined =
            tokio::task::spawn_blocking(move || executor.copy(&source, &dest, kind)).await;

        match joined {
            Ok(outcome) => {
                log_outcome(&outcome);
                if let Some(tx) = &context.outcomes {
                    let _ = tx.send(outcome);
                }
            }
            Err(err) => {
                tracing::error!(worker = id, file = %event.file_name, error = %err, "copy task join failure");
            }
        }
    }
    tracing::debug!(worker = id, "copy worker exiting");
}

/// One log line per outcome; failures never propagate further.
pub fn log_outcome(outcome: &CopyOutcome) {
    let file = outcome.file_name.as_str();
    match &outcome.result {
        CopyResult::Copied => {
            tracing::info!(file, retries = outcome.retries, "copied");
        }
        CopyResult::SkippedExists => {
            tracing::debug!(file, "destination exists, skipped");
        }
        CopyResult::FailedAfterRetries { last_error } => {
            tracing::error!(
                file,
                retries = outcome.retries,
                error = %last_error,
                "copy failed after retries",
            );
        }
        CopyResult::FailedPermanent { error } => {
            tracing::error!(file, error = %error, "copy failed, not retrying");
        }
        CopyResult::Cancelled => {
            tracing::info!(file, retries = outcome.retries, "copy cancelled by shutdown");
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher task
// ---------------------------------------------------------------------------

/// Drain native events, debounce them, and feed the worker pool until the
/// watcher is dropped or shutdown is broadcast. Pending events are discarded
/// on exit: nothing is dispatched after the watcher stops.
pub async fn run_dispatcher(
    mut raw_rx: mpsc::UnboundedReceiver<RawEvent>,
    root: PathBuf,
    window: Duration,
    pool: Arc<WorkerPool>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut debouncer = Debouncer::new(window);

    loop {
        let wake = debouncer
            .next_deadline()
            .unwrap_or_else(|| Instant::now() + IDLE_WAKE);

        tokio::select! {
            _ = shutdown_rx.recv() => break,
            raw = raw_rx.recv() => {
                let Some(raw) = raw else { break };
                match raw {
                    Ok(event) => {
                        if event.need_rescan() {
                            report_watch_error("native event queue overflowed; events may have been missed");
                        }
                        let now = Instant::now();
                        for watch_event in translate(&event, &root) {
                            tracing::debug!(
                                file = %watch_event.file_name,
                                kind = %watch_event.change_kind,
                                "watch event",
                            );
                            debouncer.push(watch_event, now);
                        }
                    }
                    Err(err) => report_watch_error(&err.to_string()),
                }
            }
            _ = tokio::time::sleep_until(wake) => {}
        }

        for event in debouncer.drain_due(Instant::now()) {
            if let Err(err) = pool.dispatch(event).await {
                tracing::error!(error = %err, "could not hand event to worker");
            }
        }
    }

    if !debouncer.is_empty() {
        tracing::debug!(pending = debouncer.len(), "dispatcher stopped with pending events");
    }
}

/// Error handler for the native watch mechanism. Logs only: the subscription
/// is not re-established.
fn report_watch_error(message: &str) {
    tracing::warn!(error = %message, "watch subsystem error");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    use mirror_core::ChangeKind;
    use mirror_sync::{CopyError, FsTransfer, Placement, RetryPolicy, WriteMode};
    use tempfile::TempDir;

    fn ev(path: &str, kind: ChangeKind) -> WatchEvent {
        WatchEvent::new(path, kind).expect("event")
    }

    /// Counts calls, then copies for real.
    struct CountingTransfer(Arc<AtomicU32>);

    impl Transfer for CountingTransfer {
        fn transfer(
            &self,
            source: &Path,
            dest: &Path,
            mode: WriteMode,
        ) -> Result<Placement, CopyError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            FsTransfer.transfer(source, dest, mode)
        }
    }

    struct PoolFixture {
        source: TempDir,
        destination: TempDir,
        calls: Arc<AtomicU32>,
        cancel: Arc<AtomicBool>,
    }

    impl PoolFixture {
        fn new(cancelled: bool) -> Self {
            Self {
                source: TempDir::new().unwrap(),
                destination: TempDir::new().unwrap(),
                calls: Arc::new(AtomicU32::new(0)),
                cancel: Arc::new(AtomicBool::new(cancelled)),
            }
        }

        fn spawn(&self, tx: mpsc::UnboundedSender<CopyOutcome>) -> WorkerPool {
            let executor = CopyExecutor::with_transfer(
                CountingTransfer(self.calls.clone()),
                RetryPolicy::new(1, Duration::ZERO),
            );
            WorkerPool::spawn(
                2,
                8,
                WorkerContext {
                    executor: Arc::new(executor),
                    destination: self.destination.path().to_path_buf(),
                    cancel: self.cancel.clone(),
                    outcomes: Some(tx),
                },
            )
        }

        fn event_for(&self, name: &str) -> WatchEvent {
            let path = self.source.path().join(name);
            std::fs::write(&path, name).unwrap();
            WatchEvent::new(path, ChangeKind::Created).expect("event")
        }
    }

    #[test]
    fn burst_collapses_into_one_event() {
        let window = Duration::from_millis(100);
        let mut debouncer = Debouncer::new(window);
        let start = Instant::now();

        for step in 0..5u32 {
            debouncer.push(ev("/in/a.txt", ChangeKind::Created), start + Duration::from_millis(10) * step);
        }
        assert!(debouncer.drain_due(start + Duration::from_millis(100)).is_empty());

        let flushed = debouncer.drain_due(start + Duration::from_millis(200));
        assert_eq!(flushed.len(), 1);
        assert!(debouncer.is_empty());
    }

    #[test]
    fn merged_kind_is_changed_if_any_changed() {
        let mut debouncer = Debouncer::new(Duration::from_millis(50));
        let now = Instant::now();
        debouncer.push(ev("/in/a.txt", ChangeKind::Created), now);
        debouncer.push(ev("/in/a.txt", ChangeKind::Changed), now);
        debouncer.push(ev("/in/a.txt", ChangeKind::Created), now);

        let flushed = debouncer.drain_due(now + Duration::from_millis(50));
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].change_kind, ChangeKind::Changed);
    }

    #[test]
    fn distinct_paths_are_independent() {
        let mut debouncer = Debouncer::new(Duration::from_millis(50));
        let now = Instant::now();
        debouncer.push(ev("/in/a.txt", ChangeKind::Created), now);
        debouncer.push(ev("/in/b.txt", ChangeKind::Created), now + Duration::from_millis(40));

        let first = debouncer.drain_due(now + Duration::from_millis(60));
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].file_name, "a.txt");
        assert_eq!(
            debouncer.next_deadline(),
            Some(now + Duration::from_millis(90))
        );
    }

    #[test]
    fn continuous_writes_are_flushed_at_cap() {
        let window = Duration::from_millis(10);
        let mut debouncer = Debouncer::new(window);
        let start = Instant::now();

        for step in 0..50u32 {
            debouncer.push(ev("/in/grow.log", ChangeKind::Changed), start + Duration::from_millis(5) * step);
        }
        assert_eq!(
            debouncer.next_deadline(),
            Some(start + window * MAX_HOLD_WINDOWS)
        );
    }

    #[test]
    fn zero_window_is_due_immediately() {
        let mut debouncer = Debouncer::new(Duration::ZERO);
        let now = Instant::now();
        debouncer.push(ev("/in/a.txt", ChangeKind::Created), now);
        assert_eq!(debouncer.drain_due(now).len(), 1);
    }

    #[test]
    fn same_path_always_maps_to_same_worker() {
        let path = Path::new("/in/a.txt");
        let first = worker_index(path, 4);
        for _ in 0..10 {
            assert_eq!(worker_index(path, 4), first);
        }
        assert!(first < 4);
        assert_eq!(worker_index(path, 1), 0);
    }

    #[tokio::test]
    async fn cancelled_pool_drops_queued_events() {
        let fixture = PoolFixture::new(true);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pool = fixture.spawn(tx);

        for name in ["a.pdf", "b.pdf", "c.pdf"] {
            pool.dispatch(fixture.event_for(name)).await.unwrap();
        }
        assert_eq!(pool.dispatched(), 3);
        pool.shutdown().await;

        assert_eq!(fixture.calls.load(Ordering::SeqCst), 0);
        assert!(rx.recv().await.is_none(), "no outcome may be reported");
        assert!(!fixture.destination.path().join("a.pdf").exists());
    }

    #[tokio::test]
    async fn running_pool_copies_dispatched_event() {
        let fixture = PoolFixture::new(false);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pool = fixture.spawn(tx);

        pool.dispatch(fixture.event_for("a.pdf")).await.unwrap();
        pool.shutdown().await;

        assert_eq!(fixture.calls.load(Ordering::SeqCst), 1);
        let outcome = rx.recv().await.expect("one outcome");
        assert_eq!(outcome.result, CopyResult::Copied);
        assert!(rx.recv().await.is_none());
        assert!(fixture.destination.path().join("a.pdf").is_file());
    }
}
