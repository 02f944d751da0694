//! Service lifecycle: resolve the watch path, start the watcher and worker
//! pool, arm the daily restart, and tear it all down again.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use mirror_core::{resolve_now, Config, CopyOutcome, StartupPolicy};
use mirror_sync::{CopyExecutor, FsTransfer, RetryPolicy, Transfer};

use crate::dispatch::{run_dispatcher, WorkerContext, WorkerPool};
use crate::error::{io_err, DaemonError};
use crate::restart::Restarter;
use crate::scheduler::{self, RestartSchedule};
use crate::watcher::DirectoryWatcher;

/// Why [`run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Ctrl-C or SIGTERM.
    Shutdown,
    /// The daily restart fired and a replacement process is already running.
    Restarted,
}

/// Knobs for [`MirrorService::start_with`]. [`MirrorService::start`] uses
/// the local filesystem and the configured restart hour.
pub struct StartOptions<T: Transfer> {
    pub transfer: T,
    /// Receives a copy of every outcome in addition to the log line.
    pub outcomes: Option<mpsc::UnboundedSender<CopyOutcome>>,
    /// Overrides the schedule derived from `restart_hour`.
    pub restart_schedule: Option<RestartSchedule>,
}

impl Default for StartOptions<FsTransfer> {
    fn default() -> Self {
        Self {
            transfer: FsTransfer,
            outcomes: None,
            restart_schedule: None,
        }
    }
}

/// A running mirror. Owns the watch subscription, the worker pool and the
/// restart timer; nothing is global.
pub struct MirrorService {
    source: PathBuf,
    destination: PathBuf,
    cancel: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    watcher: Option<DirectoryWatcher>,
    pool: Option<Arc<WorkerPool>>,
    dispatcher: Option<JoinHandle<()>>,
    scheduler: Option<JoinHandle<()>>,
    restart_rx: Option<mpsc::Receiver<()>>,
    stopped: bool,
}

impl std::fmt::Debug for MirrorService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorService")
            .field("source", &self.source)
            .field("destination", &self.destination)
            .field("watching", &self.is_watching())
            .field("stopped", &self.stopped)
            .finish()
    }
}

impl MirrorService {
    pub async fn start(
        config: &Config,
        restarter: Arc<dyn Restarter>,
    ) -> Result<Self, DaemonError> {
        Self::start_with(config, restarter, StartOptions::default()).await
    }

    /// Start the service.
    ///
    /// A source directory that cannot be created is logged and startup goes
    /// on; a watcher that cannot start is handled per `startup_policy`.
    pub async fn start_with<T: Transfer + 'static>(
        config: &Config,
        restarter: Arc<dyn Restarter>,
        options: StartOptions<T>,
    ) -> Result<Self, DaemonError> {
        config.validate()?;

        let source = resolve_now(config);
        let destination = config.destination_path.clone();
        tracing::info!(
            source = %source.display(),
            destination = %destination.display(),
            "starting mirror service",
        );

        if let Err(err) = fs::create_dir_all(&source) {
            let err = io_err(&source, err);
            tracing::warn!(error = %err, "could not create source directory");
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let (shutdown_tx, _) = broadcast::channel::<()>(16);

        let mut service = Self {
            source,
            destination,
            cancel,
            shutdown_tx,
            watcher: None,
            pool: None,
            dispatcher: None,
            scheduler: None,
            restart_rx: None,
            stopped: false,
        };

        match DirectoryWatcher::start(&service.source) {
            Ok((watcher, raw_rx)) => {
                let executor = CopyExecutor::with_transfer(
                    options.transfer,
                    RetryPolicy::from_config(config),
                )
                .with_cancel_flag(service.cancel.clone());
                let pool = Arc::new(WorkerPool::spawn(
                    config.workers,
                    config.queue_capacity,
                    WorkerContext {
                        executor: Arc::new(executor),
                        destination: service.destination.clone(),
                        cancel: service.cancel.clone(),
                        outcomes: options.outcomes,
                    },
                ));
                let dispatcher = tokio::spawn(run_dispatcher(
                    raw_rx,
                    watcher.path().to_path_buf(),
                    config.debounce_window(),
                    pool.clone(),
                    service.shutdown_tx.subscribe(),
                ));
                service.watcher = Some(watcher);
                service.pool = Some(pool);
                service.dispatcher = Some(dispatcher);
            }
            Err(err) => match config.startup_policy {
                StartupPolicy::FailFast => return Err(err),
                StartupPolicy::Degraded => {
                    tracing::error!(
                        path = %service.source.display(),
                        error = %err,
                        "watcher failed to start, running without it",
                    );
                }
            },
        }

        if config.restart_enabled {
            let schedule = options
                .restart_schedule
                .unwrap_or_else(|| RestartSchedule::from_now(config.restart_hour));
            service.arm_restart(schedule, restarter);
        }

        Ok(service)
    }

    fn arm_restart(&mut self, schedule: RestartSchedule, restarter: Arc<dyn Restarter>) {
        let (restart_tx, restart_rx) = mpsc::channel::<()>(1);
        let on_fire = move || match restarter.spawn_replacement() {
            Ok(_) => {
                if restart_tx.try_send(()).is_err() {
                    tracing::debug!("restart already pending");
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "scheduled restart failed, still running");
            }
        };
        self.scheduler = Some(scheduler::arm(
            schedule,
            on_fire,
            self.shutdown_tx.subscribe(),
        ));
        self.restart_rx = Some(restart_rx);
    }

    /// Directory being watched, after month-folder resolution.
    pub fn source_path(&self) -> &Path {
        &self.source
    }

    pub fn destination_path(&self) -> &Path {
        &self.destination
    }

    pub fn is_watching(&self) -> bool {
        self.watcher
            .as_ref()
            .map(DirectoryWatcher::is_active)
            .unwrap_or(false)
    }

    /// Events handed to copy workers since start.
    pub fn dispatched(&self) -> u64 {
        self.pool.as_ref().map(|pool| pool.dispatched()).unwrap_or(0)
    }

    /// Resolves once a replacement process has been spawned. Never resolves
    /// when restarts are disabled.
    pub async fn restart_requested(&mut self) {
        if let Some(rx) = self.restart_rx.as_mut() {
            if rx.recv().await.is_some() {
                return;
            }
        }
        std::future::pending::<()>().await
    }

    /// Release the watch subscription, cancel in-flight retries, disarm the
    /// restart timer and wait for workers to drain. Safe to call repeatedly.
    pub async fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        self.cancel.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());

        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
        if let Some(handle) = self.dispatcher.take() {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "dispatcher task join failure");
            }
        }
        if let Some(handle) = self.scheduler.take() {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "restart timer join failure");
            }
        }
        if let Some(pool) = self.pool.take() {
            match Arc::try_unwrap(pool) {
                Ok(pool) => pool.shutdown().await,
                Err(_) => tracing::debug!("worker pool still shared, not waiting for workers"),
            }
        }
        tracing::info!(source = %self.source.display(), "mirror service stopped");
    }
}

impl Drop for MirrorService {
    fn drop(&mut self) {
        if !self.stopped {
            self.cancel.store(true, Ordering::SeqCst);
            let _ = self.shutdown_tx.send(());
        }
    }
}

/// Run until Ctrl-C, SIGTERM or the daily restart, then stop cleanly.
pub async fn run(
    config: &Config,
    restarter: Arc<dyn Restarter>,
) -> Result<ExitReason, DaemonError> {
    let mut service = MirrorService::start(config, restarter).await?;

    let reason = tokio::select! {
        signal = shutdown_signal() => signal.map(|()| {
            tracing::info!("shutdown signal received");
            ExitReason::Shutdown
        }),
        _ = service.restart_requested() => {
            tracing::info!("handing over to replacement process");
            Ok(ExitReason::Restarted)
        }
    };

    service.stop().await;
    reason
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<(), DaemonError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate =
        signal(SignalKind::terminate()).map_err(|e| io_err("SIGTERM handler", e))?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map_err(|e| io_err("ctrl-c handler", e)),
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<(), DaemonError> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| io_err("ctrl-c handler", e))
}
