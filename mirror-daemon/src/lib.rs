//! Mirror service runtime: directory watcher, debounced worker pool, daily
//! restart, and the lifecycle that ties them together.

pub mod dispatch;
mod error;
pub mod restart;
mod runtime;
pub mod scheduler;
mod service;
pub mod watcher;

pub use dispatch::{Debouncer, WorkerContext, WorkerPool};
pub use error::DaemonError;
pub use restart::{ProcessRestarter, Restarter};
pub use runtime::{init_tracing, start_blocking, LOG_FORMAT_ENV};
pub use scheduler::{compute_initial_delay, RestartSchedule, RESTART_INTERVAL};
pub use service::{run, ExitReason, MirrorService, StartOptions};
pub use watcher::DirectoryWatcher;
