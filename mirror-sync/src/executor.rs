//! Copy executor: skip-if-exists policy plus a bounded, classified retry loop.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use mirror_core::{ChangeKind, Config, CopyOutcome, CopyResult};

use crate::error::ErrorClass;
use crate::transfer::{FsTransfer, Placement, Transfer, WriteMode};

/// Attempt budget and spacing for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Never below 1.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.retry_attempts, config.retry_delay())
    }
}

/// Copies one file per call. Holds no per-call state, so a single executor
/// can be shared across workers.
#[derive(Debug)]
pub struct CopyExecutor<T: Transfer = FsTransfer> {
    transfer: T,
    policy: RetryPolicy,
    cancel: Option<Arc<AtomicBool>>,
}

impl CopyExecutor<FsTransfer> {
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_transfer(FsTransfer, policy)
    }
}

impl<T: Transfer> CopyExecutor<T> {
    pub fn with_transfer(transfer: T, policy: RetryPolicy) -> Self {
        Self {
            transfer,
            policy,
            cancel: None,
        }
    }

    /// Stop at the next retry boundary once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Mirror `source` to `dest`.
    ///
    /// A `Created` event never clobbers an existing destination; a `Changed`
    /// event always attempts the copy. Never fails: errors end up in the
    /// returned [`CopyOutcome`].
    pub fn copy(&self, source: &Path, dest: &Path, change_kind: ChangeKind) -> CopyOutcome {
        let file_name = dest
            .file_name()
            .or_else(|| source.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        if change_kind != ChangeKind::Changed && dest.exists() {
            tracing::debug!(file = %file_name, "destination exists, skipping");
            return CopyOutcome::new(file_name, CopyResult::SkippedExists, 0);
        }

        let mode = match change_kind {
            ChangeKind::Changed => WriteMode::Overwrite,
            ChangeKind::Created => WriteMode::NoClobber,
        };

        let mut attempt = 0u32;
        loop {
            if self.is_cancelled() {
                return CopyOutcome::new(file_name, CopyResult::Cancelled, attempt.saturating_sub(1));
            }
            attempt += 1;
            let retries = attempt - 1;

            let err = match self.transfer.transfer(source, dest, mode) {
                Ok(Placement::Written { bytes }) => {
                    tracing::debug!(file = %file_name, bytes, attempt, "transfer complete");
                    return CopyOutcome::new(file_name, CopyResult::Copied, retries);
                }
                Ok(Placement::DestinationExists) => {
                    return CopyOutcome::new(file_name, CopyResult::SkippedExists, retries);
                }
                Err(err) => err,
            };

            if err.class() == ErrorClass::Permanent {
                return CopyOutcome::new(
                    file_name,
                    CopyResult::FailedPermanent {
                        error: err.to_string(),
                    },
                    retries,
                );
            }

            if attempt >= self.policy.max_attempts {
                return CopyOutcome::new(
                    file_name,
                    CopyResult::FailedAfterRetries {
                        last_error: err.to_string(),
                    },
                    retries,
                );
            }

            tracing::warn!(
                file = %file_name,
                attempt,
                max_attempts = self.policy.max_attempts,
                error = %err,
                "transient copy failure, retrying",
            );
            sleep(self.policy.delay);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}
