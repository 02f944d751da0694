//! # mirror-sync
//!
//! Single-file copy with skip-if-exists policy, classified retries, and an
//! all-or-nothing temp-file-and-rename transfer.
//!
//! Build a [`CopyExecutor`] from a [`RetryPolicy`] and call
//! [`CopyExecutor::copy`] once per watch event. It never returns an error:
//! every failure is folded into the returned `CopyOutcome`.

pub mod error;
pub mod executor;
pub mod transfer;

pub use error::{classify, CopyError, ErrorClass};
pub use executor::{CopyExecutor, RetryPolicy};
pub use transfer::{temp_path_for, FsTransfer, Placement, Transfer, WriteMode, TEMP_SUFFIX};
