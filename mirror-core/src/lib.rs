//! Mirror core library: configuration, source path resolution, shared types.
//!
//! - [`config`]: typed [`Config`], load / validate / default file
//! - [`locale`]: [`MonthLocale`] month-name rendering
//! - [`resolve`]: effective source path (optional `{year}/{month}` folder)
//! - [`types`]: watch events and copy outcomes shared by sync and daemon
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod locale;
pub mod resolve;
pub mod types;

pub use config::{Config, StartupPolicy};
pub use error::ConfigError;
pub use locale::MonthLocale;
pub use resolve::{resolve, resolve_now};
pub use types::{ChangeKind, CopyOutcome, CopyResult, WatchEvent};
