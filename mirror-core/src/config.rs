//! Typed service configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.mirror/
//!   config.yaml   (mode 0600, written with defaults on first start)
//! ```
//!
//! `MIRROR_CONFIG` overrides the location. Keys from the legacy settings file
//! (`SourcePath`, `DestinationPath`, `UseGermanMonths`, `RestartTime`) are
//! accepted as aliases.
//!
//! # API pattern
//!
//! Every function that touches the filesystem has an `_at(home: &Path, …)`
//! form used by tests, and a no-arg form that derives home from
//! `dirs::home_dir()`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};
use crate::locale::MonthLocale;

pub const CONFIG_DIR: &str = ".mirror";
pub const CONFIG_FILE: &str = "config.yaml";
pub const CONFIG_ENV: &str = "MIRROR_CONFIG";

const DEFAULT_HEADER: &str = "\
# mirror configuration
# source_path and destination_path must be set before the service will start.
";

/// What `start` does when the watcher cannot be brought up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartupPolicy {
    /// Log the failure and keep the process alive without a watcher.
    #[default]
    Degraded,
    /// Return the error and let the process exit.
    FailFast,
}

/// Service settings. Loaded once, validated once, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory to watch.
    #[serde(alias = "SourcePath")]
    pub source_path: PathBuf,
    /// Directory files are mirrored into.
    #[serde(alias = "DestinationPath")]
    pub destination_path: PathBuf,
    /// Append `{year}/{month name}` to `source_path`.
    #[serde(alias = "UseGermanMonths")]
    pub use_locale_month_folder: bool,
    pub month_locale: MonthLocale,
    /// Wall-clock hour (0-23) of the daily restart.
    #[serde(alias = "RestartTime")]
    pub restart_hour: u32,
    pub restart_enabled: bool,
    /// Total copy attempts per event, including the first.
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub debounce_ms: u64,
    pub workers: usize,
    pub queue_capacity: usize,
    pub startup_policy: StartupPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_path: PathBuf::new(),
            destination_path: PathBuf::new(),
            use_locale_month_folder: false,
            month_locale: MonthLocale::German,
            restart_hour: 4,
            restart_enabled: true,
            retry_attempts: 5,
            retry_delay_ms: 1000,
            debounce_ms: 500,
            workers: 4,
            queue_capacity: 256,
            startup_policy: StartupPolicy::Degraded,
        }
    }
}

impl Config {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Check every invariant the service relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyPath {
                field: "source_path",
            });
        }
        if self.destination_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyPath {
                field: "destination_path",
            });
        }
        if self.source_path == self.destination_path {
            return Err(ConfigError::Invalid {
                field: "destination_path",
                reason: "must differ from source_path".to_string(),
            });
        }
        if self.restart_hour > 23 {
            return Err(ConfigError::Invalid {
                field: "restart_hour",
                reason: format!("{} is not an hour of day (0-23)", self.restart_hour),
            });
        }
        if self.retry_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "retry_attempts",
                reason: "at least one attempt is required".to_string(),
            });
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid {
                field: "workers",
                reason: "at least one worker is required".to_string(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "queue_capacity",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.mirror/config.yaml`. Pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    home.join(CONFIG_DIR).join(CONFIG_FILE)
}

/// `$MIRROR_CONFIG` if set, otherwise `config_path_at(home_dir)`.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    Ok(config_path_at(&home()?))
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Parse and validate the config at `path`.
///
/// Returns `ConfigError::NotFound` if absent, `ConfigError::Parse` (with path)
/// if malformed, and the validation error if any invariant is broken.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    let config = parse_from(path)?;
    config.validate()?;
    Ok(config)
}

/// Read `path` without validating it. `config show` uses this so a fresh
/// default file can still be displayed.
pub fn parse_from(path: &Path) -> Result<Config, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            })
        }
        Err(err) => return Err(io_err(path, err)),
    };
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Load `<home>/.mirror/config.yaml`.
pub fn load_at(home: &Path) -> Result<Config, ConfigError> {
    load_from(&config_path_at(home))
}

/// Like [`load_from`], but writes a default file first when none exists.
///
/// The default has empty paths, so a fresh install fails validation with
/// `ConfigError::EmptyPath` until the user fills it in.
pub fn load_or_init_from(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        write_default_to(path)?;
    }
    load_from(path)
}

/// `load_or_init_from` under `<home>/.mirror/`.
pub fn load_or_init_at(home: &Path) -> Result<Config, ConfigError> {
    load_or_init_from(&config_path_at(home))
}

/// `load_or_init_from(config_path())`.
pub fn load_or_init() -> Result<Config, ConfigError> {
    load_or_init_from(&config_path()?)
}

// ---------------------------------------------------------------------------
// 3. Write
// ---------------------------------------------------------------------------

/// Serialize `config` to `path`, creating the parent directory.
pub fn save_to(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let yaml = render(config)?;
    std::fs::write(path, format!("{DEFAULT_HEADER}{yaml}")).map_err(|e| io_err(path, e))?;
    set_file_permissions(path)
}

/// `config` as YAML, without the file header.
pub fn render(config: &Config) -> Result<String, ConfigError> {
    Ok(serde_yaml::to_string(config)?)
}

/// Write `Config::default()` to `path`.
pub fn write_default_to(path: &Path) -> Result<(), ConfigError> {
    save_to(path, &Config::default())
}

/// `write_default_to` under `<home>/.mirror/`; returns the written path.
pub fn write_default_at(home: &Path) -> Result<PathBuf, ConfigError> {
    let path = config_path_at(home);
    write_default_to(&path)?;
    Ok(path)
}

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
