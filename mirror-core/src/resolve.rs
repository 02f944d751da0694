//! Effective source path.

use std::path::PathBuf;

use chrono::{Datelike, Local, NaiveDate};

use crate::config::Config;

/// The directory the watcher should subscribe to on `today`.
///
/// With `use_locale_month_folder` the result is
/// `source_path/{year}/{month name in month_locale}`; otherwise `source_path`
/// unchanged. Pure: the caller decides whether the path exists.
pub fn resolve(config: &Config, today: NaiveDate) -> PathBuf {
    if !config.use_locale_month_folder {
        return config.source_path.clone();
    }
    config
        .source_path
        .join(today.year().to_string())
        .join(config.month_locale.month_name(today))
}

/// [`resolve`] against the local calendar date.
pub fn resolve_now(config: &Config) -> PathBuf {
    resolve(config, Local::now().date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locale::MonthLocale;

    fn config(month_folder: bool) -> Config {
        Config {
            source_path: PathBuf::from("/data/scans"),
            destination_path: PathBuf::from("/backup/scans"),
            use_locale_month_folder: month_folder,
            ..Config::default()
        }
    }

    fn mid_march() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).expect("valid date")
    }

    #[test]
    fn without_month_folder_returns_source() {
        assert_eq!(resolve(&config(false), mid_march()), PathBuf::from("/data/scans"));
    }

    #[test]
    fn german_month_folder_is_appended() {
        assert_eq!(
            resolve(&config(true), mid_march()),
            PathBuf::from("/data/scans/2024/März")
        );
    }

    #[test]
    fn configured_locale_is_used() {
        let config = Config {
            month_locale: MonthLocale::English,
            ..config(true)
        };
        assert_eq!(
            resolve(&config, mid_march()),
            PathBuf::from("/data/scans/2024/March")
        );
    }

    #[test]
    fn year_boundary_uses_date_year() {
        let new_year = NaiveDate::from_ymd_opt(2025, 1, 1).expect("valid date");
        assert_eq!(
            resolve(&config(true), new_year),
            PathBuf::from("/data/scans/2025/Januar")
        );
    }
}
