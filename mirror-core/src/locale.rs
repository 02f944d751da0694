//! Month names rendered in a fixed locale, independent of the host locale.

use std::fmt;
use std::str::FromStr;

use chrono::{Locale, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Locale used for the `{year}/{month}` source subfolder.
///
/// Serialized as its short code (`de`, `en`, …). Parsing also accepts
/// POSIX-style tags such as `de_DE` or `de-AT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MonthLocale {
    #[default]
    German,
    English,
    French,
    Spanish,
    Italian,
    Dutch,
    Portuguese,
    Swedish,
}

impl MonthLocale {
    pub const ALL: [MonthLocale; 8] = [
        MonthLocale::German,
        MonthLocale::English,
        MonthLocale::French,
        MonthLocale::Spanish,
        MonthLocale::Italian,
        MonthLocale::Dutch,
        MonthLocale::Portuguese,
        MonthLocale::Swedish,
    ];

    pub fn code(self) -> &'static str {
        match self {
            MonthLocale::German => "de",
            MonthLocale::English => "en",
            MonthLocale::French => "fr",
            MonthLocale::Spanish => "es",
            MonthLocale::Italian => "it",
            MonthLocale::Dutch => "nl",
            MonthLocale::Portuguese => "pt",
            MonthLocale::Swedish => "sv",
        }
    }

    fn chrono_locale(self) -> Locale {
        match self {
            MonthLocale::German => Locale::de_DE,
            MonthLocale::English => Locale::en_US,
            MonthLocale::French => Locale::fr_FR,
            MonthLocale::Spanish => Locale::es_ES,
            MonthLocale::Italian => Locale::it_IT,
            MonthLocale::Dutch => Locale::nl_NL,
            MonthLocale::Portuguese => Locale::pt_PT,
            MonthLocale::Swedish => Locale::sv_SE,
        }
    }

    /// Full month name of `date` in this locale (`März` for German March).
    pub fn month_name(self, date: NaiveDate) -> String {
        let midnight = Utc.from_utc_datetime(&date.and_time(NaiveTime::default()));
        midnight
            .format_localized("%B", self.chrono_locale())
            .to_string()
    }
}

impl fmt::Display for MonthLocale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for MonthLocale {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let language = lowered
            .split(['_', '-', '.'])
            .next()
            .unwrap_or_default();
        match language {
            "de" | "german" | "deutsch" => Ok(MonthLocale::German),
            "en" | "english" => Ok(MonthLocale::English),
            "fr" | "french" => Ok(MonthLocale::French),
            "es" | "spanish" => Ok(MonthLocale::Spanish),
            "it" | "italian" => Ok(MonthLocale::Italian),
            "nl" | "dutch" => Ok(MonthLocale::Dutch),
            "pt" | "portuguese" => Ok(MonthLocale::Portuguese),
            "sv" | "swedish" => Ok(MonthLocale::Swedish),
            _ => Err(ConfigError::UnknownLocale(s.to_string())),
        }
    }
}

impl TryFrom<String> for MonthLocale {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MonthLocale> for String {
    fn from(locale: MonthLocale) -> Self {
        locale.code().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn march() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).expect("valid date")
    }

    #[rstest]
    #[case(MonthLocale::German, "März")]
    #[case(MonthLocale::English, "March")]
    #[case(MonthLocale::Dutch, "maart")]
    #[case(MonthLocale::Italian, "marzo")]
    fn renders_march(#[case] locale: MonthLocale, #[case] expected: &str) {
        assert_eq!(locale.month_name(march()), expected);
    }

    #[test]
    fn german_december() {
        let date = NaiveDate::from_ymd_opt(2023, 12, 1).expect("valid date");
        assert_eq!(MonthLocale::German.month_name(date), "Dezember");
    }

    #[rstest]
    #[case("de", MonthLocale::German)]
    #[case("de_DE", MonthLocale::German)]
    #[case("DE-at", MonthLocale::German)]
    #[case("en_US.UTF-8", MonthLocale::English)]
    #[case("sv", MonthLocale::Swedish)]
    fn parses_locale_tags(#[case] input: &str, #[case] expected: MonthLocale) {
        assert_eq!(input.parse::<MonthLocale>().expect("parse"), expected);
    }

    #[test]
    fn unknown_locale_is_rejected() {
        let err = "xx".parse::<MonthLocale>().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownLocale(ref s) if s == "xx"));
    }

    #[test]
    fn code_roundtrips_through_parse() {
        for locale in MonthLocale::ALL {
            assert_eq!(locale.code().parse::<MonthLocale>().expect("parse"), locale);
        }
    }
}
