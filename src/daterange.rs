//! Reporting window resolution.
//!
//! Maps a named preset or an explicit pair of dates to the inclusive
//! `[since, until]` calendar window sent in the `time_range` parameter.
//! Presets are evaluated against the `today` passed in, so two calls a day
//! apart resolve to different windows; nothing is cached.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DateRangeError;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Named reporting windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DatePreset {
    Today,
    Yesterday,
    Last7Days,
    Last14Days,
    #[default]
    Last30Days,
    ThisWeek,
    LastWeek,
    ThisMonth,
    LastMonth,
}

impl DatePreset {
    pub const ALL: [DatePreset; 9] = [
        DatePreset::Today,
        DatePreset::Yesterday,
        DatePreset::Last7Days,
        DatePreset::Last14Days,
        DatePreset::Last30Days,
        DatePreset::ThisWeek,
        DatePreset::LastWeek,
        DatePreset::ThisMonth,
        DatePreset::LastMonth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DatePreset::Today => "today",
            DatePreset::Yesterday => "yesterday",
            DatePreset::Last7Days => "last7Days",
            DatePreset::Last14Days => "last14Days",
            DatePreset::Last30Days => "last30Days",
            DatePreset::ThisWeek => "thisWeek",
            DatePreset::LastWeek => "lastWeek",
            DatePreset::ThisMonth => "thisMonth",
            DatePreset::LastMonth => "lastMonth",
        }
    }

    /// Resolve against a given calendar day.
    ///
    /// Weeks start on Sunday. Month presets cover the whole calendar month,
    /// including days after `today` for `ThisMonth`.
    pub fn resolve(&self, today: NaiveDate) -> DateRange {
        let days_back = |n: i64| today - Duration::days(n);

        let (since, until) = match self {
            DatePreset::Today => (today, today),
            DatePreset::Yesterday => (days_back(1), days_back(1)),
            DatePreset::Last7Days => (days_back(7), today),
            DatePreset::Last14Days => (days_back(14), today),
            DatePreset::Last30Days => (days_back(30), today),
            DatePreset::ThisWeek => {
                let offset = i64::from(today.weekday().num_days_from_sunday());
                (days_back(offset), today)
            }
            DatePreset::LastWeek => {
                let offset = i64::from(today.weekday().num_days_from_sunday());
                (days_back(offset + 7), days_back(offset + 1))
            }
            DatePreset::ThisMonth => {
                let first = first_of_month(today);
                (first, last_of_month(first))
            }
            DatePreset::LastMonth => {
                let first_this = first_of_month(today);
                let first_prev = first_this
                    .checked_sub_months(Months::new(1))
                    .unwrap_or(first_this);
                (first_prev, last_of_month(first_prev))
            }
        };

        DateRange { since, until }
    }
}

impl FromStr for DatePreset {
    type Err = DateRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();

        DatePreset::ALL
            .into_iter()
            .find(|p| p.as_str().to_lowercase() == normalized)
            .ok_or_else(|| DateRangeError::UnknownPreset(s.to_string()))
    }
}

impl fmt::Display for DatePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An inclusive calendar window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub since: NaiveDate,
    pub until: NaiveDate,
}

impl DateRange {
    /// Build an explicit window. Inverted windows are rejected.
    pub fn custom(since: NaiveDate, until: NaiveDate) -> Result<Self, DateRangeError> {
        if since > until {
            return Err(DateRangeError::Inverted {
                since: since.format(DATE_FORMAT).to_string(),
                until: until.format(DATE_FORMAT).to_string(),
            });
        }
        Ok(Self { since, until })
    }

    /// Parse an explicit window from two `YYYY-MM-DD` strings.
    pub fn parse_custom(since: &str, until: &str) -> Result<Self, DateRangeError> {
        Self::custom(parse_date(since)?, parse_date(until)?)
    }

    /// Number of calendar days covered, both ends included.
    pub fn days(&self) -> i64 {
        (self.until - self.since).num_days() + 1
    }

    pub fn since_str(&self) -> String {
        self.since.format(DATE_FORMAT).to_string()
    }

    pub fn until_str(&self) -> String {
        self.until.format(DATE_FORMAT).to_string()
    }

    /// JSON value of the `time_range` query parameter.
    pub fn to_time_range_param(&self) -> String {
        serde_json::json!({
            "since": self.since_str(),
            "until": self.until_str(),
        })
        .to_string()
    }

    /// Human-readable label, e.g. `Sep 19, 2026 - Oct 19, 2026`.
    pub fn label(&self) -> String {
        format!(
            "{} - {}",
            self.since.format("%b %-d, %Y"),
            self.until.format("%b %-d, %Y")
        )
    }
}

/// Either a preset or an explicit pair, as chosen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSelection {
    Preset(DatePreset),
    Custom(DateRange),
}

impl Default for DateSelection {
    fn default() -> Self {
        DateSelection::Preset(DatePreset::default())
    }
}

impl DateSelection {
    /// Interpret loose query parameters.
    ///
    /// Explicit dates win over a preset; supplying only one of them is an
    /// error. With neither, the preset (default `last30Days`) is used.
    pub fn from_params(
        preset: Option<&str>,
        since: Option<&str>,
        until: Option<&str>,
    ) -> Result<Self, DateRangeError> {
        match (since, until) {
            (Some(since), Some(until)) => Ok(Self::Custom(DateRange::parse_custom(since, until)?)),
            (Some(_), None) | (None, Some(_)) => Err(DateRangeError::Incomplete),
            (None, None) => match preset {
                Some(p) if !p.trim().is_empty() => Ok(Self::Preset(p.parse()?)),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn resolve(&self, today: NaiveDate) -> DateRange {
        match self {
            DateSelection::Preset(preset) => preset.resolve(today),
            DateSelection::Custom(range) => *range,
        }
    }

    pub fn resolve_now(&self) -> DateRange {
        self.resolve(Utc::now().date_naive())
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, DateRangeError> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|_| DateRangeError::InvalidDate(s.to_string()))
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn last_of_month(first: NaiveDate) -> NaiveDate {
    first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn test_last_30_days() {
        let today = date("2024-03-15");
        let range = DatePreset::Last30Days.resolve(today);

        assert_eq!(range.until, today);
        assert_eq!(range.since, date("2024-02-14"));
        assert_eq!(range.days(), 31);

        // Same "now", same window
        assert_eq!(range, DatePreset::Last30Days.resolve(today));
    }

    #[test]
    fn test_default_preset_is_last_30_days() {
        assert_eq!(DatePreset::default(), DatePreset::Last30Days);
        assert_eq!(
            DateSelection::from_params(None, None, None).unwrap(),
            DateSelection::Preset(DatePreset::Last30Days)
        );
    }

    #[test]
    fn test_single_day_presets() {
        let today = date("2024-03-01");

        let range = DatePreset::Today.resolve(today);
        assert_eq!((range.since, range.until), (today, today));

        let range = DatePreset::Yesterday.resolve(today);
        assert_eq!(range.since, date("2024-02-29"));
        assert_eq!(range.until, date("2024-02-29"));
    }

    #[test]
    fn test_week_presets_start_on_sunday() {
        // 2024-03-13 is a Wednesday
        let today = date("2024-03-13");

        let this_week = DatePreset::ThisWeek.resolve(today);
        assert_eq!(this_week.since, date("2024-03-10"));
        assert_eq!(this_week.until, today);

        let last_week = DatePreset::LastWeek.resolve(today);
        assert_eq!(last_week.since, date("2024-03-03"));
        assert_eq!(last_week.until, date("2024-03-09"));
        assert_eq!(last_week.days(), 7);
    }

    #[test]
    fn test_month_presets() {
        let today = date("2024-03-13");

        let this_month = DatePreset::ThisMonth.resolve(today);
        assert_eq!(this_month.since, date("2024-03-01"));
        assert_eq!(this_month.until, date("2024-03-31"));

        let last_month = DatePreset::LastMonth.resolve(today);
        assert_eq!(last_month.since, date("2024-02-01"));
        assert_eq!(last_month.until, date("2024-02-29"));

        let january = DatePreset::LastMonth.resolve(date("2024-01-10"));
        assert_eq!(january.since, date("2023-12-01"));
        assert_eq!(january.until, date("2023-12-31"));
    }

    #[test]
    fn test_custom_range_rejects_inversion() {
        let err = DateRange::parse_custom("2024-03-10", "2024-03-01").unwrap_err();
        assert!(matches!(err, DateRangeError::Inverted { .. }));

        let ok = DateRange::parse_custom("2024-03-01", "2024-03-01").unwrap();
        assert_eq!(ok.days(), 1);
    }

    #[test]
    fn test_custom_range_rejects_bad_input() {
        assert_eq!(
            DateRange::parse_custom("03/01/2024", "2024-03-02").unwrap_err(),
            DateRangeError::InvalidDate("03/01/2024".to_string())
        );
        assert_eq!(
            DateSelection::from_params(None, Some("2024-03-01"), None).unwrap_err(),
            DateRangeError::Incomplete
        );
    }

    #[test]
    fn test_preset_parsing() {
        assert_eq!("last7Days".parse::<DatePreset>().unwrap(), DatePreset::Last7Days);
        assert_eq!("last_7_days".parse::<DatePreset>().unwrap(), DatePreset::Last7Days);
        assert_eq!("THISMONTH".parse::<DatePreset>().unwrap(), DatePreset::ThisMonth);
        assert!("fortnight".parse::<DatePreset>().is_err());
    }

    #[test]
    fn test_time_range_param() {
        let range = DateRange::parse_custom("2024-01-01", "2024-01-31").unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&range.to_time_range_param()).unwrap();

        assert_eq!(value["since"], "2024-01-01");
        assert_eq!(value["until"], "2024-01-31");
        assert_eq!(range.label(), "Jan 1, 2024 - Jan 31, 2024");
    }

    #[test]
    fn test_custom_selection_wins_over_preset() {
        let selection =
            DateSelection::from_params(Some("today"), Some("2024-01-01"), Some("2024-01-02"))
                .unwrap();
        let range = selection.resolve(date("2030-01-01"));

        assert_eq!(range.since, date("2024-01-01"));
        assert_eq!(range.until, date("2024-01-02"));
    }
}
