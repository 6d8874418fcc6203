//! Period keys used to partition records into ingestion batches.
//!
//! Fetchers tag records either with a calendar date (`2026-01-15`) or an ISO
//! week. Weeks appear in two spellings: the canonical `2026-W03` and the
//! legacy short form `2026-03`. A filter on a week matches both spellings and
//! every date inside the week, so a weekly batch picks up daily records.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, Weekday};

use crate::models::ParseError;

/// A parsed period key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeriodKey {
    Date(NaiveDate),
    Week { year: i32, week: u32 },
}

impl PeriodKey {
    /// ISO week containing `date`.
    pub fn week_of(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        PeriodKey::Week {
            year: iso.year(),
            week: iso.week(),
        }
    }

    /// Monday of the week, or the date itself.
    pub fn start_date(&self) -> Option<NaiveDate> {
        match *self {
            PeriodKey::Date(d) => Some(d),
            PeriodKey::Week { year, week } => NaiveDate::from_isoywd_opt(year, week, Weekday::Mon),
        }
    }

    /// Every stored key this period matches.
    pub fn match_keys(&self) -> Vec<String> {
        match *self {
            PeriodKey::Date(d) => vec![d.format("%Y-%m-%d").to_string()],
            PeriodKey::Week { year, week } => {
                let mut keys = vec![
                    format!("{year}-W{week:02}"),
                    format!("{year}-{week:02}"),
                ];
                if let Some(monday) = self.start_date() {
                    for offset in 0..7 {
                        let day = monday + Duration::days(offset);
                        keys.push(day.format("%Y-%m-%d").to_string());
                    }
                }
                keys
            }
        }
    }
}

impl FromStr for PeriodKey {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || ParseError {
            kind: "period",
            value: s.to_string(),
        };

        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(PeriodKey::Date(date));
        }

        let (year_part, week_part) = s.split_once('-').ok_or_else(err)?;
        if year_part.len() != 4 {
            return Err(err());
        }
        let week_digits = week_part.strip_prefix('W').unwrap_or(week_part);
        if week_digits.len() != 2 || !week_digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }
        let year: i32 = year_part.parse().map_err(|_| err())?;
        let week: u32 = week_digits.parse().map_err(|_| err())?;

        // Rejects week 0 and week 53 in 52-week years.
        NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).ok_or_else(err)?;
        Ok(PeriodKey::Week { year, week })
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodKey::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            PeriodKey::Week { year, week } => write!(f, "{year}-W{week:02}"),
        }
    }
}

/// Expand a period filter into the set of stored period ids it matches.
///
/// Unparseable filters match only themselves.
pub fn expand_period(period: &str) -> Vec<String> {
    match period.parse::<PeriodKey>() {
        Ok(key) => key.match_keys(),
        Err(_) => vec![period.to_string()],
    }
}
