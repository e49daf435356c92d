use std::fmt;
use std::str::FromStr;

use crate::error::ScoutError;

const DAYS_IN_MONTH: [u8; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Temporal holdout cutoff: only data posted on or before this date is considered.
///
/// Accepts `YYYY`, `YYYY-MM` or `YYYY-MM-DD`; partial dates expand to the first day.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateCutoff(String);

impl DateCutoff {
    pub fn parse(value: &str) -> Result<Self, ScoutError> {
        validate_date(value).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DateCutoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DateCutoff {
    type Err = ScoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn is_leap_year(year: u32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn expand_partial(value: &str) -> Result<String, ScoutError> {
    let v = value.trim();
    let invalid = || {
        ScoutError::InvalidArgument("--before accepts YYYY, YYYY-MM, or YYYY-MM-DD format".into())
    };
    if v.is_empty() {
        return Err(invalid());
    }

    if v.len() == 4 && v.chars().all(|c| c.is_ascii_digit()) {
        return Ok(format!("{v}-01-01"));
    }

    if v.len() == 7 {
        let bytes = v.as_bytes();
        if bytes[4] == b'-'
            && v.chars()
                .enumerate()
                .all(|(i, c)| i == 4 || c.is_ascii_digit())
        {
            return Ok(format!("{v}-01"));
        }
    }

    if v.len() == 10 {
        return Ok(v.to_string());
    }

    Err(invalid())
}

fn validate_date(value: &str) -> Result<String, ScoutError> {
    let normalized = expand_partial(value)?;
    let v = normalized.as_str();

    let bytes = v.as_bytes();
    if bytes[4] != b'-'
        || bytes[7] != b'-'
        || !v
            .chars()
            .enumerate()
            .all(|(i, c)| (i == 4 || i == 7) || c.is_ascii_digit())
    {
        return Err(ScoutError::InvalidArgument(
            "--before must be in YYYY-MM-DD format".into(),
        ));
    }

    let year: u32 = v[0..4]
        .parse()
        .map_err(|_| ScoutError::InvalidArgument("Invalid year in --before".into()))?;
    let month: u32 = v[5..7]
        .parse()
        .map_err(|_| ScoutError::InvalidArgument("Invalid month in --before".into()))?;
    let day: u32 = v[8..10]
        .parse()
        .map_err(|_| ScoutError::InvalidArgument("Invalid day in --before".into()))?;

    if !(1..=12).contains(&month) {
        return Err(ScoutError::InvalidArgument(format!(
            "Invalid month {month} in --before (must be 01-12)"
        )));
    }

    let max_day = if month == 2 && is_leap_year(year) {
        29
    } else {
        DAYS_IN_MONTH[(month - 1) as usize]
    };
    if day < 1 || day > max_day as u32 {
        return Err(ScoutError::InvalidArgument(format!(
            "Invalid day {day} for month {month} in --before"
        )));
    }

    Ok(normalized)
}
