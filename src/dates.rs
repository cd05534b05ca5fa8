use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::domain::CollatedRow;

/// How date columns are rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DateMode {
    /// `YYYY-MM-DD`; unparsable values become missing.
    #[default]
    Iso,
    /// Fractional year (`2023.169...`); unparsable values pass through.
    Decimal,
}

const YEAR_FIRST_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"];

// Month-first before day-first: "03/05/2023" is March 5th. Two-digit years are
// tried before four-digit ones so "23" is never read as year 23.
const DATE_FORMATS: &[&str] = &[
    "%m/%d/%y", "%m/%d/%Y", "%m-%d-%y", "%m-%d-%Y", "%m.%d.%y", "%m.%d.%Y", "%d/%m/%y",
    "%d/%m/%Y", "%d-%m-%y", "%d-%m-%Y", "%d.%m.%Y", "%d %b %Y", "%d-%b-%y", "%d-%b-%Y",
    "%b %d %Y", "%b %d, %Y", "%B %d %Y", "%B %d, %Y", "%d %B %Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
];

pub fn is_date_column(name: &str) -> bool {
    name.to_lowercase().contains("date")
}

/// Parses a calendar date from the formats seen in lab exports. Ambiguous
/// day/month values are read month-first.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    if value.len() == 8 && value.bytes().all(|b| b.is_ascii_digit()) {
        let year = value[..4].parse().ok()?;
        let month = value[4..6].parse().ok()?;
        let day = value[6..].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    let year_first = value.len() >= 4 && value.as_bytes()[..4].iter().all(u8::is_ascii_digit);
    let formats = if year_first {
        YEAR_FIRST_FORMATS
    } else {
        DATE_FORMATS
    };
    if let Some(date) = formats
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
    {
        return Some(date);
    }

    if let Some(datetime) = DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
    {
        return Some(datetime.date());
    }

    if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
        return Some(datetime.date_naive());
    }

    // Partial dates land on the first day of the period.
    if let Ok(date) = NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d") {
        return Some(date);
    }
    if value.len() == 4 && value.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDate::from_ymd_opt(value.parse().ok()?, 1, 1);
    }
    None
}

/// Year plus the fraction of the year elapsed before `date`.
pub fn year_fraction(date: NaiveDate) -> f64 {
    let year = date.year();
    let days_in_year = if NaiveDate::from_yo_opt(year, 366).is_some() {
        366.0
    } else {
        365.0
    };
    year as f64 + f64::from(date.ordinal0()) / days_in_year
}

/// Rewrites one cell. `None` means the value becomes missing.
pub fn normalize_value(raw: &str, mode: DateMode) -> Option<String> {
    match (mode, parse_date(raw)) {
        (DateMode::Iso, Some(date)) => Some(date.format("%Y-%m-%d").to_string()),
        (DateMode::Iso, None) => None,
        (DateMode::Decimal, Some(date)) => Some(year_fraction(date).to_string()),
        (DateMode::Decimal, None) => Some(raw.to_string()),
    }
}

/// Rewrites every field whose name contains "date" (any case).
pub fn normalize_dates(rows: Vec<CollatedRow>, mode: DateMode) -> Vec<CollatedRow> {
    rows.into_iter()
        .map(|mut row| {
            row.fields = row
                .fields
                .into_iter()
                .filter_map(|(name, value)| {
                    if !is_date_column(&name) {
                        return Some((name, value));
                    }
                    normalize_value(&value, mode).map(|value| (name, value))
                })
                .collect();
            row
        })
        .collect()
}
