//! Cell normalization for values that went through spreadsheet type coercion

use chrono::{Duration, NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref SCIENTIFIC: Regex = Regex::new(r"^-?\d+\.?\d*[Ee][+-]?\d+$").unwrap();
    static ref INTEGRAL_FLOAT: Regex = Regex::new(r"^-?\d+\.0+$").unwrap();
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M",
];

/// Spreadsheet serial day numbers accepted as dates (roughly 1954..2118).
const SERIAL_RANGE: std::ops::RangeInclusive<i64> = 20_000..=80_000;

/// Normalize an identifier-like cell. Numeric cells that a spreadsheet wrote
/// as `12345.0` or `1.2345E+4` become `12345`; everything else is trimmed.
pub fn normalize_identifier(raw: &str) -> String {
    let trimmed = raw.trim();
    if INTEGRAL_FLOAT.is_match(trimmed) {
        if let Some((int_part, _)) = trimmed.split_once('.') {
            return int_part.to_string();
        }
    }
    if SCIENTIFIC.is_match(trimmed) {
        if let Ok(value) = trimmed.parse::<f64>() {
            if value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15 {
                return format!("{:.0}", value);
            }
        }
    }
    trimmed.to_string()
}

/// Parse a date cell. Returns `None` for anything unrecognised.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(date);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(dt.date());
        }
    }

    // Excel serial date, optionally with a time fraction
    if let Ok(serial) = trimmed.parse::<f64>() {
        let days = serial.trunc() as i64;
        if serial.is_finite() && SERIAL_RANGE.contains(&days) {
            let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
            return epoch.checked_add_signed(Duration::days(days));
        }
    }

    None
}

/// Parse a numeric cell the way the store expects: integers as-is, finite
/// floats truncated to their integral part.
pub fn parse_integer(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<i64>() {
        return Some(value);
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() && value.abs() < 9.0e18 => Some(value.trunc() as i64),
        _ => None,
    }
}
