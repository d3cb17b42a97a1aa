//! Period labels as published by Eurostat ("2024-03", "2024-Q1", "2024") to calendar dates.

use crate::catalog::Frequency;
use chrono::{Datelike, NaiveDate};

/// Start date of the period named by `label`, or `None` if the label does not match `freq`.
pub fn parse_period(label: &str, freq: Frequency) -> Option<NaiveDate> {
    let t = label.trim();
    match freq {
        Frequency::Monthly => parse_month(t),
        Frequency::Quarterly => parse_quarter(t),
        Frequency::Annual => parse_year(t).and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1)),
    }
}

fn parse_year(s: &str) -> Option<i32> {
    if s.len() != 4 || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn parse_number(s: &str, max: u32) -> Option<u32> {
    if s.is_empty() || s.len() > 2 || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let n: u32 = s.parse().ok()?;
    (1..=max).contains(&n).then_some(n)
}

// "2024-03", "2024M03", "2024-M03"
fn parse_month(s: &str) -> Option<NaiveDate> {
    if s.len() < 6 || !s.is_char_boundary(4) {
        return None;
    }
    let (y, rest) = s.split_at(4);
    let year = parse_year(y)?;
    let rest = rest.strip_prefix('-').unwrap_or(rest);
    let rest = rest.strip_prefix('M').unwrap_or(rest);
    if rest.len() != 2 {
        return None;
    }
    let month = parse_number(rest, 12)?;
    NaiveDate::from_ymd_opt(year, month, 1)
}

// "2024-Q1", "2024Q1"
fn parse_quarter(s: &str) -> Option<NaiveDate> {
    if s.len() < 6 || !s.is_char_boundary(4) {
        return None;
    }
    let (y, rest) = s.split_at(4);
    let year = parse_year(y)?;
    let rest = rest.strip_prefix('-').unwrap_or(rest);
    let q = parse_number(rest.strip_prefix('Q')?, 4)?;
    NaiveDate::from_ymd_opt(year, (q - 1) * 3 + 1, 1)
}

/// Position on a continuous year axis, e.g. 2024-04-01 -> 2024.25.
pub fn fractional_year(d: NaiveDate) -> f64 {
    d.year() as f64 + (d.month0() as f64) / 12.0
}
