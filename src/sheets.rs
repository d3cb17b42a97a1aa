//! Shared Google Sheet tabs, read through the spreadsheet's CSV export link.

use crate::changes;
use crate::stats::{self, Summary};
use crate::table::WideTable;
use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use reqwest::Client;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

const SHEETS_BASE: &str = "https://docs.google.com/spreadsheets/d";

pub const DEFAULT_SHEET_ID: &str = "1P6SV2hYDgfA0Nkv2FI9NA-siYOdB8YLsQnCv5QsFEhI";

pub const DEFAULT_TABS: [&str; 9] = [
    "Europe GDP Forecast",
    "Europe GDP Annual",
    "Europe HICP Forecast",
    "Europe HICP Annual",
    "Rates-Imported",
    "EU HICP Data-Imported",
    "EU GDP-Imported",
    "US GDP Data-Imported",
    "US PCE Data-Imported",
];

#[derive(Debug, Clone, PartialEq)]
pub struct SheetTab {
    pub name: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl SheetTab {
    /// First record is the header; short records are padded to the header width.
    pub fn from_csv(name: &str, body: &[u8]) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(body);

        let mut records = reader.records();
        let header: Vec<String> = match records.next() {
            Some(rec) => rec
                .with_context(|| format!("Invalid CSV header in tab '{}'", name))?
                .iter()
                .map(|s| s.trim().to_string())
                .collect(),
            None => return Err(anyhow!("Tab '{}' is empty", name)),
        };

        let mut rows = Vec::new();
        for rec in records {
            let rec = rec.with_context(|| format!("Invalid CSV row in tab '{}'", name))?;
            let mut row: Vec<String> = rec.iter().map(str::to_string).collect();
            row.resize(header.len().max(row.len()), String::new());
            rows.push(row);
        }

        Ok(SheetTab { name: name.to_string(), header, rows })
    }

    pub fn head(&self, n: usize) -> &[Vec<String>] {
        &self.rows[..n.min(self.rows.len())]
    }

    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.header.iter().position(|h| h == name)?;
        Some(self.rows.iter().map(|r| r.get(idx).map(String::as_str).unwrap_or("")).collect())
    }

    pub fn numeric_column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        self.column(name).map(|cells| cells.into_iter().map(parse_cell).collect())
    }

    /// Summary of every column holding at least one numeric cell.
    pub fn describe(&self) -> Vec<(String, Summary)> {
        self.header
            .iter()
            .filter_map(|h| {
                let values = self.numeric_column(h)?;
                stats::describe(&values).map(|s| (h.clone(), s))
            })
            .collect()
    }

    /// 1-period percent change of a numeric column; missing cells break the chain on both sides.
    pub fn returns(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let values: Vec<f64> = self
            .numeric_column(name)?
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect();
        Some(
            changes::pct_change(&values, 1)
                .into_iter()
                .map(|r| r.filter(|v| v.is_finite()))
                .collect(),
        )
    }

    /// Rows keyed by the year in `year_column` (January 1st), one column per other header with
    /// at least one numeric cell. Rows without a readable year are dropped; a repeated year keeps
    /// the later row.
    pub fn by_year(&self, year_column: &str) -> Option<WideTable> {
        let year_idx = self.header.iter().position(|h| h == year_column)?;
        let cell = |row: &Vec<String>, i: usize| row.get(i).and_then(|c| parse_cell(c));

        let cols: Vec<usize> = (0..self.header.len())
            .filter(|&i| i != year_idx && self.rows.iter().any(|r| cell(r, i).is_some()))
            .collect();

        let mut rows: BTreeMap<NaiveDate, Vec<Option<f64>>> = BTreeMap::new();
        for row in &self.rows {
            let Some(date) = cell(row, year_idx)
                .filter(|y| y.fract() == 0.0 && (1.0..=9999.0).contains(y))
                .and_then(|y| NaiveDate::from_ymd_opt(y as i32, 1, 1))
            else {
                continue;
            };
            rows.insert(date, cols.iter().map(|&i| cell(row, i)).collect());
        }

        Some(WideTable { columns: cols.iter().map(|&i| self.header[i].clone()).collect(), rows })
    }
}

/// Spreadsheet number cell: "1,234.5", "1.234,5", "12,345", "2,9", "3.1%".
///
/// A separator counts as thousands grouping only when it splits the integer part into valid
/// 3-digit groups; otherwise a lone comma is the decimal mark. Anything else is missing.
pub fn parse_cell(cell: &str) -> Option<f64> {
    let t = cell.trim().trim_end_matches('%').trim();
    if t.is_empty() {
        return None;
    }
    if let Ok(v) = t.parse::<f64>() {
        return v.is_finite().then_some(v);
    }

    let (sign, digits) = match t.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", t.strip_prefix('+').unwrap_or(t)),
    };

    let (int_part, frac_part) = match (digits.rfind('.'), digits.rfind(',')) {
        // both present: the later one is the decimal mark, the other groups thousands
        (Some(dot), Some(comma)) => {
            let (at, group_sep) = if dot > comma { (dot, ',') } else { (comma, '.') };
            (ungroup(&digits[..at], group_sep)?, Some(&digits[at + 1..]))
        }
        (None, Some(_)) if digits.matches(',').count() == 1 => match ungroup(digits, ',') {
            Some(whole) => (whole, None),
            None => {
                let (whole, frac) = digits.split_once(',')?;
                (ungroup(whole, ',')?, Some(frac))
            }
        },
        (None, Some(_)) => (ungroup(digits, ',')?, None),
        (Some(_), None) => (ungroup(digits, '.')?, None),
        (None, None) => return None,
    };

    let text = match frac_part {
        Some(frac) if !frac.is_empty() && frac.bytes().all(|b| b.is_ascii_digit()) => {
            format!("{}{}.{}", sign, int_part, frac)
        }
        Some(_) => return None,
        None => format!("{}{}", sign, int_part),
    };
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Integer digits with optional `sep` between 3-digit groups ("1,234,567" -> "1234567").
fn ungroup(s: &str, sep: char) -> Option<String> {
    let groups: Vec<&str> = s.split(sep).collect();
    let all_digits = |g: &str| !g.is_empty() && g.bytes().all(|b| b.is_ascii_digit());
    if !groups.iter().all(|g| all_digits(*g)) {
        return None;
    }
    if let [first, rest @ ..] = groups.as_slice() {
        if !rest.is_empty() && (first.len() > 3 || first.starts_with('0') || rest.iter().any(|g| g.len() != 3)) {
            return None;
        }
    }
    Some(groups.concat())
}

#[derive(Debug, Clone)]
pub struct SheetsClient {
    http: Client,
    base_url: String,
}

impl SheetsClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("eurostat-macro/", env!("CARGO_PKG_VERSION"), " (rust reqwest)"))
            .timeout(timeout)
            .build()
            .context("Failed to build Sheets HTTP client")?;
        Ok(SheetsClient { http, base_url: SHEETS_BASE.to_string() })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub async fn load_tab(&self, sheet_id: &str, tab: &str) -> Result<SheetTab> {
        let url = format!("{}/{}/gviz/tq", self.base_url, sheet_id);
        let resp = self
            .http
            .get(url)
            .query(&[("tqx", "out:csv"), ("sheet", tab)])
            .send()
            .await
            .with_context(|| format!("HTTP error fetching tab '{}'", tab))?
            .error_for_status()
            .with_context(|| format!("Tab '{}' returned non-OK status", tab))?;

        let body = resp.bytes().await?;
        SheetTab::from_csv(tab, &body)
    }

    /// Load every tab, skipping (and logging) those that fail.
    pub async fn load_tabs(&self, sheet_id: &str, tabs: &[String]) -> Vec<SheetTab> {
        let mut out = Vec::new();
        for tab in tabs {
            match self.load_tab(sheet_id, tab).await {
                Ok(t) => {
                    info!(tab = %tab, rows = t.rows.len(), "tab loaded");
                    out.push(t);
                }
                Err(e) => warn!(tab = %tab, error = %format!("{:#}", e), "tab skipped"),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    const CSV: &str = "\"Year\",\"Euro area\",\"Italy\",\"Note\"\n\
                       \"1999\",\"2.907\",\"1,62880629\",\"a\"\n\
                       \"2000\",\"4.034\",\"4.205\",\"\"\n\
                       \"2001\",\"2.157\"\n";

    #[test]
    fn parses_header_and_pads_short_rows() {
        let tab = SheetTab::from_csv("Europe Countries GDP", CSV.as_bytes()).unwrap();
        assert_eq!(tab.header, vec!["Year", "Euro area", "Italy", "Note"]);
        assert_eq!(tab.rows.len(), 3);
        assert_eq!(tab.rows[2], vec!["2001", "2.157", "", ""]);
        assert_eq!(tab.head(2).len(), 2);
        assert_eq!(tab.head(10).len(), 3);
    }

    #[test]
    fn numeric_columns_tolerate_locale_noise() {
        let tab = SheetTab::from_csv("t", CSV.as_bytes()).unwrap();
        let italy = tab.numeric_column("Italy").unwrap();
        assert_relative_eq!(italy[0].unwrap(), 1.62880629);
        assert_relative_eq!(italy[1].unwrap(), 4.205);
        assert_eq!(italy[2], None);
        assert!(tab.numeric_column("Missing").is_none());
    }

    #[test]
    fn describe_skips_text_columns() {
        let tab = SheetTab::from_csv("t", CSV.as_bytes()).unwrap();
        let names: Vec<String> = tab.describe().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Year", "Euro area", "Italy"]);
    }

    #[rstest]
    #[case("1,234.5", Some(1234.5))]
    #[case("1.234,5", Some(1234.5))]
    #[case("12,345", Some(12345.0))]
    #[case("1,234,567", Some(1234567.0))]
    #[case("1.234.567", Some(1234567.0))]
    #[case("-1.234,5", Some(-1234.5))]
    #[case("2,9", Some(2.9))]
    #[case("0,123", Some(0.123))]
    #[case(" 3.1% ", Some(3.1))]
    #[case("-0.5", Some(-0.5))]
    #[case("12,34,567", None)]
    #[case("1,2,3", None)]
    #[case("1,", None)]
    #[case("n/a", None)]
    #[case("", None)]
    fn cell_parsing(#[case] cell: &str, #[case] expected: Option<f64>) {
        assert_eq!(parse_cell(cell), expected);
    }

    #[test]
    fn returns_follow_row_order_and_skip_gaps() {
        let csv = "Date,Price\n2024-01-02,100\n2024-01-03,110\n2024-01-04,\n2024-01-05,121\n2024-01-08,99\n";
        let tab = SheetTab::from_csv("prices", csv.as_bytes()).unwrap();
        let r = tab.returns("Price").unwrap();
        assert_eq!(r.len(), 5);
        assert_eq!(r[0], None);
        assert_relative_eq!(r[1].unwrap(), 10.0, epsilon = 1e-9);
        assert_eq!(r[2], None);
        assert_eq!(r[3], None);
        assert_relative_eq!(r[4].unwrap(), (99.0 / 121.0 - 1.0) * 100.0, epsilon = 1e-9);
        assert!(tab.returns("Volume").is_none());
    }

    #[test]
    fn by_year_keys_rows_on_the_year_column() {
        let tab = SheetTab::from_csv("t", CSV.as_bytes()).unwrap();
        let wide = tab.by_year("Year").unwrap();
        assert_eq!(wide.columns, vec!["Euro area", "Italy"]);
        assert_eq!(wide.rows.len(), 3);

        let y2000 = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
        assert_eq!(wide.rows[&y2000], vec![Some(4.034), Some(4.205)]);
        let y2001 = NaiveDate::from_ymd_opt(2001, 1, 1).unwrap();
        assert_eq!(wide.rows[&y2001], vec![Some(2.157), None]);

        let italy = wide.select(&["Italy"]);
        assert_eq!(italy.rows.len(), 2);
        assert!(tab.by_year("Anno").is_none());
    }

    #[test]
    fn by_year_drops_rows_without_a_year() {
        let csv = "Year,EA\n1999,1.0\nTotal,9.0\n2000.5,2.0\n2000,3.0\n";
        let wide = SheetTab::from_csv("t", csv.as_bytes()).unwrap().by_year("Year").unwrap();
        let years: Vec<i32> = wide.rows.keys().map(|d| chrono::Datelike::year(d)).collect();
        assert_eq!(years, vec![1999, 2000]);
    }

    #[test]
    fn empty_body_is_an_error() {
        assert!(SheetTab::from_csv("t", b"").is_err());
    }
}
