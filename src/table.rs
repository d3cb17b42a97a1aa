//! Long and wide tabular views of downloaded series, plus CSV export.

use crate::catalog::Frequency;
use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: f64,
    pub geo: String,
    pub indicator: String,
    /// Month-over-month or quarter-over-quarter change, in percent.
    pub change: Option<f64>,
    /// Year-over-year change, in percent.
    pub yoy: Option<f64>,
}

// ----------------------- Long format -----------------------
#[derive(Debug, Clone)]
pub struct IndicatorFrame {
    pub name: String,
    pub frequency: Frequency,
    pub rows: Vec<Observation>,
}

impl IndicatorFrame {
    pub fn new(name: &str, frequency: Frequency) -> Self {
        IndicatorFrame { name: name.to_string(), frequency, rows: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct geos in row order.
    pub fn geos(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for r in &self.rows {
            if !out.contains(&r.geo.as_str()) {
                out.push(&r.geo);
            }
        }
        out
    }

    pub fn rows_for<'a>(&'a self, geo: &'a str) -> impl Iterator<Item = &'a Observation> + 'a {
        self.rows.iter().filter(move |r| r.geo == geo)
    }

    /// Most recent observation of each geo, in geo order.
    pub fn latest_by_geo(&self) -> Vec<&Observation> {
        self.geos()
            .into_iter()
            .filter_map(|g| self.rows_for(g).max_by_key(|r| r.date))
            .collect()
    }

    pub fn header(&self) -> Vec<&'static str> {
        let mut h = vec!["date", "value", "geo", "group"];
        if let Some(c) = self.frequency.change_column() {
            h.push(c);
        }
        h.push("yoy_pct");
        h
    }

    pub fn write_csv<W: Write>(&self, out: W) -> Result<()> {
        let mut w = csv::Writer::from_writer(out);
        w.write_record(self.header())?;
        let has_change = self.frequency.change_column().is_some();
        for r in &self.rows {
            let mut rec = vec![
                r.date.format("%Y-%m-%d").to_string(),
                r.value.to_string(),
                r.geo.clone(),
                r.indicator.clone(),
            ];
            if has_change {
                rec.push(fmt_opt(r.change));
            }
            rec.push(fmt_opt(r.yoy));
            w.write_record(&rec)?;
        }
        w.flush()?;
        Ok(())
    }

    pub fn save_csv(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Cannot create {}", path.display()))?;
        self.write_csv(file)
            .with_context(|| format!("Failed writing {}", path.display()))
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}

// ----------------------- Wide format -----------------------
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WideTable {
    pub columns: Vec<String>,
    pub rows: BTreeMap<NaiveDate, Vec<Option<f64>>>,
}

/// Long to wide: one row per date, one column per `<INDICATOR>_<GEO>` series.
pub fn pivot_wide(frames: &[IndicatorFrame]) -> WideTable {
    let mut columns: Vec<String> = Vec::new();
    let mut col_idx: HashMap<String, usize> = HashMap::new();
    let mut cells: Vec<(NaiveDate, usize, f64)> = Vec::new();

    for frame in frames {
        for r in &frame.rows {
            let key = format!("{}_{}", frame.name, r.geo);
            let idx = *col_idx.entry(key.clone()).or_insert_with(|| {
                columns.push(key);
                columns.len() - 1
            });
            cells.push((r.date, idx, r.value));
        }
    }

    let width = columns.len();
    let mut rows: BTreeMap<NaiveDate, Vec<Option<f64>>> = BTreeMap::new();
    for (date, idx, value) in cells {
        rows.entry(date).or_insert_with(|| vec![None; width])[idx] = Some(value);
    }

    WideTable { columns, rows }
}

impl WideTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<Vec<(NaiveDate, f64)>> {
        let idx = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .filter_map(|(d, vals)| vals[idx].map(|v| (*d, v)))
                .collect(),
        )
    }

    /// Calendar-year resample keeping the last non-empty value of each column.
    /// Rows are keyed by January 1st of the year.
    pub fn annual_last(&self, since_year: Option<i32>) -> WideTable {
        let mut rows: BTreeMap<NaiveDate, Vec<Option<f64>>> = BTreeMap::new();
        for (date, vals) in &self.rows {
            if since_year.is_some_and(|y| date.year() < y) {
                continue;
            }
            let Some(key) = NaiveDate::from_ymd_opt(date.year(), 1, 1) else {
                continue;
            };
            let slot = rows.entry(key).or_insert_with(|| vec![None; self.columns.len()]);
            for (i, v) in vals.iter().enumerate() {
                if v.is_some() {
                    slot[i] = *v;
                }
            }
        }
        WideTable { columns: self.columns.clone(), rows }
    }

    /// Keep only the named columns, in the given order. Unknown names are skipped.
    pub fn select(&self, names: &[&str]) -> WideTable {
        let idx: Vec<usize> = names.iter().filter_map(|n| self.column_index(n)).collect();
        let rows = self
            .rows
            .iter()
            .map(|(d, vals)| (*d, idx.iter().map(|&i| vals[i]).collect::<Vec<_>>()))
            .filter(|(_, vals)| vals.iter().any(Option::is_some))
            .collect();
        WideTable { columns: idx.iter().map(|&i| self.columns[i].clone()).collect(), rows }
    }

    pub fn write_csv<W: Write>(&self, out: W) -> Result<()> {
        let mut w = csv::Writer::from_writer(out);
        let mut header = vec!["date".to_string()];
        header.extend(self.columns.iter().cloned());
        w.write_record(&header)?;
        for (date, vals) in &self.rows {
            let mut rec = vec![date.format("%Y-%m-%d").to_string()];
            rec.extend(vals.iter().map(|v| fmt_opt(*v)));
            w.write_record(&rec)?;
        }
        w.flush()?;
        Ok(())
    }

    pub fn save_csv(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Cannot create {}", path.display()))?;
        self.write_csv(file)
            .with_context(|| format!("Failed writing {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn row(ind: &str, geo: &str, date: NaiveDate, value: f64) -> Observation {
        Observation {
            date,
            value,
            geo: geo.into(),
            indicator: ind.into(),
            change: None,
            yoy: None,
        }
    }

    fn gdp_frame() -> IndicatorFrame {
        let mut f = IndicatorFrame::new("GDP", Frequency::Quarterly);
        f.rows = vec![
            row("GDP", "DE", d(2009, 10), 90.0),
            row("GDP", "DE", d(2010, 1), 100.0),
            row("GDP", "DE", d(2010, 10), 104.0),
            row("GDP", "FR", d(2010, 1), 80.0),
            row("GDP", "FR", d(2011, 4), 83.0),
        ];
        f
    }

    #[test]
    fn csv_header_depends_on_frequency() {
        let mut buf = Vec::new();
        gdp_frame().write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("date,value,geo,group,qoq_pct,yoy_pct"));
        assert_eq!(lines.next(), Some("2009-10-01,90,DE,GDP,,"));

        let annual = IndicatorFrame::new("Debt_GDP", Frequency::Annual);
        assert_eq!(annual.header(), vec!["date", "value", "geo", "group", "yoy_pct"]);
    }

    #[test]
    fn latest_by_geo_picks_max_date() {
        let f = gdp_frame();
        assert_eq!(f.geos(), vec!["DE", "FR"]);
        let latest = f.latest_by_geo();
        assert_eq!(latest[0].date, d(2010, 10));
        assert_eq!(latest[1].value, 83.0);
    }

    #[test]
    fn pivot_builds_one_column_per_series() {
        let mut hicp = IndicatorFrame::new("HICP", Frequency::Monthly);
        hicp.rows = vec![row("HICP", "DE", d(2010, 1), 1.5)];
        let wide = pivot_wide(&[gdp_frame(), hicp]);

        assert_eq!(wide.columns, vec!["GDP_DE", "GDP_FR", "HICP_DE"]);
        assert_eq!(wide.rows.len(), 4);
        assert_eq!(wide.rows[&d(2010, 1)], vec![Some(100.0), Some(80.0), Some(1.5)]);
        assert_eq!(wide.rows[&d(2011, 4)], vec![None, Some(83.0), None]);
    }

    #[test]
    fn annual_last_keeps_last_value_per_year() {
        let wide = pivot_wide(&[gdp_frame()]);
        let annual = wide.annual_last(Some(2010));
        assert_eq!(annual.rows.len(), 2);
        assert_eq!(annual.rows[&d(2010, 1)], vec![Some(104.0), Some(80.0)]);
        assert_eq!(annual.rows[&d(2011, 1)], vec![None, Some(83.0)]);

        let all = wide.annual_last(None);
        assert_eq!(all.rows[&d(2009, 1)], vec![Some(90.0), None]);
    }

    #[test]
    fn select_drops_unknown_and_empty_rows() {
        let wide = pivot_wide(&[gdp_frame()]);
        let fr = wide.select(&["GDP_FR", "GDP_ES"]);
        assert_eq!(fr.columns, vec!["GDP_FR"]);
        assert_eq!(fr.rows.len(), 2);
        assert_eq!(wide.column("GDP_FR").unwrap(), vec![(d(2010, 1), 80.0), (d(2011, 4), 83.0)]);
    }
}
