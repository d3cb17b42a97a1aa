//! Trailing percent changes per geo.

use crate::catalog::Frequency;
use crate::table::Observation;
use std::collections::BTreeMap;

/// `(v[i] / v[i - lag] - 1) * 100`, positionally. Undefined for the first `lag` points and on a zero base.
pub fn pct_change(values: &[f64], lag: usize) -> Vec<Option<f64>> {
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            if lag == 0 || i < lag {
                return None;
            }
            let base = values[i - lag];
            if base == 0.0 {
                None
            } else {
                Some((v / base - 1.0) * 100.0)
            }
        })
        .collect()
}

/// Fill `change` and `yoy` on every row. Rows are grouped by geo and ordered by date within each
/// group; the first occurrence order of geos is kept.
pub fn apply(rows: &mut Vec<Observation>, freq: Frequency) {
    let mut order: Vec<String> = Vec::new();
    let mut groups: BTreeMap<String, Vec<Observation>> = BTreeMap::new();
    for row in rows.drain(..) {
        if !groups.contains_key(&row.geo) {
            order.push(row.geo.clone());
        }
        groups.entry(row.geo.clone()).or_default().push(row);
    }

    let (short_lag, yoy_lag) = freq.change_lags();
    for geo in order {
        let Some(mut group) = groups.remove(&geo) else {
            continue;
        };
        group.sort_by_key(|o| o.date);

        let values: Vec<f64> = group.iter().map(|o| o.value).collect();
        let short = short_lag.map(|lag| pct_change(&values, lag));
        let yoy = pct_change(&values, yoy_lag);

        for (i, row) in group.iter_mut().enumerate() {
            row.change = short.as_ref().and_then(|s| s[i]);
            row.yoy = yoy[i];
        }
        rows.extend(group);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn obs(geo: &str, y: i32, m: u32, value: f64) -> Observation {
        Observation {
            date: NaiveDate::from_ymd_opt(y, m, 1).unwrap(),
            value,
            geo: geo.to_string(),
            indicator: "T".to_string(),
            change: None,
            yoy: None,
        }
    }

    #[test]
    fn pct_change_is_positional() {
        let out = pct_change(&[100.0, 110.0, 99.0, 0.0, 5.0], 1);
        assert_eq!(out[0], None);
        assert_relative_eq!(out[1].unwrap(), 10.0, epsilon = 1e-9);
        assert_relative_eq!(out[2].unwrap(), -10.0, epsilon = 1e-9);
        assert_relative_eq!(out[3].unwrap(), -100.0, epsilon = 1e-9);
        assert_eq!(out[4], None);
    }

    #[test]
    fn monthly_series_get_mom_and_yoy_after_enough_history() {
        let mut rows: Vec<Observation> = (0..14)
            .map(|i| obs("IT", 2023 + (i / 12) as i32, (i % 12) as u32 + 1, 100.0 + i as f64))
            .collect();
        rows.reverse();
        apply(&mut rows, Frequency::Monthly);

        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2023, 1, 1).unwrap());
        assert!(rows[0].change.is_none());
        assert_relative_eq!(rows[1].change.unwrap(), 1.0, epsilon = 1e-9);
        assert!(rows[..12].iter().all(|r| r.yoy.is_none()));
        assert_relative_eq!(rows[12].yoy.unwrap(), 12.0, epsilon = 1e-9);
        assert_relative_eq!(rows[13].yoy.unwrap(), 12.0 / 101.0 * 100.0, epsilon = 1e-9);
    }

    #[test]
    fn annual_series_only_carry_yoy() {
        let mut rows = vec![obs("DE", 2020, 1, 50.0), obs("DE", 2021, 1, 55.0)];
        apply(&mut rows, Frequency::Annual);
        assert!(rows.iter().all(|r| r.change.is_none()));
        assert_relative_eq!(rows[1].yoy.unwrap(), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn quarterly_yoy_looks_back_four_quarters() {
        let values = [100.0, 101.0, 102.0, 103.0, 110.0, 99.0];
        let mut rows: Vec<Observation> = values
            .iter()
            .enumerate()
            .map(|(i, &v)| obs("NL", 2022 + (i / 4) as i32, (i % 4) as u32 * 3 + 1, v))
            .collect();
        rows.swap(0, 5);
        apply(&mut rows, Frequency::Quarterly);

        assert_eq!(rows[4].date, NaiveDate::from_ymd_opt(2023, 1, 1).unwrap());
        assert!(rows[..4].iter().all(|r| r.yoy.is_none()));
        assert_relative_eq!(rows[4].yoy.unwrap(), 10.0, epsilon = 1e-9);
        assert_relative_eq!(rows[5].yoy.unwrap(), (99.0 / 101.0 - 1.0) * 100.0, epsilon = 1e-9);
        assert_relative_eq!(rows[4].change.unwrap(), (110.0 / 103.0 - 1.0) * 100.0, epsilon = 1e-9);
        assert_relative_eq!(rows[5].change.unwrap(), -10.0, epsilon = 1e-9);
    }

    #[test]
    fn groups_do_not_leak_into_each_other() {
        let mut rows = vec![
            obs("FR", 2024, 1, 10.0),
            obs("AT", 2024, 1, 1.0),
            obs("FR", 2024, 4, 20.0),
            obs("AT", 2024, 4, 2.0),
        ];
        apply(&mut rows, Frequency::Quarterly);
        let geos: Vec<&str> = rows.iter().map(|r| r.geo.as_str()).collect();
        assert_eq!(geos, ["FR", "FR", "AT", "AT"]);
        assert!(rows[0].change.is_none());
        assert!(rows[2].change.is_none());
        assert_relative_eq!(rows[1].change.unwrap(), 100.0, epsilon = 1e-9);
        assert_relative_eq!(rows[3].change.unwrap(), 100.0, epsilon = 1e-9);
    }
}
