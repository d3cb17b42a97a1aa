//! SVG charts: per-geo line charts of an indicator, grouped annual bar charts and histograms.

use crate::period::fractional_year;
use crate::table::{IndicatorFrame, WideTable};
use anyhow::{anyhow, Result};
use chrono::Datelike;
use plotters::prelude::*;
use std::path::Path;

const SIZE: (u32, u32) = (1200, 600);

/// Padded (min, max) of the values; a flat series gets a unit band around it.
pub fn value_bounds<I: IntoIterator<Item = f64>>(values: I) -> Option<(f64, f64)> {
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return None;
    }
    if (hi - lo).abs() < f64::EPSILON {
        return Some((lo - 1.0, hi + 1.0));
    }
    let pad = (hi - lo) * 0.05;
    Some((lo - pad, hi + pad))
}

pub fn line_chart(frame: &IndicatorFrame, geos: &[String], path: &Path) -> Result<()> {
    let series: Vec<(&str, Vec<(f64, f64)>)> = frame
        .geos()
        .into_iter()
        .filter(|g| geos.is_empty() || geos.iter().any(|s| s == *g))
        .map(|g| {
            let pts: Vec<(f64, f64)> = frame.rows_for(g).map(|r| (fractional_year(r.date), r.value)).collect();
            (g, pts)
        })
        .collect();

    let all = series.iter().flat_map(|(_, pts)| pts.iter());
    let (x_lo, x_hi) = value_bounds(all.clone().map(|p| p.0))
        .ok_or_else(|| anyhow!("No observations to plot for {}", frame.name))?;
    let (y_lo, y_hi) = value_bounds(all.map(|p| p.1))
        .ok_or_else(|| anyhow!("No observations to plot for {}", frame.name))?;

    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("{} ({})", frame.name, frame.frequency), ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)?;

    chart
        .configure_mesh()
        .x_desc("Year")
        .y_desc("Value")
        .x_label_formatter(&|x| format!("{:.0}", x))
        .draw()?;

    for (i, (geo, pts)) in series.iter().enumerate() {
        let style = Palette99::pick(i).stroke_width(2);
        chart
            .draw_series(LineSeries::new(pts.iter().copied(), style))?
            .label(*geo)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], style));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

/// One group of bars per year (row), one bar per column.
pub fn annual_bar_chart(table: &WideTable, title: &str, path: &Path) -> Result<()> {
    if table.rows.is_empty() || table.columns.is_empty() {
        return Err(anyhow!("Nothing to plot for '{}'", title));
    }

    let years: Vec<i32> = table.rows.keys().map(|d| d.year()).collect();
    // bars start at zero, so the axis always includes it
    let (y_lo, y_hi) = value_bounds(
        table.rows.values().flatten().flatten().copied().chain(std::iter::once(0.0)),
    )
    .ok_or_else(|| anyhow!("Nothing to plot for '{}'", title))?;

    let n_years = years.len() as f64;
    let width = 0.8 / table.columns.len() as f64;

    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(-0.5..n_years - 0.5, y_lo..y_hi)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc("Year")
        .x_labels(years.len().min(30))
        .x_label_formatter(&|x| {
            let i = x.round();
            if (x - i).abs() < 1e-6 && i >= 0.0 && (i as usize) < years.len() {
                years[i as usize].to_string()
            } else {
                String::new()
            }
        })
        .draw()?;

    for (c, name) in table.columns.iter().enumerate() {
        let color = Palette99::pick(c).mix(0.9);
        let bars = table.rows.values().enumerate().filter_map(|(row, vals)| {
            let v = vals[c]?;
            let x0 = row as f64 - 0.4 + c as f64 * width;
            Some(Rectangle::new([(x0, 0.0), (x0 + width, v)], color.filled()))
        });
        chart
            .draw_series(bars)?
            .label(name.as_str())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

/// Equal-width bins over the finite values: (lower edge, bin width, counts).
pub fn bin_counts(values: &[f64], bins: usize) -> Option<(f64, f64, Vec<usize>)> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() || bins == 0 {
        return None;
    }
    let lo = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let width = if hi > lo { (hi - lo) / bins as f64 } else { 1.0 };

    let mut counts = vec![0usize; bins];
    for v in finite {
        // the maximum lands in the last bin
        let i = (((v - lo) / width) as usize).min(bins - 1);
        counts[i] += 1;
    }
    Some((lo, width, counts))
}

pub fn histogram(values: &[f64], title: &str, bins: usize, path: &Path) -> Result<()> {
    let (lo, width, counts) = bin_counts(values, bins).ok_or_else(|| anyhow!("Nothing to plot for '{}'", title))?;
    let x_hi = lo + width * counts.len() as f64;
    let y_hi = counts.iter().copied().max().unwrap_or(0) as f64 * 1.1 + 1.0;

    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(lo..x_hi, 0.0..y_hi)?;

    chart.configure_mesh().disable_x_mesh().y_desc("Count").draw()?;

    let color = Palette99::pick(0).mix(0.8);
    chart.draw_series(counts.iter().enumerate().map(|(i, &n)| {
        let x0 = lo + width * i as f64;
        Rectangle::new([(x0, 0.0), (x0 + width, n as f64)], color.filled())
    }))?;

    root.present()?;
    Ok(())
}
