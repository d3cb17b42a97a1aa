use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::{theme::ColorfulTheme, FuzzySelect, MultiSelect};
use num_format::{Locale, ToFormattedString};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use eurostat_macro::cache::{default_cache_dir, CacheMode, ResponseCache};
use eurostat_macro::catalog::{Catalog, Indicator};
use eurostat_macro::chart;
use eurostat_macro::fetch::{EurostatClient, EUROSTAT_BASE};
use eurostat_macro::sheets::{SheetTab, SheetsClient, DEFAULT_SHEET_ID, DEFAULT_TABS};
use eurostat_macro::table::{pivot_wide, IndicatorFrame};

// ----------------------- Constants -----------------------
const REPORT_FILE: &str = "report_data_ready.csv";
const REPORT_CHART_FILE: &str = "gdp_big4.svg";
const REPORT_CHART_COLUMNS: [&str; 4] = ["GDP_EA20", "GDP_DE", "GDP_FR", "GDP_ES"];
const HISTOGRAM_BINS: usize = 20;

// ----------------------- CLI -----------------------
#[derive(Parser, Debug)]
#[command(
    name = "eurostat-macro",
    version,
    about = "Download euro-area macro indicators (GDP, HICP, unemployment, industrial production, ...) from Eurostat and turn them into tables and charts."
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Cache directory for raw API responses (default: platform cache dir)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Neither read nor write the response cache
    #[arg(long, global = true, default_value_t = false)]
    no_cache: bool,

    /// Ignore cached responses but store fresh ones
    #[arg(long, global = true, default_value_t = false, conflicts_with = "no_cache")]
    refresh: bool,

    /// JSON catalog replacing the built-in indicator and geo lists
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Eurostat dissemination API base URL
    #[arg(long, global = true, default_value = EUROSTAT_BASE)]
    base_url: String,

    /// HTTP timeout in seconds
    #[arg(long, global = true, default_value_t = 30)]
    timeout: u64,

    /// Print debug info
    #[arg(long, global = true, default_value_t = false)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the indicators and geos of the catalog
    Catalog,

    /// Download indicators and write one CSV per indicator
    Fetch {
        /// Indicator name (repeatable; default: every indicator)
        #[arg(long)]
        indicator: Vec<String>,

        /// Geo code (repeatable; default: every catalog geo)
        #[arg(long)]
        geo: Vec<String>,

        /// First period to request, e.g. 2015 or 2015-01
        #[arg(long)]
        since: Option<String>,

        /// Output directory
        #[arg(long, default_value = "out")]
        out: PathBuf,
    },

    /// Print the latest observation of one indicator per geo
    Show {
        #[arg(long)]
        indicator: String,

        #[arg(long)]
        geo: Vec<String>,

        #[arg(long)]
        since: Option<String>,

        /// Decimals shown for values
        #[arg(long, default_value_t = 2)]
        decimals: u32,
    },

    /// Download everything, write the wide table and the annual GDP chart
    Report {
        #[arg(long, default_value = "out")]
        out: PathBuf,

        /// First year shown in the annual chart
        #[arg(long, default_value_t = 2010)]
        since_year: i32,
    },

    /// Line chart of one indicator (interactive selection when flags are omitted)
    Chart {
        #[arg(long)]
        indicator: Option<String>,

        #[arg(long)]
        geo: Vec<String>,

        #[arg(long)]
        since: Option<String>,

        /// Output SVG file (default: <indicator>.svg)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Load tabs of the shared Google Sheet and summarize them
    Sheets {
        #[arg(long, default_value = DEFAULT_SHEET_ID)]
        sheet_id: String,

        /// Tab name (repeatable; default: the standard tab list)
        #[arg(long)]
        tab: Vec<String>,

        /// Rows to print per tab
        #[arg(long, default_value_t = 5)]
        rows: usize,

        /// Column holding the year, for the per-tab bar chart
        #[arg(long, default_value = "Year")]
        year_column: String,

        /// Column drawn in the bar chart (repeatable; default: every numeric column)
        #[arg(long)]
        country: Vec<String>,

        /// Numeric column whose returns are printed and histogram drawn
        #[arg(long)]
        column: Option<String>,

        /// Directory for the tab charts (no charts when omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

// ----------------------- Main -----------------------
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let catalog = match &args.catalog {
        Some(path) => Catalog::from_file(path)?,
        None => Catalog::builtin(),
    };

    match &args.command {
        Command::Catalog => print_catalog(&catalog),
        Command::Fetch { indicator, geo, since, out } => {
            let client = build_client(&args, since.clone())?;
            run_fetch(&client, &catalog, indicator, geo, out).await?;
        }
        Command::Show { indicator, geo, since, decimals } => {
            let client = build_client(&args, since.clone())?;
            run_show(&client, &catalog, indicator, geo, *decimals).await?;
        }
        Command::Report { out, since_year } => {
            let client = build_client(&args, None)?;
            run_report(&client, &catalog, out, *since_year).await?;
        }
        Command::Chart { indicator, geo, since, out } => {
            let client = build_client(&args, since.clone())?;
            run_chart(&client, &catalog, indicator.clone(), geo.clone(), out.clone()).await?;
        }
        Command::Sheets { sheet_id, tab, rows, year_column, country, column, out } => {
            let client = SheetsClient::new(Duration::from_secs(args.timeout))?;
            let view = SheetView {
                rows: *rows,
                year_column: year_column.clone(),
                countries: country.clone(),
                column: column.clone(),
                out: out.clone(),
            };
            run_sheets(&client, sheet_id, tab, &view).await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "info,eurostat_macro=debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_client(args: &Args, since: Option<String>) -> Result<EurostatClient> {
    let mode = if args.no_cache {
        CacheMode::Off
    } else if args.refresh {
        CacheMode::Refresh
    } else {
        CacheMode::Use
    };
    let dir = match &args.cache_dir {
        Some(d) => d.clone(),
        None => default_cache_dir()?,
    };
    let cache = ResponseCache::new(dir, mode);
    info!(dir = %cache.dir().display(), mode = ?cache.mode(), "response cache");

    Ok(EurostatClient::new(cache, Duration::from_secs(args.timeout))?
        .with_base_url(&args.base_url)
        .with_since(since))
}

// ----------------------- Prompts -----------------------
fn prompt_indicator(theme: &ColorfulTheme, catalog: &Catalog) -> Result<Indicator> {
    let labels: Vec<String> = catalog
        .indicators
        .iter()
        .map(|i| format!("{} - {} ({})", i.name, i.dataset, i.frequency))
        .collect();

    let idx = FuzzySelect::with_theme(theme)
        .with_prompt("Select indicator")
        .items(&labels)
        .default(0)
        .interact()
        .context("Indicator selection failed")?;

    Ok(catalog.indicators[idx].clone())
}

fn prompt_geos(theme: &ColorfulTheme, catalog: &Catalog) -> Result<Vec<String>> {
    let picked = MultiSelect::with_theme(theme)
        .with_prompt("Select geos (space to toggle, enter for all when none selected)")
        .items(&catalog.geos)
        .interact()
        .context("Geo selection failed")?;

    if picked.is_empty() {
        return Ok(catalog.geos.clone());
    }
    Ok(picked.into_iter().map(|i| catalog.geos[i].clone()).collect())
}

// ----------------------- Formatting -----------------------
/// Observation value with thousands separators, rounded to `decimals` places.
fn fmt_value(x: f64, decimals: u32) -> String {
    let unit = 10i64.pow(decimals.min(9));
    let scaled = (x.abs() * unit as f64).round() as i64;
    let sign = if x < 0.0 && scaled > 0 { "-" } else { "" };
    let whole = (scaled / unit).to_formatted_string(&Locale::en);

    if decimals == 0 {
        format!("{}{}", sign, whole)
    } else {
        format!("{}{}.{:0width$}", sign, whole, scaled % unit, width = decimals.min(9) as usize)
    }
}

fn fmt_pct(x: Option<f64>) -> String {
    match x {
        Some(v) => format!("{:+.2}%", v),
        None => "-".to_string(),
    }
}

fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Cannot create output directory {}", dir.display()))
}

fn print_catalog(catalog: &Catalog) {
    println!("================= Indicators =================");
    for ind in &catalog.indicators {
        let filters = ind
            .filters
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", ");
        println!("  {:<45} {} {:<15} {}", ind.name, ind.frequency, ind.dataset, filters);
    }
    println!("================= Geos =================");
    println!("  {}", catalog.geos.join(" "));
}

// ----------------------- Runners -----------------------
async fn run_fetch(
    client: &EurostatClient,
    catalog: &Catalog,
    indicators: &[String],
    geos: &[String],
    out: &Path,
) -> Result<()> {
    let selected = catalog.select(indicators)?;
    let geos = catalog.select_geos(geos);
    ensure_dir(out)?;

    let (frames, stats) = client.download_selection(&selected, &geos).await;
    for frame in &frames {
        let path = out.join(format!("{}.csv", file_stem(&frame.name)));
        frame.save_csv(&path)?;
        println!("{} -> {} ({} rows)", frame.name, path.display(), frame.rows.len());
    }

    println!();
    println!(
        "Indicators written: {} / {} (requests: {}, cached: {}, downloaded: {}, failed: {})",
        frames.len(),
        selected.len(),
        stats.requests(),
        stats.cache_hits,
        stats.fetched,
        stats.failed
    );
    if frames.is_empty() {
        return Err(anyhow!("No data downloaded"));
    }
    Ok(())
}

async fn run_show(
    client: &EurostatClient,
    catalog: &Catalog,
    indicator: &str,
    geos: &[String],
    decimals: u32,
) -> Result<()> {
    let ind = catalog
        .indicator(indicator)
        .ok_or_else(|| anyhow!("Indicator '{}' not found in catalog", indicator))?;
    let geos = catalog.select_geos(geos);

    let (frame, _) = client.download_indicator(ind, &geos).await;
    if frame.is_empty() {
        return Err(anyhow!("No observations for {}", ind.name));
    }
    print_latest(&frame, decimals);
    Ok(())
}

fn print_latest(frame: &IndicatorFrame, decimals: u32) {
    let change_label = frame.frequency.change_column().unwrap_or("");
    println!("================= {} ({}) =================", frame.name, frame.frequency);
    println!("  {:<6} {:<12} {:>16} {:>10} {:>10}", "geo", "date", "value", change_label, "yoy_pct");
    for r in frame.latest_by_geo() {
        let change = if frame.frequency.change_column().is_some() { fmt_pct(r.change) } else { String::new() };
        println!(
            "  {:<6} {:<12} {:>16} {:>10} {:>10}",
            r.geo,
            r.date.format("%Y-%m-%d"),
            fmt_value(r.value, decimals),
            change,
            fmt_pct(r.yoy)
        );
    }
}

async fn run_report(client: &EurostatClient, catalog: &Catalog, out: &Path, since_year: i32) -> Result<()> {
    ensure_dir(out)?;

    let (frames, stats) = client.download_all(catalog).await;
    if frames.is_empty() {
        return Err(anyhow!("No data downloaded ({} failed requests)", stats.failed));
    }

    let wide = pivot_wide(&frames);
    let path = out.join(REPORT_FILE);
    wide.save_csv(&path)?;
    println!("Report ready: {} ({} dates x {} series)", path.display(), wide.rows.len(), wide.columns.len());

    let missing: Vec<&str> = REPORT_CHART_COLUMNS
        .iter()
        .copied()
        .filter(|c| wide.column_index(c).is_none())
        .collect();
    if !missing.is_empty() {
        warn!(?missing, "GDP chart skipped: series not available");
        return Ok(());
    }

    let annual = wide.annual_last(Some(since_year)).select(&REPORT_CHART_COLUMNS);
    if annual.rows.is_empty() {
        warn!(since_year, "GDP chart skipped: no data in range");
        return Ok(());
    }
    let chart_path = out.join(REPORT_CHART_FILE);
    chart::annual_bar_chart(&annual, &format!("GDP big four ({} - today)", since_year), &chart_path)?;
    println!("Chart: {}", chart_path.display());
    Ok(())
}

async fn run_chart(
    client: &EurostatClient,
    catalog: &Catalog,
    indicator: Option<String>,
    geos: Vec<String>,
    out: Option<PathBuf>,
) -> Result<()> {
    let theme = ColorfulTheme::default();

    let ind = match indicator {
        Some(name) => catalog
            .indicator(&name)
            .cloned()
            .ok_or_else(|| anyhow!("Indicator '{}' not found in catalog", name))?,
        None => prompt_indicator(&theme, catalog)?,
    };
    let geos = if geos.is_empty() {
        prompt_geos(&theme, catalog)?
    } else {
        catalog.select_geos(&geos)
    };

    let (frame, _) = client.download_indicator(&ind, &geos).await;
    if frame.is_empty() {
        return Err(anyhow!("No observations for {}", ind.name));
    }

    let path = out.unwrap_or_else(|| PathBuf::from(format!("{}.svg", file_stem(&ind.name))));
    chart::line_chart(&frame, &geos, &path)?;
    println!("Chart: {}", path.display());
    Ok(())
}

struct SheetView {
    rows: usize,
    year_column: String,
    countries: Vec<String>,
    column: Option<String>,
    out: Option<PathBuf>,
}

async fn run_sheets(client: &SheetsClient, sheet_id: &str, tabs: &[String], view: &SheetView) -> Result<()> {
    let tabs: Vec<String> = if tabs.is_empty() {
        DEFAULT_TABS.iter().map(|t| t.to_string()).collect()
    } else {
        tabs.to_vec()
    };

    let loaded = client.load_tabs(sheet_id, &tabs).await;
    if loaded.is_empty() {
        return Err(anyhow!("No tab could be loaded from sheet {}", sheet_id));
    }
    println!("Loaded tabs: {}", loaded.iter().map(|t| t.name.as_str()).collect::<Vec<_>>().join(", "));
    if let Some(dir) = &view.out {
        ensure_dir(dir)?;
    }

    for tab in &loaded {
        println!();
        println!("================= {} =================", tab.name);
        println!("  {}", tab.header.join(" | "));
        for row in tab.head(view.rows) {
            println!("  {}", row.join(" | "));
        }

        let summary = tab.describe();
        if !summary.is_empty() {
            println!();
            println!(
                "  {:<24} {:>6} {:>12} {:>12} {:>12} {:>12} {:>12} {:>12} {:>12}",
                "column", "count", "mean", "std", "min", "25%", "50%", "75%", "max"
            );
            for (name, s) in summary {
                println!(
                    "  {:<24} {:>6} {:>12.3} {:>12.3} {:>12.3} {:>12.3} {:>12.3} {:>12.3} {:>12.3}",
                    name, s.count, s.mean, s.std, s.min, s.q25, s.median, s.q75, s.max
                );
            }
        }

        if let Some(column) = &view.column {
            print_returns(tab, column, view)?;
        }
        if let Some(dir) = &view.out {
            draw_tab_chart(tab, dir, view)?;
        }
    }
    Ok(())
}

fn print_returns(tab: &SheetTab, column: &str, view: &SheetView) -> Result<()> {
    let (Some(values), Some(returns)) = (tab.numeric_column(column), tab.returns(column)) else {
        return Ok(());
    };
    println!();
    println!("  {:<6} {:>16} {:>12}", "row", column, "return_pct");
    for (i, (v, r)) in values.iter().zip(&returns).take(view.rows).enumerate() {
        let v = v.map(|x| fmt_value(x, 2)).unwrap_or_else(|| "-".to_string());
        println!("  {:<6} {:>16} {:>12}", i, v, fmt_pct(*r));
    }

    if let Some(dir) = &view.out {
        let finite: Vec<f64> = values.into_iter().flatten().collect();
        let path = dir.join(format!("{}_{}_hist.svg", file_stem(&tab.name), file_stem(column)));
        match chart::histogram(&finite, &format!("{}: {}", tab.name, column), HISTOGRAM_BINS, &path) {
            Ok(()) => println!("  Histogram: {}", path.display()),
            Err(e) => warn!(tab = %tab.name, column, error = %format!("{:#}", e), "histogram skipped"),
        }
    }
    Ok(())
}

fn draw_tab_chart(tab: &SheetTab, dir: &Path, view: &SheetView) -> Result<()> {
    let Some(by_year) = tab.by_year(&view.year_column) else {
        return Ok(());
    };
    let table = if view.countries.is_empty() {
        by_year
    } else {
        let names: Vec<&str> = view.countries.iter().map(String::as_str).collect();
        by_year.select(&names)
    };
    if table.rows.is_empty() || table.columns.is_empty() {
        warn!(tab = %tab.name, "bar chart skipped: no yearly values");
        return Ok(());
    }

    let path = dir.join(format!("{}.svg", file_stem(&tab.name)));
    chart::annual_bar_chart(&table, &tab.name, &path)?;
    println!("  Chart: {}", path.display());
    Ok(())
}
