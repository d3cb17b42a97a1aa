//! Eurostat dissemination API client: one GET per (indicator, geo), cache in front.

use crate::cache::ResponseCache;
use crate::catalog::{Catalog, Indicator};
use crate::changes;
use crate::jsonstat;
use crate::period::parse_period;
use crate::table::{IndicatorFrame, Observation};
use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const EUROSTAT_BASE: &str = "https://ec.europa.eu/eurostat/api/dissemination/statistics/1.0/data";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Source {
    Cache,
    Network,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    pub cache_hits: usize,
    pub fetched: usize,
    pub failed: usize,
}

impl FetchStats {
    fn record(&mut self, source: Source) {
        match source {
            Source::Cache => self.cache_hits += 1,
            Source::Network => self.fetched += 1,
            Source::Failed => self.failed += 1,
        }
    }

    fn merge(&mut self, other: FetchStats) {
        self.cache_hits += other.cache_hits;
        self.fetched += other.fetched;
        self.failed += other.failed;
    }

    pub fn requests(&self) -> usize {
        self.cache_hits + self.fetched + self.failed
    }
}

#[derive(Debug)]
pub struct PairResult {
    pub rows: Vec<Observation>,
    pub source: Source,
}

#[derive(Debug, Clone)]
pub struct EurostatClient {
    http: Client,
    base_url: String,
    cache: ResponseCache,
    since: Option<String>,
}

impl EurostatClient {
    pub fn new(cache: ResponseCache, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("eurostat-macro/", env!("CARGO_PKG_VERSION"), " (rust reqwest)"))
            .timeout(timeout)
            .build()
            .context("Failed to build Eurostat HTTP client")?;
        Ok(EurostatClient { http, base_url: EUROSTAT_BASE.to_string(), cache, since: None })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Lower bound on the time dimension (`sinceTimePeriod`), e.g. "2015" or "2015-01".
    pub fn with_since(mut self, since: Option<String>) -> Self {
        self.since = since.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Filters that identify the request in the cache: indicator filters plus the time bound.
    fn request_params(&self, indicator: &Indicator) -> BTreeMap<String, String> {
        let mut params = indicator.filters.clone();
        if let Some(since) = &self.since {
            params.insert("sinceTimePeriod".to_string(), since.clone());
        }
        params
    }

    async fn get_body(&self, dataset: &str, geo: &str, params: &BTreeMap<String, String>) -> Result<Vec<u8>> {
        let url = format!("{}/{}", self.base_url, dataset);
        let mut query: Vec<(&str, &str)> = params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        query.push(("geo", geo));
        query.push(("format", "JSON"));

        let resp = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .with_context(|| format!("HTTP error fetching {} for {}", dataset, geo))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("Eurostat returned {} for {} / {}", status, dataset, geo));
        }

        let bytes = resp.bytes().await.context("Failed reading Eurostat response body")?;
        serde_json::from_slice::<serde_json::Value>(&bytes)
            .with_context(|| format!("Invalid JSON from Eurostat for {} / {}", dataset, geo))?;
        Ok(bytes.to_vec())
    }

    /// Fetch one (indicator, geo) pair. Never fails: problems are logged and yield no rows.
    pub async fn fetch_pair(&self, indicator: &Indicator, geo: &str) -> PairResult {
        let params = self.request_params(indicator);

        let (body, source) = match self.cache.load(&indicator.dataset, geo, &params) {
            Some(b) => (b, Source::Cache),
            None => match self.get_body(&indicator.dataset, geo, &params).await {
                Ok(b) => {
                    self.cache.store(&indicator.dataset, geo, &params, &b);
                    (b, Source::Network)
                }
                Err(e) => {
                    warn!(indicator = %indicator.name, geo, error = %format!("{:#}", e), "download failed, skipping");
                    return PairResult { rows: Vec::new(), source: Source::Failed };
                }
            },
        };

        let rows = normalize(indicator, geo, &body);
        if rows.is_empty() {
            warn!(indicator = %indicator.name, geo, "no usable observations in response");
        } else {
            debug!(indicator = %indicator.name, geo, rows = rows.len(), ?source, "series loaded");
        }
        PairResult { rows, source }
    }

    /// All geos for one indicator, concatenated in geo order.
    pub async fn download_indicator(&self, indicator: &Indicator, geos: &[String]) -> (IndicatorFrame, FetchStats) {
        let mut frame = IndicatorFrame::new(&indicator.name, indicator.frequency);
        let mut stats = FetchStats::default();
        for geo in geos {
            let res = self.fetch_pair(indicator, geo).await;
            stats.record(res.source);
            frame.rows.extend(res.rows);
        }
        info!(
            indicator = %indicator.name,
            geos = frame.geos().len(),
            rows = frame.rows.len(),
            "indicator downloaded"
        );
        (frame, stats)
    }

    /// Every catalog indicator across every catalog geo. Indicators without rows are omitted.
    pub async fn download_all(&self, catalog: &Catalog) -> (Vec<IndicatorFrame>, FetchStats) {
        self.download_selection(&catalog.indicators, &catalog.geos).await
    }

    pub async fn download_selection(
        &self,
        indicators: &[Indicator],
        geos: &[String],
    ) -> (Vec<IndicatorFrame>, FetchStats) {
        let mut frames = Vec::new();
        let mut total = FetchStats::default();
        for ind in indicators {
            let (frame, stats) = self.download_indicator(ind, geos).await;
            total.merge(stats);
            if !frame.is_empty() {
                frames.push(frame);
            }
        }
        info!(
            requests = total.requests(),
            cache_hits = total.cache_hits,
            fetched = total.fetched,
            failed = total.failed,
            "download finished"
        );
        (frames, total)
    }
}

/// Parse a JSON-stat body into dated observations with percent changes.
pub fn normalize(indicator: &Indicator, geo: &str, body: &[u8]) -> Vec<Observation> {
    let mut rows: Vec<Observation> = jsonstat::parse_body(body)
        .into_iter()
        .filter_map(|raw| {
            let date = parse_period(&raw.period, indicator.frequency)?;
            Some(Observation {
                date,
                value: raw.value,
                geo: geo.to_string(),
                indicator: indicator.name.clone(),
                change: None,
                yoy: None,
            })
        })
        .collect();
    changes::apply(&mut rows, indicator.frequency);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheMode;
    use crate::catalog::Frequency;

    #[test]
    fn since_is_part_of_the_cache_key() {
        let dir = tempfile::tempdir().unwrap();
        let client = EurostatClient::new(ResponseCache::new(dir.path(), CacheMode::Off), DEFAULT_TIMEOUT)
            .unwrap()
            .with_since(Some("2015".into()));
        let ind = Indicator::new("X", "ds", &[("unit", "I15")], Frequency::Monthly);
        let params = client.request_params(&ind);
        assert_eq!(params.get("sinceTimePeriod").map(String::as_str), Some("2015"));
        assert_eq!(params.get("unit").map(String::as_str), Some("I15"));

        let plain = client.with_since(Some("  ".into()));
        assert!(!plain.request_params(&ind).contains_key("sinceTimePeriod"));
    }

    #[test]
    fn normalize_drops_unparseable_periods() {
        let ind = Indicator::new("GDP", "namq_10_gdp", &[], Frequency::Quarterly);
        let body = br#"{
            "dimension": {"time": {"category": {"index": {"2023-Q4": 0, "2024-Q1": 1, "bogus": 2}}}},
            "value": {"0": 100, "1": 101, "2": 5}
        }"#;
        let rows = normalize(&ind, "PT", body);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.geo == "PT" && r.indicator == "GDP"));
        assert!(rows[1].change.is_some());
    }
}
