//! Indicator catalog: which Eurostat datasets to pull, with which filters, for which geos.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

// ----------------------- Frequency -----------------------
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Frequency {
    Monthly,
    Quarterly,
    Annual,
}

impl Frequency {
    pub fn parse(tag: &str) -> Result<Self> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "M" => Ok(Frequency::Monthly),
            "Q" => Ok(Frequency::Quarterly),
            "A" => Ok(Frequency::Annual),
            other => Err(anyhow!("Unknown frequency tag '{}' (expected M, Q or A)", other)),
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Frequency::Monthly => "M",
            Frequency::Quarterly => "Q",
            Frequency::Annual => "A",
        }
    }

    /// Column holding the 1-period change. Annual series only carry `yoy_pct`.
    pub fn change_column(self) -> Option<&'static str> {
        match self {
            Frequency::Monthly => Some("mom_pct"),
            Frequency::Quarterly => Some("qoq_pct"),
            Frequency::Annual => None,
        }
    }

    /// (1-period lag, year-over-year lag), in observations.
    pub fn change_lags(self) -> (Option<usize>, usize) {
        match self {
            Frequency::Monthly => (Some(1), 12),
            Frequency::Quarterly => (Some(1), 4),
            Frequency::Annual => (None, 1),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl TryFrom<String> for Frequency {
    type Error = anyhow::Error;

    fn try_from(s: String) -> Result<Self> {
        Frequency::parse(&s)
    }
}

impl From<Frequency> for String {
    fn from(f: Frequency) -> String {
        f.code().to_string()
    }
}

// ----------------------- Indicator -----------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    pub name: String,
    pub dataset: String,
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
    pub frequency: Frequency,
}

impl Indicator {
    pub fn new(name: &str, dataset: &str, filters: &[(&str, &str)], frequency: Frequency) -> Self {
        Indicator {
            name: name.to_string(),
            dataset: dataset.to_string(),
            filters: filters
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            frequency,
        }
    }
}

// ----------------------- Catalog -----------------------
pub const DEFAULT_GEOS: [&str; 21] = [
    "EA20", "AT", "BE", "HR", "CY", "EE", "FI", "FR", "DE", "GR", "IE", "IT", "LV", "LT", "LU",
    "MT", "NL", "PT", "SK", "SI", "ES",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default = "default_geos")]
    pub geos: Vec<String>,
    pub indicators: Vec<Indicator>,
}

fn default_geos() -> Vec<String> {
    DEFAULT_GEOS.iter().map(|g| g.to_string()).collect()
}

impl Catalog {
    pub fn builtin() -> Self {
        use Frequency::{Annual as A, Monthly as M, Quarterly as Q};

        let gdp = |name: &str, item: &str, unit: &str| {
            Indicator::new(
                name,
                "namq_10_gdp",
                &[("freq", "Q"), ("na_item", item), ("unit", unit), ("s_adj", "NSA")],
                Q,
            )
        };
        let hicp = |name: &str, coicop: &str| {
            Indicator::new(
                name,
                "prc_hicp_midx",
                &[("unit", "I15"), ("coicop", coicop), ("freq", "M")],
                M,
            )
        };
        let gov = |name: &str, item: &str| {
            Indicator::new(
                name,
                "gov_10dd_edpt1",
                &[("na_item", item), ("sector", "S13"), ("freq", "A"), ("unit", "PC_GDP")],
                A,
            )
        };
        let survey = |name: &str, dataset: &str, indic: &str| {
            Indicator::new(name, dataset, &[("indic", indic), ("s_adj", "SA"), ("freq", "M")], M)
        };
        let ip = |name: &str, nace: &str| {
            Indicator::new(
                name,
                "sts_inpr_m",
                &[
                    ("indic_bt", "PRD"),
                    ("s_adj", "SCA"),
                    ("nace_r2", nace),
                    ("freq", "M"),
                    ("unit", "I21"),
                ],
                M,
            )
        };
        let retail = |name: &str, nace: &str| {
            Indicator::new(
                name,
                "sts_trtu_m",
                &[
                    ("indic_bt", "VOL_SLS"),
                    ("s_adj", "SCA"),
                    ("nace_r2", nace),
                    ("freq", "M"),
                    ("unit", "I21"),
                ],
                M,
            )
        };

        let indicators = vec![
            // National accounts (quarterly)
            gdp("GDP", "B1GQ", "CLV20_MNAC"),
            gdp("GDP_HH_CONSUMPTION", "P31_S14", "CLV20_MNAC"),
            gdp("GDP_GVT_CONSUMPTION", "P3_S13", "CLV20_MNAC"),
            gdp("GDP_Investments", "P51G", "CLV_I20"),
            gdp("GDP_ChangeInventories", "P52_P53", "CP_MEUR"),
            gdp("GDP_Export", "P6", "CLV20_MNAC"),
            gdp("GDP_IMPORT", "P7", "CLV20_MNAC"),
            // HICP (monthly)
            hicp("HICP", "CP00"),
            hicp("HICP_Core", "TOT_X_NRG_FOOD"),
            hicp("HICP_Food", "CP01"),
            hicp("HICP_Energy", "NRG"),
            hicp("HICP_NEIG", "IGD_NNRG"),
            hicp("HICP_Services", "SERV"),
            // Public finances and external balance
            gov("Deficit_GDP", "B9"),
            gov("Debt_GDP", "GD"),
            Indicator::new(
                "CurrentAccountBalance_GDP",
                "bop_gdp6_q",
                &[
                    ("bop_item", "CA"),
                    ("partner", "WRL_REST"),
                    ("S_ADJ", "NSA"),
                    ("stk_flow", "BAL"),
                    ("freq", "Q"),
                    ("unit", "PC_GDP"),
                ],
                Q,
            ),
            // Business and consumer surveys (monthly)
            survey("ESI", "teibs010", "BS-ESI-I"),
            survey("Construction_Confidence", "teibs020", "BS-CCI-BAL"),
            survey("Industrial_Confidence", "teibs020", "BS-ICI-BAL"),
            survey("Retail_Confidence", "teibs020", "BS-RCI-BAL"),
            survey("Consumer_Confidence", "teibs020", "BS-CSMCI-BAL"),
            survey("Services_Confidence", "teibs020", "BS-SCI-BAL"),
            // Industrial production (monthly)
            ip("IndustrialProduction", "B-D"),
            ip("IndustrialProduction_IntermediateGoods", "MIG_ING"),
            ip("IndustrialProduction_EnergyexElectricity", "MIG_NRG_X_E"),
            ip("IndustrialProduction_CapitalGoods", "MIG_CAG"),
            ip("IndustrialProduction_DurableConsumerGoods", "MIG_DCOG"),
            ip("IndustrialProduction_NonDurableConsumerGoods", "MIG_NDCOG"),
            // Retail trade (monthly)
            retail("RetailSales", "G47"),
            retail("RetailSales_Food", "G47_FOOD"),
            retail("RetailSales_exFood", "G47_NFOOD_X_G473"),
            // Labour market (monthly)
            Indicator::new(
                "Unemployment",
                "une_rt_m",
                &[("sex", "T"), ("age", "TOTAL"), ("unit", "PC_ACT"), ("freq", "M")],
                M,
            ),
        ];

        Catalog { geos: default_geos(), indicators }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read catalog file {}", path.display()))?;
        let catalog: Catalog = serde_json::from_slice(&bytes)
            .with_context(|| format!("Invalid catalog JSON in {}", path.display()))?;
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<()> {
        if self.indicators.is_empty() {
            bail!("Catalog defines no indicators");
        }
        if self.geos.is_empty() {
            bail!("Catalog defines no geos");
        }
        let mut seen = std::collections::HashSet::new();
        for ind in &self.indicators {
            if !seen.insert(ind.name.as_str()) {
                bail!("Duplicate indicator name '{}' in catalog", ind.name);
            }
        }
        Ok(())
    }

    pub fn indicator(&self, name: &str) -> Option<&Indicator> {
        self.indicators.iter().find(|i| i.name == name)
    }

    /// Indicators matching `names`, in the order given. An empty list selects everything.
    pub fn select(&self, names: &[String]) -> Result<Vec<Indicator>> {
        if names.is_empty() {
            return Ok(self.indicators.clone());
        }
        names
            .iter()
            .map(|n| {
                self.indicator(n)
                    .cloned()
                    .ok_or_else(|| anyhow!("Indicator '{}' not found in catalog", n))
            })
            .collect()
    }

    /// Geos matching `codes` (upper-cased), or every catalog geo when empty.
    pub fn select_geos(&self, codes: &[String]) -> Vec<String> {
        if codes.is_empty() {
            return self.geos.clone();
        }
        codes.iter().map(|c| c.trim().to_uppercase()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_is_consistent() {
        let cat = Catalog::builtin();
        assert_eq!(cat.indicators.len(), 32);
        assert_eq!(cat.geos.len(), 21);
        assert!(cat.validate().is_ok());

        let hicp = cat.indicator("HICP").unwrap();
        assert_eq!(hicp.dataset, "prc_hicp_midx");
        assert_eq!(hicp.frequency, Frequency::Monthly);
        assert_eq!(hicp.filters.get("coicop").map(String::as_str), Some("CP00"));

        assert_eq!(cat.indicator("Debt_GDP").unwrap().frequency, Frequency::Annual);
    }

    #[test]
    fn select_reports_unknown_names() {
        let cat = Catalog::builtin();
        let err = cat.select(&["GDP".into(), "Nope".into()]).unwrap_err();
        assert!(err.to_string().contains("Nope"));

        let picked = cat.select(&["Unemployment".into(), "GDP".into()]).unwrap();
        assert_eq!(picked[0].name, "Unemployment");
        assert_eq!(picked[1].name, "GDP");
    }

    #[test]
    fn catalog_file_round_trips_frequency_tags() {
        let json = r#"{
            "indicators": [
                {"name": "X", "dataset": "ds", "filters": {"unit": "I15"}, "frequency": "q"}
            ]
        }"#;
        let cat: Catalog = serde_json::from_str(json).unwrap();
        assert_eq!(cat.indicators[0].frequency, Frequency::Quarterly);
        assert_eq!(cat.geos.len(), DEFAULT_GEOS.len());

        let bad = r#"{"indicators": [{"name": "X", "dataset": "ds", "frequency": "W"}]}"#;
        assert!(serde_json::from_str::<Catalog>(bad).is_err());
    }

    #[test]
    fn lags_follow_frequency() {
        assert_eq!(Frequency::Monthly.change_lags(), (Some(1), 12));
        assert_eq!(Frequency::Quarterly.change_lags(), (Some(1), 4));
        assert_eq!(Frequency::Annual.change_lags(), (None, 1));
        assert_eq!(Frequency::Annual.change_column(), None);
    }
}
