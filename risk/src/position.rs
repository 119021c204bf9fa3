//! Positions, grouping dimensions and aggregated exposure vectors

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Group label used for positions with no value for a grouping dimension
pub const UNCLASSIFIED_GROUP: &str = "Unclassified";

/// Total exposures with an absolute value below this are treated as zero
pub const DEGENERATE_EXPOSURE_TOLERANCE: f64 = 1e-12;

/// One trade or lot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Instrument ticker, the join key into the price table
    pub ticker: String,

    /// Dollar-normalized signed exposure (negative = short)
    pub exposure: f64,

    #[serde(default)]
    pub fund: Option<String>,

    #[serde(default)]
    pub sector: Option<String>,

    #[serde(default)]
    pub industry: Option<String>,

    #[serde(default)]
    pub country: Option<String>,

    #[serde(default)]
    pub market_cap_bucket: Option<String>,

    #[serde(default)]
    pub trade_date: Option<NaiveDate>,
}

impl Position {
    /// Create a position with no group attributes
    pub fn new(ticker: impl Into<String>, exposure: f64) -> Self {
        Self {
            ticker: ticker.into(),
            exposure,
            fund: None,
            sector: None,
            industry: None,
            country: None,
            market_cap_bucket: None,
            trade_date: None,
        }
    }

    pub fn with_fund(mut self, fund: impl Into<String>) -> Self {
        self.fund = Some(fund.into());
        self
    }

    pub fn with_sector(mut self, sector: impl Into<String>) -> Self {
        self.sector = Some(sector.into());
        self
    }

    pub fn with_industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = Some(industry.into());
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_market_cap_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.market_cap_bucket = Some(bucket.into());
        self
    }

    pub fn with_trade_date(mut self, date: NaiveDate) -> Self {
        self.trade_date = Some(date);
        self
    }

    /// Raw attribute value for a grouping dimension
    pub fn attribute(&self, dimension: GroupDimension) -> Option<&str> {
        match dimension {
            GroupDimension::Fund => self.fund.as_deref(),
            GroupDimension::Sector => self.sector.as_deref(),
            GroupDimension::Industry => self.industry.as_deref(),
            GroupDimension::Country => self.country.as_deref(),
            GroupDimension::MarketCap => self.market_cap_bucket.as_deref(),
        }
    }

    /// Group this position falls into; missing attributes map to [`UNCLASSIFIED_GROUP`]
    pub fn group(&self, dimension: GroupDimension) -> &str {
        self.attribute(dimension).unwrap_or(UNCLASSIFIED_GROUP)
    }
}

/// Categorical attribute positions can be grouped by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupDimension {
    Fund,
    Sector,
    Industry,
    Country,
    MarketCap,
}

impl GroupDimension {
    pub const ALL: [GroupDimension; 5] = [
        GroupDimension::Fund,
        GroupDimension::Sector,
        GroupDimension::Industry,
        GroupDimension::Country,
        GroupDimension::MarketCap,
    ];

    /// Label used in the `group` column of the VaR table
    pub fn label(&self) -> &'static str {
        match self {
            GroupDimension::Fund => "fund",
            GroupDimension::Sector => "sector",
            GroupDimension::Industry => "industry",
            GroupDimension::Country => "country",
            GroupDimension::MarketCap => "market_cap",
        }
    }
}

impl fmt::Display for GroupDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Signed exposure per ticker, summed over lots and ordered by ticker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExposureVector(BTreeMap<String, f64>);

impl ExposureVector {
    /// Sum exposures of positions sharing a ticker
    pub fn from_positions<'a, I>(positions: I) -> Self
    where
        I: IntoIterator<Item = &'a Position>,
    {
        let mut exposures = BTreeMap::new();
        for position in positions {
            *exposures.entry(position.ticker.clone()).or_insert(0.0) += position.exposure;
        }
        Self(exposures)
    }

    pub fn get(&self, ticker: &str) -> Option<f64> {
        self.0.get(ticker).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn tickers(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.0.iter().map(|(t, e)| (t.as_str(), *e))
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    /// Whether the exposures sum to (numerically) zero
    pub fn is_degenerate(&self) -> bool {
        self.total().abs() < DEGENERATE_EXPOSURE_TOLERANCE
    }

    /// Exposure divided by `total`; all zero when `total` is degenerate
    pub fn weights_against(&self, total: f64) -> BTreeMap<String, f64> {
        self.0
            .iter()
            .map(|(ticker, exposure)| {
                let weight = if total.abs() < DEGENERATE_EXPOSURE_TOLERANCE {
                    0.0
                } else {
                    exposure / total
                };
                (ticker.clone(), weight)
            })
            .collect()
    }

    /// Exposure divided by the vector's own total
    pub fn weights(&self) -> BTreeMap<String, f64> {
        self.weights_against(self.total())
    }
}
