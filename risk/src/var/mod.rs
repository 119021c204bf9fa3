//! # Parametric VaR decomposition
//!
//! Variance-covariance VaR at a caller-supplied z-score `q`:
//!
//! - **Portfolio**: `sqrt(wᵀ Σ w) * q`
//! - **Isolated**: stand-alone VaR of one ticker or group
//! - **Component**: share of portfolio VaR by exposure weight; components
//!   sum to portfolio VaR
//! - **Incremental**: portfolio VaR minus the VaR of a fresh calculator over
//!   every position except the ticker or group
//!
//! [`PortfolioVarCalculator`] works per ticker, [`GroupVarCalculator`] wraps
//! it for a [`GroupDimension`](crate::position::GroupDimension).

mod group;
mod portfolio;

pub use group::GroupVarCalculator;
pub use portfolio::PortfolioVarCalculator;

use crate::covariance::CovarianceMethod;
use crate::error::{Result, RiskError};
use crate::returns::ReturnConvention;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use std::collections::BTreeMap;
use std::fmt;

/// The four VaR views, keyed by ticker or group
pub trait VarDecomposition: Send + Sync {
    fn portfolio_var(&self, q: f64) -> f64;
    fn isolated_var(&self, q: f64) -> BTreeMap<String, f64>;
    fn component_var(&self, q: f64) -> BTreeMap<String, f64>;
    fn incremental_var(&self, q: f64) -> BTreeMap<String, f64>;
}

impl VarDecomposition for PortfolioVarCalculator {
    fn portfolio_var(&self, q: f64) -> f64 {
        PortfolioVarCalculator::portfolio_var(self, q)
    }

    fn isolated_var(&self, q: f64) -> BTreeMap<String, f64> {
        PortfolioVarCalculator::isolated_var(self, q)
    }

    fn component_var(&self, q: f64) -> BTreeMap<String, f64> {
        PortfolioVarCalculator::component_var(self, q)
    }

    fn incremental_var(&self, q: f64) -> BTreeMap<String, f64> {
        PortfolioVarCalculator::incremental_var(self, q)
    }
}

impl VarDecomposition for GroupVarCalculator {
    fn portfolio_var(&self, q: f64) -> f64 {
        GroupVarCalculator::portfolio_var(self, q)
    }

    fn isolated_var(&self, q: f64) -> BTreeMap<String, f64> {
        GroupVarCalculator::isolated_var(self, q)
    }

    fn component_var(&self, q: f64) -> BTreeMap<String, f64> {
        GroupVarCalculator::component_var(self, q)
    }

    fn incremental_var(&self, q: f64) -> BTreeMap<String, f64> {
        GroupVarCalculator::incremental_var(self, q)
    }
}

/// Confidence level with its one-sided standard normal quantile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceLevel {
    /// Column suffix, e.g. "95" or "97.5"
    pub label: String,
    pub probability: f64,
    pub z_score: f64,
}

impl ConfidenceLevel {
    /// Confidence level from a probability in (0, 1), e.g. 0.95
    pub fn from_probability(probability: f64) -> Result<Self> {
        if !(probability > 0.0 && probability < 1.0) {
            return Err(RiskError::InvalidConfidenceLevel(probability));
        }

        let normal = Normal::new(0.0, 1.0).map_err(|e| RiskError::InvalidParameter(e.to_string()))?;
        let z_score = normal.inverse_cdf(probability);

        // Round away binary noise so 0.95 labels as "95", not "95.00000000000001"
        let percent = (probability * 100.0 * 1e6).round() / 1e6;

        Ok(Self {
            label: percent.to_string(),
            probability,
            z_score,
        })
    }

    /// Confidence level from a z-score supplied directly
    pub fn from_z_score(label: impl Into<String>, z_score: f64) -> Result<Self> {
        if !z_score.is_finite() {
            return Err(RiskError::InvalidParameter(format!(
                "z-score must be finite, got {}",
                z_score
            )));
        }
        let normal = Normal::new(0.0, 1.0).map_err(|e| RiskError::InvalidParameter(e.to_string()))?;
        Ok(Self {
            label: label.into(),
            probability: normal.cdf(z_score),
            z_score,
        })
    }
}

/// How exposures become the weight vector `w`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExposureWeighting {
    /// Dollar exposures; VaR comes out in exposure units
    #[default]
    Raw,
    /// `exposure / sum(exposures)`; VaR comes out as a return
    Normalized,
}

/// Settings shared by portfolio and group calculators
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VarCalculatorConfig {
    #[serde(default)]
    pub weighting: ExposureWeighting,

    #[serde(default)]
    pub returns: ReturnConvention,

    #[serde(default)]
    pub covariance: CovarianceMethod,
}

impl VarCalculatorConfig {
    pub fn with_weighting(mut self, weighting: ExposureWeighting) -> Self {
        self.weighting = weighting;
        self
    }
}

/// Kind of VaR figure in a report row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarType {
    Portfolio,
    Isolated,
    Component,
    Incremental,
}

impl VarType {
    pub fn label(&self) -> &'static str {
        match self {
            VarType::Portfolio => "portfolio",
            VarType::Isolated => "isolated",
            VarType::Component => "component",
            VarType::Incremental => "incremental",
        }
    }

    /// Column prefix used by report pivots
    pub fn short_label(&self) -> &'static str {
        match self {
            VarType::Portfolio => "Port",
            VarType::Isolated => "Iso",
            VarType::Component => "Comp",
            VarType::Incremental => "Inc",
        }
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
