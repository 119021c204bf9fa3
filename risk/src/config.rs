//! Run configuration
//!
//! A [`RunConfig`] document selects confidence levels, grouping dimensions
//! and estimator settings for one VaR run. Every field has a default, so an
//! empty document is a valid configuration.
//!
//! ```yaml
//! confidence_levels: [0.95, 0.99]
//! dimensions: [fund, sector]
//! weighting: normalized
//! covariance:
//!   method: decayed
//!   decay: 0.94
//! betas:
//!   risk_free: LD12TRUU Index
//! report:
//!   top_n: 10
//! ```

use crate::betas::BetaConfig;
use crate::covariance::CovarianceMethod;
use crate::error::{Result, RiskError};
use crate::position::GroupDimension;
use crate::returns::{ReturnConvention, SyntheticFactorSet};
use crate::var::{ConfidenceLevel, ExposureWeighting, VarCalculatorConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for a full VaR and factor run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Probabilities in (0, 1), converted to z-scores at run time
    pub confidence_levels: Vec<f64>,

    /// Group dimensions to report in addition to individual positions
    pub dimensions: Vec<GroupDimension>,

    pub weighting: ExposureWeighting,

    pub returns: ReturnConvention,

    pub covariance: CovarianceMethod,

    /// Spread factors implied before factor covariance and betas
    pub synthetic_factors: Option<SyntheticFactorSet>,

    pub betas: BetaConfig,

    pub report: ReportConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            confidence_levels: vec![0.95, 0.99],
            dimensions: GroupDimension::ALL.to_vec(),
            weighting: ExposureWeighting::default(),
            returns: ReturnConvention::default(),
            covariance: CovarianceMethod::default(),
            synthetic_factors: Some(SyntheticFactorSet::default()),
            betas: BetaConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

/// Report shaping options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Rows kept by top contributor / diversifier views
    pub top_n: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { top_n: 10 }
    }
}

impl RunConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: RunConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: RunConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a `.json` file as JSON and anything else as YAML
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_yaml(&contents),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.confidence_levels.is_empty() {
            return Err(RiskError::InvalidParameter(
                "at least one confidence level is required".to_string(),
            ));
        }
        for level in &self.confidence_levels {
            if !(*level > 0.0 && *level < 1.0) {
                return Err(RiskError::InvalidConfidenceLevel(*level));
            }
        }

        self.covariance.validate()?;

        if self.report.top_n == 0 {
            return Err(RiskError::InvalidParameter(
                "report.top_n must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn confidence_levels(&self) -> Result<Vec<ConfidenceLevel>> {
        self.confidence_levels
            .iter()
            .map(|p| ConfidenceLevel::from_probability(*p))
            .collect()
    }

    pub fn calculator_config(&self) -> VarCalculatorConfig {
        VarCalculatorConfig {
            weighting: self.weighting,
            returns: self.returns,
            covariance: self.covariance,
        }
    }
}
