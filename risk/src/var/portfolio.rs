//! Ticker-level VaR decomposition

use super::{ExposureWeighting, VarCalculatorConfig};
use crate::covariance::clamped_sqrt;
use crate::error::{Result, RiskError};
use crate::position::{ExposureVector, Position};
use crate::returns::compute_returns;
use crate::table::{CovarianceMatrix, PriceTable};
use nalgebra::DVector;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// Portfolio VaR calculator over a fixed set of positions
///
/// Holds the covariance of its tickers' returns behind an `Arc` so that the
/// calculators built for incremental VaR slice the same matrix instead of
/// re-estimating it. Standard deviations are computed on first use and
/// cached; VaR at any z-score is a multiple of them.
#[derive(Debug)]
pub struct PortfolioVarCalculator {
    positions: Vec<Position>,
    exposures: ExposureVector,
    covariance: Arc<CovarianceMatrix>,
    config: VarCalculatorConfig,

    portfolio_std: OnceLock<f64>,
    ticker_stds: OnceLock<BTreeMap<String, f64>>,
    incremental_stds: OnceLock<BTreeMap<String, f64>>,
}

impl PortfolioVarCalculator {
    /// Estimate returns and covariance from a price table
    ///
    /// Fails with [`RiskError::MissingPriceData`] when a position's ticker has
    /// no price column, and with [`RiskError::InsufficientData`] when a ticker
    /// has fewer than two prices.
    pub fn new(
        prices: &PriceTable,
        positions: Vec<Position>,
        config: VarCalculatorConfig,
    ) -> Result<Self> {
        let tickers: Vec<String> = positions
            .iter()
            .map(|p| p.ticker.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let missing = prices.missing_columns(&tickers);
        if !missing.is_empty() {
            return Err(RiskError::MissingPriceData { tickers: missing });
        }

        let returns = compute_returns(&prices.select(&tickers)?, config.returns)?;
        let covariance = config.covariance.estimate(&returns)?;

        Self::with_covariance(positions, Arc::new(covariance), config)
    }

    /// Build over a covariance matrix that is already estimated
    ///
    /// The matrix may cover more tickers than the positions reference.
    pub fn with_covariance(
        positions: Vec<Position>,
        covariance: Arc<CovarianceMatrix>,
        config: VarCalculatorConfig,
    ) -> Result<Self> {
        let missing: Vec<String> = positions
            .iter()
            .map(|p| p.ticker.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter(|t| !covariance.contains(t))
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(RiskError::MissingPriceData { tickers: missing });
        }

        Ok(Self::from_parts(positions, covariance, config))
    }

    fn from_parts(
        positions: Vec<Position>,
        covariance: Arc<CovarianceMatrix>,
        config: VarCalculatorConfig,
    ) -> Self {
        let exposures = ExposureVector::from_positions(&positions);
        Self {
            positions,
            exposures,
            covariance,
            config,
            portfolio_std: OnceLock::new(),
            ticker_stds: OnceLock::new(),
            incremental_stds: OnceLock::new(),
        }
    }

    /// Fresh calculator over every position for which `exclude` is false
    ///
    /// Shares this calculator's covariance matrix.
    pub fn without_positions<F>(&self, exclude: F) -> Self
    where
        F: Fn(&Position) -> bool,
    {
        let positions = self
            .positions
            .iter()
            .filter(|p| !exclude(p))
            .cloned()
            .collect();
        Self::from_parts(positions, Arc::clone(&self.covariance), self.config.clone())
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn exposures(&self) -> &ExposureVector {
        &self.exposures
    }

    pub fn covariance(&self) -> &Arc<CovarianceMatrix> {
        &self.covariance
    }

    pub fn config(&self) -> &VarCalculatorConfig {
        &self.config
    }

    /// Exposure over total exposure per ticker, zero-filled when the total is zero
    pub fn weights(&self) -> BTreeMap<String, f64> {
        if self.exposures.is_degenerate() && !self.exposures.is_empty() {
            warn!(
                "Exposures of {} tickers sum to zero, weights are zero-filled",
                self.exposures.len()
            );
        }
        self.exposures.weights()
    }

    pub fn portfolio_var(&self, q: f64) -> f64 {
        self.portfolio_std() * q
    }

    /// Stand-alone VaR of each ticker
    ///
    /// `sqrt(Σ_tt) * q` scaled by the ticker's absolute exposure under
    /// [`ExposureWeighting::Raw`], so it is in the same units as
    /// [`portfolio_var`](Self::portfolio_var).
    pub fn isolated_var(&self, q: f64) -> BTreeMap<String, f64> {
        self.ticker_stds()
            .iter()
            .map(|(ticker, std)| (ticker.clone(), std * q))
            .collect()
    }

    /// Components sum to [`portfolio_var`](Self::portfolio_var)
    pub fn component_var(&self, q: f64) -> BTreeMap<String, f64> {
        let portfolio_var = self.portfolio_var(q);
        self.weights()
            .into_iter()
            .map(|(ticker, weight)| (ticker, weight * portfolio_var))
            .collect()
    }

    /// Portfolio VaR minus the VaR of the portfolio without each ticker
    pub fn incremental_var(&self, q: f64) -> BTreeMap<String, f64> {
        self.incremental_stds()
            .iter()
            .map(|(ticker, delta)| (ticker.clone(), delta * q))
            .collect()
    }

    pub fn portfolio_std(&self) -> f64 {
        *self.portfolio_std.get_or_init(|| {
            let weights: BTreeMap<String, f64> = match self.config.weighting {
                ExposureWeighting::Raw => self
                    .exposures
                    .iter()
                    .map(|(ticker, exposure)| (ticker.to_string(), exposure))
                    .collect(),
                ExposureWeighting::Normalized => self.weights(),
            };
            self.weighted_std(&weights, "portfolio")
        })
    }

    fn ticker_stds(&self) -> &BTreeMap<String, f64> {
        self.ticker_stds.get_or_init(|| {
            self.exposures
                .iter()
                .map(|(ticker, exposure)| {
                    let weight = match self.config.weighting {
                        ExposureWeighting::Raw => exposure,
                        ExposureWeighting::Normalized => 1.0,
                    };
                    let single = BTreeMap::from([(ticker.to_string(), weight)]);
                    (ticker.to_string(), self.weighted_std(&single, ticker))
                })
                .collect()
        })
    }

    fn incremental_stds(&self) -> &BTreeMap<String, f64> {
        self.incremental_stds.get_or_init(|| {
            let total = self.portfolio_std();
            let tickers = self.exposures.tickers();
            debug!("Re-running portfolio VaR without each of {} tickers", tickers.len());

            tickers
                .into_par_iter()
                .map(|ticker| {
                    let without = self.without_positions(|p| p.ticker == ticker);
                    let delta = total - without.portfolio_std();
                    (ticker, delta)
                })
                .collect()
        })
    }

    /// `sqrt(wᵀ Σ w)` for a ticker-keyed weight vector over the shared covariance
    ///
    /// `NaN` when a weighted ticker is missing from the matrix or has an
    /// undefined covariance entry.
    pub(crate) fn weighted_std(&self, weights: &BTreeMap<String, f64>, context: &str) -> f64 {
        if weights.is_empty() {
            return 0.0;
        }

        let tickers: Vec<&str> = weights.keys().map(String::as_str).collect();
        let sigma = match self.covariance.submatrix(&tickers) {
            Ok(sigma) => sigma,
            Err(e) => {
                warn!("Cannot slice covariance for {}: {}", context, e);
                return f64::NAN;
            }
        };
        let w = DVector::from_iterator(weights.len(), weights.values().copied());

        let variance = (&w.transpose() * sigma.values() * &w)[(0, 0)];
        clamped_sqrt(variance, context)
    }
}
