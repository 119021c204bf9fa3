//! Factor betas for individual positions
//!
//! `beta = Cov(p, f) / Var(f)` for every (position, factor) pair, with both
//! series demeaned over the observations they share. An optional risk-free
//! column is subtracted from both series first.

use crate::covariance::pairwise_moments;
use crate::error::{Result, RiskError};
use crate::table::ReturnTable;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Beta estimation settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BetaConfig {
    /// Factor column holding the risk-free return; excluded from the output
    #[serde(default)]
    pub risk_free: Option<String>,
}

/// Betas of one position against every factor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BetaRow {
    pub ticker: String,
    pub betas: Vec<f64>,
}

/// Wide beta table: one row per position, one column per factor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BetaTable {
    pub factors: Vec<String>,
    pub rows: Vec<BetaRow>,
}

impl BetaTable {
    pub fn get(&self, ticker: &str, factor: &str) -> Option<f64> {
        let col = self.factors.iter().position(|f| f == factor)?;
        self.row(ticker).map(|row| row.betas[col])
    }

    pub fn row(&self, ticker: &str) -> Option<&BetaRow> {
        self.rows.iter().find(|r| r.ticker == ticker)
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> + '_ {
        self.rows.iter().map(|r| r.ticker.as_str())
    }
}

/// Beta estimator
pub struct BetaEstimator {
    config: BetaConfig,
}

impl BetaEstimator {
    pub fn new(config: BetaConfig) -> Self {
        Self { config }
    }

    /// Regress every position's returns on every factor's returns
    ///
    /// Only dates present in both tables are used. A factor with zero (or
    /// undefined) variance yields `NaN` betas rather than an error.
    pub fn estimate(
        &self,
        factor_returns: &ReturnTable,
        position_returns: &ReturnTable,
    ) -> Result<BetaTable> {
        let (factors, positions) = factor_returns.align(position_returns);
        if factors.n_rows() == 0 {
            return Err(RiskError::InvalidParameter(
                "factor and position returns share no dates".to_string(),
            ));
        }

        let risk_free = match &self.config.risk_free {
            Some(column) => Some(
                factors
                    .column(column)
                    .ok_or_else(|| RiskError::UnknownColumns(vec![column.clone()]))?,
            ),
            None => None,
        };
        let excess = |series: Vec<f64>| -> Vec<f64> {
            match &risk_free {
                Some(rf) => series.iter().zip(rf).map(|(r, f)| r - f).collect(),
                None => series,
            }
        };

        let factor_series: Vec<(String, Vec<f64>)> = factors
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, name)| self.config.risk_free.as_deref() != Some(name.as_str()))
            .map(|(idx, name)| (name.clone(), excess(factors.column_at(idx))))
            .collect();

        let rows: Vec<BetaRow> = positions
            .columns()
            .par_iter()
            .enumerate()
            .map(|(idx, ticker)| {
                let position = excess(positions.column_at(idx));
                let betas = factor_series
                    .iter()
                    .map(|(_, factor)| beta(&position, factor))
                    .collect();
                BetaRow {
                    ticker: ticker.clone(),
                    betas,
                }
            })
            .collect();

        debug!(
            "Estimated betas over {} common dates",
            factors.n_rows()
        );
        info!(
            "Done calculating betas for {} positions against {} factors",
            rows.len(),
            factor_series.len()
        );

        Ok(BetaTable {
            factors: factor_series.into_iter().map(|(name, _)| name).collect(),
            rows,
        })
    }
}

/// Betas with no risk-free adjustment
pub fn calculate_position_betas(
    factor_returns: &ReturnTable,
    position_returns: &ReturnTable,
) -> Result<BetaTable> {
    BetaEstimator::new(BetaConfig::default()).estimate(factor_returns, position_returns)
}

fn beta(position: &[f64], factor: &[f64]) -> f64 {
    match pairwise_moments(position, factor) {
        Some((cov, _, var_factor)) if var_factor > 0.0 => cov / var_factor,
        _ => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{test_dates, SeriesTable};
    use approx::assert_relative_eq;

    fn factor_returns() -> ReturnTable {
        SeriesTable::from_columns(
            test_dates(5),
            vec![
                ("RF", vec![0.001, 0.001, 0.001, 0.001, 0.001]),
                ("SPX", vec![0.01, -0.02, 0.015, 0.005, -0.01]),
                ("Flat", vec![0.0, 0.0, 0.0, 0.0, 0.0]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_identical_series_have_unit_beta() {
        let factors = factor_returns();
        let positions = SeriesTable::from_columns(
            test_dates(5),
            vec![
                ("Tracker", factors.column("SPX").unwrap()),
                (
                    "Levered",
                    factors.column("SPX").unwrap().iter().map(|r| 2.0 * r + 0.001).collect(),
                ),
            ],
        )
        .unwrap();

        let betas = calculate_position_betas(&factors, &positions).unwrap();
        assert_eq!(betas.factors, vec!["RF", "SPX", "Flat"]);
        assert_relative_eq!(betas.get("Tracker", "SPX").unwrap(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(betas.get("Levered", "SPX").unwrap(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_variance_factor_is_nan() {
        let factors = factor_returns();
        let positions =
            SeriesTable::from_columns(test_dates(5), vec![("A", vec![0.01, 0.02, 0.0, -0.01, 0.03])])
                .unwrap();

        let betas = calculate_position_betas(&factors, &positions).unwrap();
        assert!(betas.get("A", "Flat").unwrap().is_nan());
        assert!(betas.get("A", "RF").unwrap().is_nan());
        assert!(betas.get("A", "SPX").unwrap().is_finite());
    }

    #[test]
    fn test_risk_free_column_is_excluded() {
        let factors = factor_returns();
        let positions = SeriesTable::from_columns(
            test_dates(5),
            vec![("Tracker", factors.column("SPX").unwrap())],
        )
        .unwrap();

        let estimator = BetaEstimator::new(BetaConfig {
            risk_free: Some("RF".to_string()),
        });
        let betas = estimator.estimate(&factors, &positions).unwrap();
        assert_eq!(betas.factors, vec!["SPX", "Flat"]);
        assert_relative_eq!(betas.get("Tracker", "SPX").unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_unknown_risk_free_column() {
        let factors = factor_returns();
        let estimator = BetaEstimator::new(BetaConfig {
            risk_free: Some("LD12TRUU Index".to_string()),
        });
        assert!(matches!(
            estimator.estimate(&factors, &factors),
            Err(RiskError::UnknownColumns(_))
        ));
    }

    #[test]
    fn test_common_window_only() {
        let dates = test_dates(6);
        let factors = SeriesTable::from_columns(
            dates[..5].to_vec(),
            vec![("SPX", vec![0.01, -0.02, 0.015, 0.005, -0.01])],
        )
        .unwrap();
        // Extra trailing date is ignored; values on shared dates are 3x the factor
        let positions = SeriesTable::from_columns(
            dates[1..].to_vec(),
            vec![("A", vec![-0.06, 0.045, 0.015, -0.03, 0.5])],
        )
        .unwrap();

        let betas = calculate_position_betas(&factors, &positions).unwrap();
        assert_relative_eq!(betas.get("A", "SPX").unwrap(), 3.0, epsilon = 1e-12);
    }
}
