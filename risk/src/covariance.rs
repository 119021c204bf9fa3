//! Covariance and correlation estimation
//!
//! Entries are computed pairwise over complete observations: for each pair of
//! columns only the dates where both returns are present contribute. Sample
//! statistics use Bessel's correction (N-1).
//!
//! The decay-weighted estimator scales row `t` (oldest first) of an `n`-row
//! window by `sqrt((1 - d) * d^(n-1-t))` before taking the sample
//! covariance, so the most recent observation carries the largest weight.

use crate::error::{Result, RiskError};
use crate::table::{CorrelationMatrix, CovarianceMatrix, ReturnTable};
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// RiskMetrics daily decay factor
pub const DEFAULT_DECAY: f64 = 0.94;

/// Covariance estimator selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum CovarianceMethod {
    /// Equal-weighted sample covariance
    #[default]
    Sample,
    /// Exponentially decay-weighted covariance
    Decayed {
        #[serde(default = "default_decay")]
        decay: f64,
    },
}

fn default_decay() -> f64 {
    DEFAULT_DECAY
}

impl CovarianceMethod {
    pub fn estimate(&self, returns: &ReturnTable) -> Result<CovarianceMatrix> {
        match self {
            CovarianceMethod::Sample => covariance_matrix(returns),
            CovarianceMethod::Decayed { decay } => decay_covariance_matrix(returns, *decay),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            CovarianceMethod::Sample => Ok(()),
            CovarianceMethod::Decayed { decay } => check_decay(*decay),
        }
    }
}

fn check_decay(decay: f64) -> Result<()> {
    if decay > 0.0 && decay < 1.0 {
        Ok(())
    } else {
        Err(RiskError::InvalidParameter(format!(
            "decay must lie in (0, 1), got {}",
            decay
        )))
    }
}

/// Bessel-corrected sample covariance over pairwise-complete observations
pub fn covariance_matrix(returns: &ReturnTable) -> Result<CovarianceMatrix> {
    let values = pairwise_matrix(returns.values(), pairwise_covariance);
    debug!("Estimated {}x{} covariance matrix", values.nrows(), values.ncols());
    CovarianceMatrix::new(returns.columns().to_vec(), values)
}

/// Sample covariance of decay-weighted returns
pub fn decay_covariance_matrix(returns: &ReturnTable, decay: f64) -> Result<CovarianceMatrix> {
    check_decay(decay)?;

    let n = returns.n_rows();
    let weights: Vec<f64> = (0..n)
        .map(|t| ((1.0 - decay) * decay.powi((n - 1 - t) as i32)).sqrt())
        .collect();

    covariance_matrix(&returns.scale_rows(&weights)?)
}

/// Decay factor whose weights halve every `halflife` observations
pub fn decay_from_halflife(halflife: f64) -> Result<f64> {
    if !(halflife.is_finite() && halflife > 0.0) {
        return Err(RiskError::InvalidParameter(format!(
            "halflife must be positive, got {}",
            halflife
        )));
    }
    Ok(0.5_f64.powf(1.0 / halflife))
}

/// Pairwise Pearson correlation, clamped to [-1, 1]
///
/// Columns with zero variance produce `NaN`, including on the diagonal.
pub fn correlation_matrix(returns: &ReturnTable) -> Result<CorrelationMatrix> {
    let values = pairwise_matrix(returns.values(), pairwise_correlation);
    CorrelationMatrix::new(returns.columns().to_vec(), values)
}

/// Square root of a variance, clamping numerical noise below zero
///
/// `NaN` passes through: it marks a covariance entry with too few
/// overlapping observations, not rounding error.
pub(crate) fn clamped_sqrt(variance: f64, context: &str) -> f64 {
    if variance < 0.0 {
        warn!("Clamping variance {} to zero for {}", variance, context);
        0.0
    } else {
        variance.sqrt()
    }
}

/// Fill a symmetric matrix by evaluating `stat` on every column pair
fn pairwise_matrix<F>(values: &DMatrix<f64>, stat: F) -> DMatrix<f64>
where
    F: Fn(&[f64], &[f64]) -> f64 + Sync,
{
    let n = values.ncols();
    let columns: Vec<Vec<f64>> = (0..n)
        .map(|j| values.column(j).iter().copied().collect())
        .collect();

    let upper: Vec<(usize, usize, f64)> = (0..n)
        .into_par_iter()
        .flat_map_iter(|i| {
            let columns = &columns;
            let stat = &stat;
            (i..n).map(move |j| (i, j, stat(&columns[i], &columns[j])))
        })
        .collect();

    let mut matrix = DMatrix::from_element(n, n, f64::NAN);
    for (i, j, value) in upper {
        matrix[(i, j)] = value;
        matrix[(j, i)] = value;
    }
    matrix
}

/// Observations where both series are present
fn complete_pairs(x: &[f64], y: &[f64]) -> Vec<(f64, f64)> {
    x.iter()
        .zip(y)
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(a, b)| (*a, *b))
        .collect()
}

/// (covariance, variance of x, variance of y) over complete pairs
pub(crate) fn pairwise_moments(x: &[f64], y: &[f64]) -> Option<(f64, f64, f64)> {
    let pairs = complete_pairs(x, y);
    let n = pairs.len();
    if n < 2 {
        return None;
    }

    let mean_x = pairs.iter().map(|(a, _)| a).sum::<f64>() / n as f64;
    let mean_y = pairs.iter().map(|(_, b)| b).sum::<f64>() / n as f64;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (a, b) in &pairs {
        let (dx, dy) = (a - mean_x, b - mean_y);
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let dof = (n - 1) as f64;
    Some((cov / dof, var_x / dof, var_y / dof))
}

fn pairwise_covariance(x: &[f64], y: &[f64]) -> f64 {
    pairwise_moments(x, y).map_or(f64::NAN, |(cov, _, _)| cov)
}

fn pairwise_correlation(x: &[f64], y: &[f64]) -> f64 {
    match pairwise_moments(x, y) {
        Some((cov, var_x, var_y)) if var_x > 0.0 && var_y > 0.0 => {
            (cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0)
        }
        _ => f64::NAN,
    }
}
