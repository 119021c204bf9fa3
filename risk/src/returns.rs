//! Returns estimation from wide price tables
//!
//! All components use the same convention, [`ReturnConvention::Simple`]
//! unless a run is configured otherwise:
//!
//! - Simple: r_t = (p_t - p_{t-1}) / p_{t-1}
//! - Log: r_t = ln(p_t / p_{t-1})
//!
//! The first row is dropped. A return is `NaN` when either adjacent price
//! is missing.

use crate::error::{Result, RiskError};
use crate::table::{PriceTable, ReturnTable, SeriesTable};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Return convention
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnConvention {
    #[default]
    Simple,
    Log,
}

impl ReturnConvention {
    #[inline]
    fn apply(self, previous: f64, current: f64) -> f64 {
        match self {
            ReturnConvention::Simple => (current - previous) / previous,
            ReturnConvention::Log => (current / previous).ln(),
        }
    }
}

/// Convert a price table into a return table
///
/// Every instrument with fewer than two observations is collected into a
/// single [`RiskError::InsufficientData`].
pub fn compute_returns(prices: &PriceTable, convention: ReturnConvention) -> Result<ReturnTable> {
    let values = prices.values();

    let insufficient: Vec<String> = prices
        .columns()
        .iter()
        .enumerate()
        .filter(|(j, _)| values.column(*j).iter().filter(|p| p.is_finite()).count() < 2)
        .map(|(_, ticker)| ticker.clone())
        .collect();
    if !insufficient.is_empty() {
        return Err(RiskError::InsufficientData {
            tickers: insufficient,
        });
    }

    for (j, ticker) in prices.columns().iter().enumerate() {
        if let Some(i) = values.column(j).iter().position(|p| p.is_finite() && *p <= 0.0) {
            return Err(RiskError::NonPositivePrice {
                ticker: ticker.clone(),
                date: prices.dates()[i],
            });
        }
    }

    let n_rows = prices.n_rows().saturating_sub(1);
    let returns = DMatrix::from_fn(n_rows, prices.n_cols(), |i, j| {
        let (previous, current) = (values[(i, j)], values[(i + 1, j)]);
        if previous.is_finite() && current.is_finite() {
            convention.apply(previous, current)
        } else {
            f64::NAN
        }
    });

    debug!(
        "Computed {:?} returns for {} instruments over {} dates",
        convention,
        prices.n_cols(),
        n_rows
    );

    SeriesTable::new(
        prices.dates().iter().skip(1).copied().collect(),
        prices.columns().to_vec(),
        returns,
    )
}

/// Spread factor defined as `long - short`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticFactor {
    pub name: String,
    pub long: String,
    pub short: String,
}

impl SyntheticFactor {
    pub fn new(name: impl Into<String>, long: impl Into<String>, short: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            long: long.into(),
            short: short.into(),
        }
    }
}

/// Spread factors to imply, and where to place them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticFactorSet {
    /// Synthetic factors are placed directly after this column
    pub risk_free_proxy: String,

    pub factors: Vec<SyntheticFactor>,

    /// Drop the source index columns from the output
    #[serde(default)]
    pub exclude_sources: bool,
}

impl Default for SyntheticFactorSet {
    /// Small-minus-big (Russell 1000 less Russell 2000) and growth-minus-value
    /// (Russell 3000 Growth less Russell 3000 Value) against 12M T-bills.
    fn default() -> Self {
        Self {
            risk_free_proxy: "LD12TRUU Index".to_string(),
            factors: vec![
                SyntheticFactor::new("RIY less RTY", "RIY Index", "RTY Index"),
                SyntheticFactor::new("RAG less RAV", "RAG Index", "RAV Index"),
            ],
            exclude_sources: false,
        }
    }
}

impl SyntheticFactorSet {
    fn source_columns(&self) -> Vec<&str> {
        self.factors
            .iter()
            .flat_map(|f| [f.long.as_str(), f.short.as_str()])
            .collect()
    }
}

/// Append spread factors to a return table
///
/// Output column order: every column up to and including the risk-free
/// proxy, then the synthetic factors, then the remaining columns. The input
/// table is left untouched.
pub fn imply_synthetic_factors(
    returns: &ReturnTable,
    factor_set: &SyntheticFactorSet,
) -> Result<ReturnTable> {
    let mut required = vec![factor_set.risk_free_proxy.as_str()];
    required.extend(factor_set.source_columns());
    let missing = returns.missing_columns(&required);
    if !missing.is_empty() {
        return Err(RiskError::UnknownColumns(missing));
    }

    let mut synthetic = Vec::with_capacity(factor_set.factors.len());
    for factor in &factor_set.factors {
        if returns.has_column(&factor.name) {
            return Err(RiskError::InvalidParameter(format!(
                "synthetic factor {} clashes with an existing column",
                factor.name
            )));
        }
        let long = returns.column(&factor.long).unwrap_or_default();
        let short = returns.column(&factor.short).unwrap_or_default();
        let spread: Vec<f64> = long.iter().zip(&short).map(|(l, s)| l - s).collect();
        synthetic.push((factor.name.clone(), spread));
    }

    let sources = factor_set.source_columns();
    let mut columns: Vec<(String, Vec<f64>)> = Vec::with_capacity(returns.n_cols() + synthetic.len());
    let mut synthetic = Some(synthetic);

    for (idx, name) in returns.columns().iter().enumerate() {
        if factor_set.exclude_sources && sources.contains(&name.as_str()) {
            continue;
        }
        columns.push((name.clone(), returns.column_at(idx)));
        if *name == factor_set.risk_free_proxy {
            columns.extend(synthetic.take().unwrap_or_default());
        }
    }

    SeriesTable::from_columns(returns.dates().to_vec(), columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::test_dates;
    use approx::assert_relative_eq;

    #[test]
    fn test_simple_returns() {
        let prices = SeriesTable::from_columns(
            test_dates(3),
            vec![("A", vec![100.0, 110.0, 99.0]), ("B", vec![50.0, 50.0, 55.0])],
        )
        .unwrap();

        let returns = compute_returns(&prices, ReturnConvention::Simple).unwrap();
        assert_eq!(returns.n_rows(), 2);
        assert_eq!(returns.dates(), &prices.dates()[1..]);
        assert_relative_eq!(returns.values()[(0, 0)], 0.1, epsilon = 1e-12);
        assert_relative_eq!(returns.values()[(1, 0)], -0.1, epsilon = 1e-12);
        assert_relative_eq!(returns.values()[(1, 1)], 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_log_returns() {
        let prices =
            SeriesTable::from_columns(test_dates(2), vec![("A", vec![100.0, 110.0])]).unwrap();
        let returns = compute_returns(&prices, ReturnConvention::Log).unwrap();
        assert_relative_eq!(returns.values()[(0, 0)], 1.1_f64.ln(), epsilon = 1e-15);
    }

    #[test]
    fn test_gap_yields_nan() {
        let prices = SeriesTable::from_columns(
            test_dates(4),
            vec![("A", vec![100.0, f64::NAN, 102.0, 103.0])],
        )
        .unwrap();
        let returns = compute_returns(&prices, ReturnConvention::Simple).unwrap();
        assert!(returns.values()[(0, 0)].is_nan());
        assert!(returns.values()[(1, 0)].is_nan());
        assert!(returns.values()[(2, 0)].is_finite());
    }

    #[test]
    fn test_insufficient_data_collects_all_tickers() {
        let prices = SeriesTable::from_columns(
            test_dates(3),
            vec![
                ("A", vec![f64::NAN, f64::NAN, 1.0]),
                ("B", vec![1.0, 2.0, 3.0]),
                ("C", vec![f64::NAN, f64::NAN, f64::NAN]),
            ],
        )
        .unwrap();

        match compute_returns(&prices, ReturnConvention::Simple) {
            Err(RiskError::InsufficientData { tickers }) => assert_eq!(tickers, vec!["A", "C"]),
            other => panic!("Expected InsufficientData, got {:?}", other),
        }
    }

    #[test]
    fn test_single_row_is_insufficient() {
        let prices =
            SeriesTable::from_columns(test_dates(1), vec![("A", vec![1.0]), ("B", vec![2.0])])
                .unwrap();
        match compute_returns(&prices, ReturnConvention::Simple) {
            Err(RiskError::InsufficientData { tickers }) => assert_eq!(tickers.len(), 2),
            other => panic!("Expected InsufficientData, got {:?}", other),
        }
    }

    #[test]
    fn test_non_positive_price_rejected() {
        let prices =
            SeriesTable::from_columns(test_dates(3), vec![("A", vec![1.0, 0.0, 2.0])]).unwrap();
        assert!(matches!(
            compute_returns(&prices, ReturnConvention::Simple),
            Err(RiskError::NonPositivePrice { .. })
        ));
    }

    fn factor_returns() -> ReturnTable {
        SeriesTable::from_columns(
            test_dates(5),
            vec![
                ("RIY Index", vec![1.0, 2.0, 3.0, 4.0, 5.0]),
                ("RTY Index", vec![2.0, 3.0, 4.0, 5.0, 6.0]),
                ("RAG Index", vec![3.0, 4.0, 5.0, 6.0, 7.0]),
                ("RAV Index", vec![4.0, 5.0, 6.0, 7.0, 8.0]),
                ("LD12TRUU Index", vec![0.1; 5]),
                ("SPX Index", vec![0.2; 5]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_imply_synthetic_factors_order_and_values() {
        let returns = factor_returns();
        let implied = imply_synthetic_factors(&returns, &SyntheticFactorSet::default()).unwrap();

        assert_eq!(
            implied.columns(),
            &[
                "RIY Index",
                "RTY Index",
                "RAG Index",
                "RAV Index",
                "LD12TRUU Index",
                "RIY less RTY",
                "RAG less RAV",
                "SPX Index",
            ]
        );
        assert_eq!(implied.column("RIY less RTY").unwrap(), vec![-1.0; 5]);
        assert_eq!(implied.column("RAG less RAV").unwrap(), vec![-1.0; 5]);

        // Input untouched
        assert_eq!(returns.n_cols(), 6);
    }

    #[test]
    fn test_imply_synthetic_factors_excluding_sources() {
        let factor_set = SyntheticFactorSet {
            exclude_sources: true,
            ..Default::default()
        };
        let implied = imply_synthetic_factors(&factor_returns(), &factor_set).unwrap();
        assert_eq!(
            implied.columns(),
            &["LD12TRUU Index", "RIY less RTY", "RAG less RAV", "SPX Index"]
        );
    }

    #[test]
    fn test_imply_synthetic_factors_missing_source() {
        let returns = factor_returns().without_columns(&["RTY Index"]);
        match imply_synthetic_factors(&returns, &SyntheticFactorSet::default()) {
            Err(RiskError::UnknownColumns(missing)) => assert_eq!(missing, vec!["RTY Index"]),
            other => panic!("Expected UnknownColumns, got {:?}", other),
        }
    }
}
