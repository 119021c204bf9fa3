//! VaR run orchestration
//!
//! [`VarEngine`] turns a price table and a position list into one long
//! [`VarTable`]: portfolio, isolated, component and incremental VaR for
//! individual positions and for every configured grouping dimension, at
//! every configured confidence level.
//!
//! Bad inputs degrade the run instead of aborting it: positions without
//! prices and instruments with too little history are dropped, and a
//! dimension that fails is reported in [`VarReport::failures`] while the
//! others are still returned.

use crate::betas::{BetaEstimator, BetaTable};
use crate::config::RunConfig;
use crate::covariance::correlation_matrix;
use crate::error::{Result, RiskError};
use crate::exposures::{exposure_summary, ExposureRow};
use crate::position::{GroupDimension, Position};
use crate::report::{VarRow, VarTable, POSITION_GROUP, TOTAL_ATTRIBUTE};
use crate::returns::{compute_returns, imply_synthetic_factors};
use crate::table::{CorrelationMatrix, CovarianceMatrix, PriceTable, ReturnTable};
use crate::var::{
    ConfidenceLevel, GroupVarCalculator, PortfolioVarCalculator, VarDecomposition, VarType,
};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A grouping dimension whose VaR could not be computed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionFailure {
    pub group: String,
    pub error: String,
}

/// Output of [`VarEngine::run`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct VarReport {
    pub table: VarTable,
    pub failures: Vec<DimensionFailure>,
    /// Position tickers with no price column
    pub missing_prices: Vec<String>,
    /// Tickers with fewer than two prices
    pub insufficient_history: Vec<String>,
}

impl VarReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
            && self.missing_prices.is_empty()
            && self.insufficient_history.is_empty()
    }
}

/// Factor analytics of [`VarEngine::factor_report`]
#[derive(Debug, Clone)]
pub struct FactorReport {
    /// Factor returns including any implied spread factors
    pub factor_returns: ReturnTable,
    pub betas: BetaTable,
    pub covariance: CovarianceMatrix,
    pub correlation: CorrelationMatrix,
}

/// VaR run engine
pub struct VarEngine {
    config: RunConfig,
}

impl VarEngine {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    /// Load a run configuration from a YAML string
    ///
    /// # Example
    ///
    /// ```
    /// use mstrat_risk::VarEngine;
    ///
    /// let yaml = r#"
    /// confidence_levels: [0.95]
    /// dimensions: [fund]
    /// "#;
    ///
    /// let engine = VarEngine::from_yaml(yaml).unwrap();
    /// assert_eq!(engine.config().dimensions.len(), 1);
    /// ```
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(Self::new(RunConfig::from_yaml(yaml)?))
    }

    /// Load a run configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::new(RunConfig::from_json(json)?))
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Compute every VaR figure for `positions`
    ///
    /// # Example
    ///
    /// ```
    /// use chrono::NaiveDate;
    /// use mstrat_risk::{Position, SeriesTable, VarEngine, VarType};
    ///
    /// let dates: Vec<NaiveDate> = (1..=4)
    ///     .map(|d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap())
    ///     .collect();
    /// let prices = SeriesTable::from_columns(
    ///     dates,
    ///     vec![("AAA", vec![10.0, 11.0, 10.5, 10.8]), ("BBB", vec![20.0, 19.0, 19.5, 20.5])],
    /// )
    /// .unwrap();
    /// let positions = vec![
    ///     Position::new("AAA", 100.0).with_fund("Fund 1"),
    ///     Position::new("BBB", 50.0).with_fund("Fund 2"),
    /// ];
    ///
    /// let engine = VarEngine::from_yaml("dimensions: [fund]").unwrap();
    /// let report = engine.run(&prices, &positions).unwrap();
    ///
    /// assert!(report.is_complete());
    /// assert!(report.table.value("fund", VarType::Isolated, "95", "Fund 1").is_some());
    /// ```
    pub fn run(&self, prices: &PriceTable, positions: &[Position]) -> Result<VarReport> {
        let levels = self.config.confidence_levels()?;
        info!(
            "Starting VaR run: {} positions, {} confidence levels, {} dimensions",
            positions.len(),
            levels.len(),
            self.config.dimensions.len()
        );

        let mut report = VarReport::default();

        let tickers: Vec<String> = positions
            .iter()
            .map(|p| p.ticker.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        report.missing_prices = prices.missing_columns(&tickers);
        if !report.missing_prices.is_empty() {
            warn!(
                "Excluding positions without price history: {}",
                report.missing_prices.join(", ")
            );
        }

        let priced: Vec<String> = tickers
            .into_iter()
            .filter(|t| !report.missing_prices.contains(t))
            .collect();
        let (returns, insufficient) = self.usable_returns(&prices.select(&priced)?)?;
        report.insufficient_history = insufficient;

        let usable: Vec<Position> = positions
            .iter()
            .filter(|p| returns.has_column(&p.ticker))
            .cloned()
            .collect();
        if usable.is_empty() {
            warn!("No positions with usable price history, VaR table is empty");
            return Ok(report);
        }

        let covariance = Arc::new(self.config.covariance.estimate(&returns)?);
        let portfolio = Arc::new(PortfolioVarCalculator::with_covariance(
            usable,
            covariance,
            self.config.calculator_config(),
        )?);

        let mut dimensions: Vec<Option<GroupDimension>> = vec![None];
        dimensions.extend(self.config.dimensions.iter().copied().map(Some));

        // Component weights are undefined for a book netting to zero
        if portfolio.exposures().is_degenerate() {
            let failure = RiskError::DegenerateNav(portfolio.exposures().total());
            error!("VaR run aborted: {}", failure);
            report.failures = dimensions
                .iter()
                .map(|dimension| DimensionFailure {
                    group: dimension.map_or(POSITION_GROUP, |d| d.label()).to_string(),
                    error: failure.to_string(),
                })
                .collect();
            return Ok(report);
        }

        let outcomes: Vec<(String, Result<VarTable>)> = dimensions
            .into_par_iter()
            .map(|dimension| match dimension {
                None => (
                    POSITION_GROUP.to_string(),
                    dimension_table(POSITION_GROUP, &*portfolio, &levels),
                ),
                Some(dimension) => {
                    let calculator = GroupVarCalculator::new(Arc::clone(&portfolio), dimension);
                    (
                        dimension.label().to_string(),
                        dimension_table(dimension.label(), &calculator, &levels),
                    )
                }
            })
            .collect();

        for (group, outcome) in outcomes {
            match outcome {
                Ok(table) => report.table.append(table),
                Err(e) => {
                    error!("VaR for {} failed: {}", group, e);
                    report.failures.push(DimensionFailure {
                        group,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "VaR run finished: {} rows, {} failed dimensions",
            report.table.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Betas, covariance and correlation of factor returns
    ///
    /// Spread factors from the configuration are implied before anything is
    /// estimated.
    pub fn factor_report(
        &self,
        factor_prices: &PriceTable,
        position_prices: &PriceTable,
    ) -> Result<FactorReport> {
        let mut factor_returns = compute_returns(factor_prices, self.config.returns)?;
        if let Some(factor_set) = &self.config.synthetic_factors {
            factor_returns = imply_synthetic_factors(&factor_returns, factor_set)?;
        }
        let position_returns = compute_returns(position_prices, self.config.returns)?;

        info!("Calculating factor betas");
        let estimator = BetaEstimator::new(self.config.betas.clone());
        let betas = estimator.estimate(&factor_returns, &position_returns)?;
        let covariance = self.config.covariance.estimate(&factor_returns)?;
        let correlation = correlation_matrix(&factor_returns)?;

        Ok(FactorReport {
            factor_returns,
            betas,
            covariance,
            correlation,
        })
    }

    /// Long / short / gross / net exposure per configured dimension
    pub fn exposure_report(&self, positions: &[Position], nav: f64) -> Result<Vec<ExposureRow>> {
        exposure_summary(positions, &self.config.dimensions, nav)
    }

    /// Returns of the priced tickers, dropping those with too little history
    ///
    /// A ticker needs two returns, not just two prices, for its variance to
    /// be defined.
    fn usable_returns(&self, prices: &PriceTable) -> Result<(ReturnTable, Vec<String>)> {
        let (returns, mut insufficient) = match compute_returns(prices, self.config.returns) {
            Ok(returns) => (returns, Vec::new()),
            Err(RiskError::InsufficientData { tickers }) => {
                warn!(
                    "Excluding tickers with fewer than 2 prices: {}",
                    tickers.join(", ")
                );
                let retained = prices.without_columns(&tickers);
                (compute_returns(&retained, self.config.returns)?, tickers)
            }
            Err(e) => return Err(e),
        };

        let values = returns.values();
        let short: Vec<String> = returns
            .columns()
            .iter()
            .enumerate()
            .filter(|(j, _)| values.column(*j).iter().filter(|r| r.is_finite()).count() < 2)
            .map(|(_, ticker)| ticker.clone())
            .collect();
        if short.is_empty() {
            return Ok((returns, insufficient));
        }

        warn!(
            "Excluding tickers with fewer than 2 returns: {}",
            short.join(", ")
        );
        let returns = returns.without_columns(&short);
        insufficient.extend(short);
        insufficient.sort();
        Ok((returns, insufficient))
    }
}

/// Every VaR row of one calculator at every confidence level
fn dimension_table(
    group: &str,
    calculator: &dyn VarDecomposition,
    levels: &[ConfidenceLevel],
) -> Result<VarTable> {
    let mut table = VarTable::new();
    for level in levels {
        let q = level.z_score;
        table.push(VarRow {
            group: group.to_string(),
            var_type: VarType::Portfolio,
            confidence: level.label.clone(),
            attribute: TOTAL_ATTRIBUTE.to_string(),
            value: calculator.portfolio_var(q),
        });
        let views = [
            (VarType::Isolated, calculator.isolated_var(q)),
            (VarType::Component, calculator.component_var(q)),
            (VarType::Incremental, calculator.incremental_var(q)),
        ];
        for (var_type, values) in &views {
            table.extend_from_map(group, *var_type, &level.label, values);
        }
        debug!("Finished {} VaR at {}%", group, level.label);
    }

    if let Some(row) = table.rows().iter().find(|r| !r.value.is_finite()) {
        return Err(RiskError::MatrixError(format!(
            "non-finite {} VaR for {} at {}%",
            row.var_type, row.attribute, row.confidence
        )));
    }
    Ok(table)
}
