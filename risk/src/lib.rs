//! # mstrat-risk: Parametric VaR Decomposition for Multi-Strategy Portfolios
//!
//! This library attributes the parametric Value-at-Risk of a book of
//! positions to the positions themselves and to groups of them (fund,
//! sector, industry, country, market cap), and provides the factor
//! analytics that sit next to it.
//!
//! ## Core Components
//!
//! - **VarEngine**: Runs every VaR view for a price table and a position list
//! - **PortfolioVarCalculator / GroupVarCalculator**: Portfolio, isolated,
//!   component and incremental VaR per ticker or per group
//! - **Covariance**: Pairwise-complete sample and exponentially decayed estimators
//! - **BetaEstimator**: Per-position betas against factor returns
//! - **VarTable**: Long-format output with pivots and top-N views
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::NaiveDate;
//! use mstrat_risk::{Position, SeriesTable, VarEngine, VarType, POSITION_GROUP};
//!
//! let dates: Vec<NaiveDate> = (1..=5)
//!     .map(|d| NaiveDate::from_ymd_opt(2024, 3, d).unwrap())
//!     .collect();
//! let prices = SeriesTable::from_columns(
//!     dates,
//!     vec![
//!         ("AAA", vec![10.0, 10.4, 10.1, 10.6, 10.9]),
//!         ("BBB", vec![50.0, 49.0, 49.8, 50.5, 50.1]),
//!     ],
//! )
//! .unwrap();
//!
//! let positions = vec![
//!     Position::new("AAA", 1_000.0).with_sector("Tech"),
//!     Position::new("BBB", -400.0).with_sector("Energy"),
//! ];
//!
//! let yaml = r#"
//! confidence_levels: [0.95, 0.99]
//! dimensions: [sector]
//! "#;
//!
//! let engine = VarEngine::from_yaml(yaml).unwrap();
//! let report = engine.run(&prices, &positions).unwrap();
//!
//! let pivot = report.table.pivot(POSITION_GROUP);
//! assert_eq!(pivot.columns[0], "Iso95");
//! assert!(report.table.value("sector", VarType::Component, "99", "Tech").is_some());
//! ```

mod betas;
mod config;
mod covariance;
mod engine;
mod error;
mod exposures;
mod position;
mod report;
mod returns;
mod table;
mod var;

pub use betas::{calculate_position_betas, BetaConfig, BetaEstimator, BetaRow, BetaTable};
pub use config::{ReportConfig, RunConfig};
pub use covariance::{
    correlation_matrix, covariance_matrix, decay_covariance_matrix, decay_from_halflife,
    CovarianceMethod, DEFAULT_DECAY,
};
pub use engine::{DimensionFailure, FactorReport, VarEngine, VarReport};
pub use error::{Result, RiskError};
pub use exposures::{
    beta_adjusted_exposure_summary, exposure_summary, ExposureRow, ExposureSummary,
    DEFAULT_MARKET_FACTOR,
};
pub use position::{
    ExposureVector, GroupDimension, Position, DEGENERATE_EXPOSURE_TOLERANCE, UNCLASSIFIED_GROUP,
};
pub use report::{PivotRow, VarPivot, VarRow, VarTable, POSITION_GROUP, TOTAL_ATTRIBUTE};
pub use returns::{
    compute_returns, imply_synthetic_factors, ReturnConvention, SyntheticFactor,
    SyntheticFactorSet,
};
pub use table::{
    CorrelationMatrix, CovarianceMatrix, LabeledMatrix, PriceTable, ReturnTable, SeriesTable,
};
pub use var::{
    ConfidenceLevel, ExposureWeighting, GroupVarCalculator, PortfolioVarCalculator,
    VarCalculatorConfig, VarDecomposition, VarType,
};
