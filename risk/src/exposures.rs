//! Long / short / gross / net exposure per group, as a fraction of firm NAV

use crate::betas::BetaTable;
use crate::error::{Result, RiskError};
use crate::position::{GroupDimension, Position};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Factor used for beta-adjusted exposure unless another is requested
pub const DEFAULT_MARKET_FACTOR: &str = "SPX Index";

/// Exposure figures for one group
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ExposureSummary {
    pub long: f64,
    pub short: f64,
    pub gross: f64,
    pub net: f64,
}

impl ExposureSummary {
    /// Summarise `(exposure, value)` pairs
    ///
    /// The sign of `exposure` decides whether `value` counts as long or short.
    pub fn from_exposures<I>(exposures: I) -> Self
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let (mut long, mut short) = (0.0, 0.0);
        for (exposure, value) in exposures {
            if exposure > 0.0 {
                long += value;
            } else if exposure < 0.0 {
                short += value;
            }
        }
        Self {
            long,
            short,
            gross: long + short.abs(),
            net: long + short,
        }
    }

    fn scaled(self, nav: f64) -> Self {
        Self {
            long: self.long / nav,
            short: self.short / nav,
            gross: self.gross / nav,
            net: self.net / nav,
        }
    }
}

/// Summary of one group along one dimension
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExposureRow {
    pub dimension: GroupDimension,
    pub group: String,
    #[serde(flatten)]
    pub summary: ExposureSummary,
}

/// Exposure summary of every group in every dimension, divided by `nav`
pub fn exposure_summary(
    positions: &[Position],
    dimensions: &[GroupDimension],
    nav: f64,
) -> Result<Vec<ExposureRow>> {
    summarise(positions, dimensions, nav, |p| p.exposure)
}

/// Like [`exposure_summary`] with each exposure multiplied by its beta to `factor`
///
/// Positions with no beta, or a `NaN` beta, contribute nothing.
pub fn beta_adjusted_exposure_summary(
    positions: &[Position],
    dimensions: &[GroupDimension],
    betas: &BetaTable,
    factor: &str,
    nav: f64,
) -> Result<Vec<ExposureRow>> {
    if !betas.factors.iter().any(|f| f == factor) {
        return Err(RiskError::UnknownColumns(vec![factor.to_string()]));
    }

    summarise(positions, dimensions, nav, |p| match betas.get(&p.ticker, factor) {
        Some(beta) if beta.is_finite() => beta * p.exposure,
        _ => {
            debug!("No {} beta for {}, beta-adjusted exposure is zero", factor, p.ticker);
            0.0
        }
    })
}

fn summarise<F>(
    positions: &[Position],
    dimensions: &[GroupDimension],
    nav: f64,
    value: F,
) -> Result<Vec<ExposureRow>>
where
    F: Fn(&Position) -> f64,
{
    if !nav.is_finite() || nav == 0.0 {
        return Err(RiskError::DegenerateNav(nav));
    }

    let mut rows = Vec::new();
    for dimension in dimensions {
        let mut groups: BTreeMap<&str, Vec<(f64, f64)>> = BTreeMap::new();
        for position in positions {
            groups
                .entry(position.group(*dimension))
                .or_default()
                .push((position.exposure, value(position)));
        }

        rows.extend(groups.into_iter().map(|(group, exposures)| ExposureRow {
            dimension: *dimension,
            group: group.to_string(),
            summary: ExposureSummary::from_exposures(exposures).scaled(nav),
        }));
    }
    Ok(rows)
}
