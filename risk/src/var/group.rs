//! Group-level VaR decomposition

use super::{ExposureWeighting, PortfolioVarCalculator, VarCalculatorConfig};
use crate::error::Result;
use crate::position::{ExposureVector, GroupDimension, Position};
use crate::table::PriceTable;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// VaR per group of positions along one [`GroupDimension`]
///
/// Positions with no value for the dimension form the
/// [`UNCLASSIFIED_GROUP`](crate::position::UNCLASSIFIED_GROUP) group, so
/// group exposures always add up to the portfolio's.
#[derive(Debug)]
pub struct GroupVarCalculator {
    portfolio: Arc<PortfolioVarCalculator>,
    dimension: GroupDimension,

    group_stds: OnceLock<BTreeMap<String, f64>>,
    incremental_stds: OnceLock<BTreeMap<String, f64>>,
}

impl GroupVarCalculator {
    pub fn new(portfolio: Arc<PortfolioVarCalculator>, dimension: GroupDimension) -> Self {
        Self {
            portfolio,
            dimension,
            group_stds: OnceLock::new(),
            incremental_stds: OnceLock::new(),
        }
    }

    /// Estimate a fresh portfolio calculator from prices and wrap it
    pub fn from_prices(
        prices: &PriceTable,
        positions: Vec<Position>,
        dimension: GroupDimension,
        config: VarCalculatorConfig,
    ) -> Result<Self> {
        let portfolio = PortfolioVarCalculator::new(prices, positions, config)?;
        Ok(Self::new(Arc::new(portfolio), dimension))
    }

    pub fn dimension(&self) -> GroupDimension {
        self.dimension
    }

    pub fn portfolio(&self) -> &PortfolioVarCalculator {
        &self.portfolio
    }

    /// Summed exposure per ticker within each group
    pub fn group_positions(&self) -> BTreeMap<String, ExposureVector> {
        let mut grouped: BTreeMap<String, Vec<&Position>> = BTreeMap::new();
        for position in self.portfolio.positions() {
            grouped
                .entry(position.group(self.dimension).to_string())
                .or_default()
                .push(position);
        }

        grouped
            .into_iter()
            .map(|(group, positions)| (group, ExposureVector::from_positions(positions)))
            .collect()
    }

    /// Exposure per ticker within each group over total portfolio exposure
    pub fn group_weights(&self) -> BTreeMap<String, BTreeMap<String, f64>> {
        let total = self.portfolio.exposures().total();
        self.group_positions()
            .into_iter()
            .map(|(group, exposures)| (group, exposures.weights_against(total)))
            .collect()
    }

    pub fn portfolio_var(&self, q: f64) -> f64 {
        self.portfolio.portfolio_var(q)
    }

    /// Stand-alone VaR of each group's sub-portfolio
    pub fn isolated_var(&self, q: f64) -> BTreeMap<String, f64> {
        self.group_stds()
            .iter()
            .map(|(group, std)| (group.clone(), std * q))
            .collect()
    }

    /// Portfolio VaR times the group's share of exposure
    pub fn component_var(&self, q: f64) -> BTreeMap<String, f64> {
        let portfolio_var = self.portfolio_var(q);
        self.group_weights()
            .into_iter()
            .map(|(group, weights)| (group, weights.values().sum::<f64>() * portfolio_var))
            .collect()
    }

    /// Portfolio VaR minus the VaR of the portfolio without each group
    pub fn incremental_var(&self, q: f64) -> BTreeMap<String, f64> {
        self.incremental_stds()
            .iter()
            .map(|(group, delta)| (group.clone(), delta * q))
            .collect()
    }

    fn group_stds(&self) -> &BTreeMap<String, f64> {
        self.group_stds.get_or_init(|| {
            let weights: BTreeMap<String, BTreeMap<String, f64>> =
                match self.portfolio.config().weighting {
                    ExposureWeighting::Raw => self
                        .group_positions()
                        .into_iter()
                        .map(|(group, exposures)| {
                            let raw: BTreeMap<String, f64> =
                                exposures.iter().map(|(t, e)| (t.to_string(), e)).collect();
                            (group, raw)
                        })
                        .collect(),
                    ExposureWeighting::Normalized => self.group_weights(),
                };

            weights
                .into_iter()
                .map(|(group, w)| {
                    let std = self.portfolio.weighted_std(&w, &group);
                    (group, std)
                })
                .collect()
        })
    }

    fn incremental_stds(&self) -> &BTreeMap<String, f64> {
        self.incremental_stds.get_or_init(|| {
            let total = self.portfolio.portfolio_std();
            let groups: Vec<String> = self.group_positions().into_keys().collect();
            debug!(
                "Re-running portfolio VaR without each of {} {} groups",
                groups.len(),
                self.dimension
            );

            groups
                .into_par_iter()
                .map(|group| {
                    let complement = self
                        .portfolio
                        .without_positions(|p| p.group(self.dimension) == group);
                    let delta = total - complement.portfolio_std();
                    (group, delta)
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::UNCLASSIFIED_GROUP;
    use crate::var::test_fixtures::{scenario_prices, Q95};
    use approx::assert_relative_eq;

    fn fund_positions() -> Vec<Position> {
        vec![
            Position::new("Asset 1", -300.0).with_fund("Fund 1"),
            Position::new("Asset 2", 500.0).with_fund("Fund 1"),
            Position::new("Asset 1", -200.0).with_fund("Fund 2"),
            Position::new("Asset 3", 400.0).with_fund("Fund 2"),
        ]
    }

    fn fund_calculator() -> GroupVarCalculator {
        let config = VarCalculatorConfig::default().with_weighting(ExposureWeighting::Normalized);
        GroupVarCalculator::from_prices(
            &scenario_prices(),
            fund_positions(),
            GroupDimension::Fund,
            config,
        )
        .unwrap()
    }

    #[test]
    fn test_group_positions_and_weights() {
        let calc = fund_calculator();

        let grouped = calc.group_positions();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["Fund 1"].get("Asset 1"), Some(-300.0));
        assert_eq!(grouped["Fund 2"].get("Asset 3"), Some(400.0));

        // Total portfolio exposure is 400
        let weights = calc.group_weights();
        assert_eq!(weights["Fund 1"]["Asset 2"], 1.25);
        assert_eq!(weights["Fund 2"]["Asset 1"], -0.5);
    }

    #[test]
    fn test_group_isolated_var() {
        let iso = fund_calculator().isolated_var(Q95);
        assert_relative_eq!(iso["Fund 1"], 0.062406, max_relative = 1e-2);
        assert_relative_eq!(iso["Fund 2"], 0.063334, max_relative = 1e-2);
    }

    #[test]
    fn test_group_component_var() {
        let calc = fund_calculator();
        let comp = calc.component_var(Q95);
        assert_relative_eq!(comp["Fund 1"], 0.060499, max_relative = 1e-2);
        assert_relative_eq!(comp["Fund 2"], 0.060499, max_relative = 1e-2);
        assert_relative_eq!(
            comp.values().sum::<f64>(),
            calc.portfolio_var(Q95),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_group_incremental_var() {
        let inc = fund_calculator().incremental_var(Q95);
        assert_relative_eq!(inc["Fund 1"], -0.0063395, max_relative = 1e-2);
        assert_relative_eq!(inc["Fund 2"], -0.004973, max_relative = 1e-2);
    }

    #[test]
    fn test_missing_attribute_is_unclassified() {
        let mut positions = fund_positions();
        positions.push(Position::new("Asset 2", 100.0));

        let calc = GroupVarCalculator::from_prices(
            &scenario_prices(),
            positions,
            GroupDimension::Fund,
            VarCalculatorConfig::default(),
        )
        .unwrap();

        let grouped = calc.group_positions();
        assert_eq!(grouped[UNCLASSIFIED_GROUP].get("Asset 2"), Some(100.0));

        let total: f64 = calc
            .group_weights()
            .values()
            .flat_map(|w| w.values())
            .sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_single_group_matches_portfolio() {
        let positions: Vec<Position> = fund_positions()
            .into_iter()
            .map(|p| p.with_sector("Tech"))
            .collect();
        let config = VarCalculatorConfig::default().with_weighting(ExposureWeighting::Normalized);
        let calc = GroupVarCalculator::from_prices(
            &scenario_prices(),
            positions,
            GroupDimension::Sector,
            config,
        )
        .unwrap();

        let pv = calc.portfolio_var(Q95);
        assert_relative_eq!(calc.isolated_var(Q95)["Tech"], pv, epsilon = 1e-12);
        assert_relative_eq!(calc.component_var(Q95)["Tech"], pv, epsilon = 1e-12);
        // Removing the only group leaves an empty portfolio
        assert_relative_eq!(calc.incremental_var(Q95)["Tech"], pv, epsilon = 1e-12);
    }

    #[test]
    fn test_single_ticker_group_matches_ticker_isolated_var() {
        let positions = vec![
            Position::new("Asset 1", 250.0).with_sector("Materials"),
            Position::new("Asset 2", -400.0).with_sector("Utilities"),
            Position::new("Asset 3", 1_000_000.0).with_sector("Energy"),
        ];
        let calc = GroupVarCalculator::from_prices(
            &scenario_prices(),
            positions,
            GroupDimension::Sector,
            VarCalculatorConfig::default(),
        )
        .unwrap();

        let ticker_iso = calc.portfolio().isolated_var(Q95);
        let group_iso = calc.isolated_var(Q95);
        assert_relative_eq!(group_iso["Energy"], ticker_iso["Asset 3"], max_relative = 1e-12);
        assert_relative_eq!(group_iso["Utilities"], ticker_iso["Asset 2"], max_relative = 1e-12);
        assert_relative_eq!(group_iso["Materials"], ticker_iso["Asset 1"], max_relative = 1e-12);

        // A one-position book: isolated and portfolio VaR are the same dollar figure
        let single = PortfolioVarCalculator::new(
            &scenario_prices(),
            vec![Position::new("Asset 3", 1_000_000.0)],
            VarCalculatorConfig::default(),
        )
        .unwrap();
        assert_relative_eq!(
            single.isolated_var(Q95)["Asset 3"],
            single.portfolio_var(Q95),
            max_relative = 1e-12
        );
    }
}
