//! Portfolio VaR decomposition example
//!
//! Runs the default configuration over a small multi-fund book, prints the
//! position and fund pivots, then the factor betas of each position.
//!
//! Run with: RUST_LOG=info cargo run --example portfolio_var

use anyhow::Context;
use chrono::{Days, NaiveDate};
use mstrat_risk::{
    GroupDimension, Position, PriceTable, RunConfig, SeriesTable, VarEngine, VarPivot,
    DEFAULT_MARKET_FACTOR,
};
use tracing_subscriber::EnvFilter;

const NAV: f64 = 25_000_000.0;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Portfolio VaR Decomposition Example ===\n");

    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/configs/default.yaml");
    let config = RunConfig::from_file(path).with_context(|| format!("loading {}", path))?;
    let engine = VarEngine::new(config);

    // 1. Book and price history
    let tickers = ["AAPL US", "MSFT US", "XOM US", "SHEL LN", "TD CN", "NVDA US"];
    let prices = sample_prices(&tickers, 120, 0);
    let positions = sample_positions();

    println!("Positions: {}", positions.len());
    println!("Price history: {} days x {} tickers", prices.n_rows(), prices.n_cols());
    println!();

    // 2. VaR decomposition, as % of NAV
    let report = engine.run(&prices, &positions)?;
    for failure in &report.failures {
        println!("VaR for {} failed: {}", failure.group, failure.error);
    }
    let table = report.table.to_percent_of_nav(NAV)?;

    print_pivot(&table.pivot("position"));
    print_pivot(&table.pivot(GroupDimension::Fund.label()));
    print_pivot(&table.top_diversifiers(engine.config().report.top_n.min(3)));

    // 3. Exposure summary
    println!("--- Exposures by Fund (% of NAV) ---");
    for row in engine
        .exposure_report(&positions, NAV)?
        .iter()
        .filter(|r| r.dimension == GroupDimension::Fund)
    {
        println!(
            "{:<10} long {:>7.2}%  short {:>7.2}%  gross {:>7.2}%  net {:>7.2}%",
            row.group,
            row.summary.long * 100.0,
            row.summary.short * 100.0,
            row.summary.gross * 100.0,
            row.summary.net * 100.0
        );
    }
    println!();

    // 4. Factor betas
    let factors = [
        "LD12TRUU Index",
        "RIY Index",
        "RTY Index",
        "RAG Index",
        "RAV Index",
        DEFAULT_MARKET_FACTOR,
    ];
    let factor_prices = sample_prices(&factors, 120, 7);
    let factor_report = engine.factor_report(&factor_prices, &prices)?;

    println!("--- Factor Correlation ---");
    for (factor, correlations) in factor_report.correlation.rows() {
        print!("{:<14}", factor);
        for rho in correlations {
            print!(" {:>6.2}", rho);
        }
        println!();
    }
    println!();

    println!("--- Factor Betas ---");
    print!("{:<10}", "");
    for factor in &factor_report.betas.factors {
        print!(" {:>14}", factor);
    }
    println!();
    for row in &factor_report.betas.rows {
        print!("{:<10}", row.ticker);
        for beta in &row.betas {
            print!(" {:>14.3}", beta);
        }
        println!();
    }

    Ok(())
}

fn sample_positions() -> Vec<Position> {
    vec![
        Position::new("AAPL US", 2_500_000.0)
            .with_fund("Tech L/S")
            .with_sector("Information Technology")
            .with_country("US")
            .with_market_cap_bucket("Mega"),
        Position::new("MSFT US", 1_800_000.0)
            .with_fund("Tech L/S")
            .with_sector("Information Technology")
            .with_country("US")
            .with_market_cap_bucket("Mega"),
        Position::new("NVDA US", -900_000.0)
            .with_fund("Tech L/S")
            .with_sector("Information Technology")
            .with_country("US")
            .with_market_cap_bucket("Mega"),
        Position::new("XOM US", 1_200_000.0)
            .with_fund("Energy")
            .with_sector("Energy")
            .with_country("US")
            .with_market_cap_bucket("Large"),
        Position::new("SHEL LN", -700_000.0)
            .with_fund("Energy")
            .with_sector("Energy")
            .with_country("GB"),
        Position::new("TD CN", 600_000.0).with_fund("Macro").with_country("CA"),
    ]
}

/// Deterministic daily price paths for `tickers`
fn sample_prices(tickers: &[&str], n_days: usize, seed: usize) -> PriceTable {
    let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    let dates = (0..n_days as u64)
        .map(|i| start.checked_add_days(Days::new(i)).unwrap())
        .collect();

    let columns = tickers
        .iter()
        .enumerate()
        .map(|(i, ticker)| {
            let k = i + seed;
            let mut price = 100.0 + 10.0 * k as f64;
            let path = (0..n_days)
                .map(|d| {
                    let shock = ((d as f64) * 0.21 * (k + 1) as f64).sin() * 0.012
                        + ((d * (k + 5)) as f64 * 0.73).cos() * 0.008;
                    price *= 1.0 + shock;
                    price
                })
                .collect();
            (ticker.to_string(), path)
        })
        .collect();

    SeriesTable::from_columns(dates, columns).expect("sample prices are well formed")
}

fn print_pivot(pivot: &VarPivot) {
    println!("--- {} (% of NAV) ---", pivot.index_name);
    print!("{:<24}", pivot.index_name);
    for column in &pivot.columns {
        print!(" {:>9}", column);
    }
    println!();
    for row in &pivot.rows {
        print!("{:<24}", row.attribute);
        for value in &row.values {
            print!(" {:>8.3}%", value * 100.0);
        }
        println!();
    }
    println!();
}
