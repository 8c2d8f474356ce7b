use crate::config::MIN_VOLATILITY;
use crate::returns::ReturnSeries;
use crate::stats;
use serde::ser::{Serialize, SerializeMap, Serializer};

// ──────────────────────────────────────────────────────────────────────────────
// Parameters
// ──────────────────────────────────────────────────────────────────────────────

/// Scalar inputs of the metrics calculation that do not depend on the subset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MetricParams {
    /// Tail probability for VaR, e.g. 0.05.
    pub var_confidence: f64,
    /// Tail probability defining the CVaR threshold.
    pub cvar_confidence: f64,
    pub trading_days_per_year: u32,
    /// Exponent base for CAGR.
    pub years_simulated: u32,
}

// ──────────────────────────────────────────────────────────────────────────────
// Record
// ──────────────────────────────────────────────────────────────────────────────

/// Risk/return metrics of one equally (or profile-) weighted subset.
///
/// Undefined statistics are `NaN`. `portfolio_beta` is `None` when the input
/// table has no benchmark column, so every record has the same shape.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricsRecord {
    pub stocks: Vec<String>,
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub var: f64,
    pub cvar: f64,
    pub max_drawdown: f64,
    pub sortino_ratio: f64,
    pub total_return: f64,
    pub cagr: f64,
    pub portfolio_beta: Option<f64>,
}

/// Flat layout: `stock_1..stock_k` followed by the metric columns. `NaN`
/// and absent beta serialize as `null` in JSON.
impl Serialize for MetricsRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.stocks.len() + 10))?;
        for (i, stock) in self.stocks.iter().enumerate() {
            map.serialize_entry(&format!("stock_{}", i + 1), stock)?;
        }
        map.serialize_entry("Expected_Return", &self.expected_return)?;
        map.serialize_entry("Volatility", &self.volatility)?;
        map.serialize_entry("Sharpe_Ratio", &self.sharpe_ratio)?;
        map.serialize_entry("VaR", &self.var)?;
        map.serialize_entry("CVaR", &self.cvar)?;
        map.serialize_entry("Max_Drawdown", &self.max_drawdown)?;
        map.serialize_entry("Sortino_Ratio", &self.sortino_ratio)?;
        map.serialize_entry("Total_Return", &self.total_return)?;
        map.serialize_entry("CAGR", &self.cagr)?;
        map.serialize_entry("Portfolio_Beta", &self.portfolio_beta)?;
        map.end()
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Calculator
// ──────────────────────────────────────────────────────────────────────────────

/// Per-period weighted sum of asset returns.
pub fn portfolio_returns(series: &ReturnSeries, weights: &[f64]) -> Vec<f64> {
    debug_assert_eq!(weights.len(), series.asset_count());
    (0..series.len())
        .map(|t| series.period(t).zip(weights).map(|(r, w)| r * w).sum())
        .collect()
}

fn ratio_or_nan(excess: f64, risk: f64) -> f64 {
    if risk.is_finite() && risk > MIN_VOLATILITY {
        excess / risk
    } else {
        f64::NAN
    }
}

/// Mean of returns at or below the `alpha` quantile.
fn conditional_var(returns: &[f64], alpha: f64) -> f64 {
    let threshold = stats::quantile(returns, alpha);
    let tail: Vec<f64> = returns.iter().copied().filter(|r| *r <= threshold).collect();
    stats::mean(&tail)
}

/// `Cov(p, b) / Var(b)` over the periods where the benchmark has a return.
fn portfolio_beta(series: &ReturnSeries, portfolio: &[f64], benchmark: &[Option<f64>]) -> f64 {
    let (p, b): (Vec<f64>, Vec<f64>) = series
        .rows
        .iter()
        .zip(portfolio)
        .filter_map(|(&row, &ret)| benchmark.get(row).copied().flatten().map(|bench| (ret, bench)))
        .unzip();
    let var_b = stats::sample_variance(&b);
    if var_b.is_finite() && var_b > 0.0 {
        stats::covariance(&p, &b) / var_b
    } else {
        f64::NAN
    }
}

/// Computes the full metric set for one subset.
///
/// `risk_free` is the mean rate over the series' periods as a decimal;
/// `benchmark` holds benchmark returns indexed by table row.
pub fn compute_metrics(
    series: &ReturnSeries,
    weights: &[f64],
    risk_free: f64,
    benchmark: Option<&[Option<f64>]>,
    params: &MetricParams,
) -> MetricsRecord {
    let periods = params.trading_days_per_year as f64;
    let portfolio = portfolio_returns(series, weights);

    let expected_return = stats::mean(&portfolio) * periods;
    let cov = stats::covariance_matrix(&series.columns);
    let volatility = (stats::quadratic_form(weights, &cov) * periods).sqrt();
    let excess = expected_return - risk_free;
    let sharpe_ratio = ratio_or_nan(excess, volatility);

    let var = stats::quantile(&portfolio, params.var_confidence);
    let cvar = conditional_var(&portfolio, params.cvar_confidence);

    let growth = stats::cumulative_growth(&portfolio);
    let max_drawdown = stats::max_drawdown(&growth);
    let final_value = growth.last().copied().unwrap_or(f64::NAN);
    let total_return = final_value - 1.0;
    let cagr = final_value.powf(1.0 / params.years_simulated as f64) - 1.0;

    let negatives: Vec<f64> = portfolio.iter().copied().filter(|r| *r < 0.0).collect();
    let downside_deviation = stats::sample_std(&negatives) * periods.sqrt();
    let sortino_ratio = ratio_or_nan(excess, downside_deviation);

    MetricsRecord {
        stocks: series.symbols.clone(),
        expected_return,
        volatility,
        sharpe_ratio,
        var,
        cvar,
        max_drawdown,
        sortino_ratio,
        total_return,
        cagr,
        portfolio_beta: benchmark.map(|b| portfolio_beta(series, &portfolio, b)),
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────────────────────────────────────
