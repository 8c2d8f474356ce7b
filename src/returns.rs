use crate::error::{AnalysisError, AnalysisResult};
use crate::table::PriceTable;
use chrono::NaiveDate;

/// Per-period simple returns of one asset subset, restricted to rows where
/// every member has both a current and a prior price.
#[derive(Clone, Debug, PartialEq)]
pub struct ReturnSeries {
    pub symbols: Vec<String>,
    /// Table row index of each return period.
    pub rows: Vec<usize>,
    pub dates: Vec<NaiveDate>,
    /// One column per asset, each of length `rows.len()`.
    pub columns: Vec<Vec<f64>>,
}

impl ReturnSeries {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn asset_count(&self) -> usize {
        self.columns.len()
    }

    /// Returns of every asset at period `t`.
    pub fn period(&self, t: usize) -> impl Iterator<Item = f64> + '_ {
        self.columns.iter().map(move |column| column[t])
    }
}

/// `price[t] / price[t-1] - 1`, or `None` when either side is missing or
/// the prior price is not strictly positive.
pub fn simple_return(prior: Option<f64>, current: Option<f64>) -> Option<f64> {
    match (prior, current) {
        (Some(p), Some(c)) if p > 0.0 => Some(c / p - 1.0).filter(|r| r.is_finite()),
        _ => None,
    }
}

/// Row-by-row simple returns of a price column; row 0 is always `None`.
pub fn column_returns(prices: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(prices.len());
    if prices.is_empty() {
        return out;
    }
    out.push(None);
    out.extend(prices.windows(2).map(|w| simple_return(w[0], w[1])));
    out
}

/// Builds the return series for the assets at `subset` (indices into the
/// table's asset columns). Rows with any gap are dropped, never filled.
pub fn build_return_series(table: &PriceTable, subset: &[usize]) -> AnalysisResult<ReturnSeries> {
    let assets = table.assets();
    let symbols: Vec<String> = subset.iter().map(|&i| assets[i].symbol.clone()).collect();
    let per_asset: Vec<Vec<Option<f64>>> = subset
        .iter()
        .map(|&i| column_returns(&assets[i].prices))
        .collect();

    let mut rows = Vec::new();
    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); subset.len()];
    for row in 1..table.len() {
        if per_asset.iter().any(|r| r[row].is_none()) {
            continue;
        }
        rows.push(row);
        for (column, returns) in columns.iter_mut().zip(&per_asset) {
            if let Some(r) = returns[row] {
                column.push(r);
            }
        }
    }

    if rows.is_empty() {
        return Err(AnalysisError::InsufficientData {
            subset: symbols,
            reason: format!("no fully observed return periods among {} rows", table.len()),
        });
    }

    let dates = rows.iter().map(|&row| table.dates()[row]).collect();
    Ok(ReturnSeries {
        symbols,
        rows,
        dates,
        columns,
    })
}

/// Mean risk-free rate over `rows`, converted from percentage points to a
/// decimal. Missing observations are skipped; `NaN` if none remain.
pub fn mean_risk_free_rate(table: &PriceTable, rows: &[usize]) -> f64 {
    let rates = table.risk_free_rate();
    let (sum, count) = rows
        .iter()
        .filter_map(|&row| rates[row])
        .fold((0.0, 0usize), |(sum, count), r| (sum + r, count + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64 / 100.0
    }
}

/// Benchmark simple returns per table row, if the table carries one.
pub fn benchmark_returns(table: &PriceTable) -> Option<Vec<Option<f64>>> {
    table.benchmark().map(|column| column_returns(&column.prices))
}
