use crate::combinations::{Combinations, checked_combination_count};
use crate::config::{self, AnalysisConfig};
use crate::error::{AnalysisError, AnalysisResult};
use crate::metrics::{MetricParams, MetricsRecord, compute_metrics};
use crate::results::ResultTable;
use crate::returns::{benchmark_returns, build_return_series, mean_risk_free_rate};
use crate::scoring::Ranking;
use crate::table::PriceTable;
use crate::weights::{RiskProfile, WeightScaling, weight_vector};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;
use tracing::{debug, info};

// ──────────────────────────────────────────────────────────────────────────────
// Parameters
// ──────────────────────────────────────────────────────────────────────────────

/// Everything one analysis run needs besides the price table.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisParams {
    pub years_simulated: u32,
    pub set_size: usize,
    pub var_confidence: f64,
    pub cvar_confidence: f64,
    pub trading_days_per_year: u32,
    pub risk_profile: RiskProfile,
    pub weight_scaling: WeightScaling,
    pub max_combinations: u64,
}

impl AnalysisParams {
    #[cfg(test)]
    pub fn new(years_simulated: u32, set_size: usize) -> Self {
        Self::from_config(&AnalysisConfig::default(), years_simulated, set_size)
    }

    pub fn from_config(cfg: &AnalysisConfig, years_simulated: u32, set_size: usize) -> Self {
        Self {
            years_simulated,
            set_size,
            var_confidence: config::VAR_CONFIDENCE,
            cvar_confidence: config::VAR_CONFIDENCE,
            trading_days_per_year: cfg.trading_days_per_year,
            risk_profile: RiskProfile::default(),
            weight_scaling: WeightScaling::default(),
            max_combinations: cfg.max_combinations,
        }
    }

    /// Checks the scalar parameters. Set size is checked later against the
    /// asset count of the windowed table.
    pub fn validate(&self) -> AnalysisResult<()> {
        if self.years_simulated == 0 {
            return Err(AnalysisError::invalid_range("years_simulated must be at least 1"));
        }
        for (name, value) in [
            ("var_confidence", self.var_confidence),
            ("cvar_confidence", self.cvar_confidence),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(AnalysisError::invalid_parameter(
                    name,
                    format!("must lie strictly between 0 and 1, got {}", value),
                ));
            }
        }
        if self.trading_days_per_year == 0 {
            return Err(AnalysisError::invalid_parameter(
                "trading_days_per_year",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    fn metric_params(&self) -> MetricParams {
        MetricParams {
            var_confidence: self.var_confidence,
            cvar_confidence: self.cvar_confidence,
            trading_days_per_year: self.trading_days_per_year,
            years_simulated: self.years_simulated,
        }
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Prepared run (shared, read-only across workers)
// ──────────────────────────────────────────────────────────────────────────────

struct PreparedRun {
    window: PriceTable,
    symbols: Vec<String>,
    weights: Vec<f64>,
    benchmark: Option<Vec<Option<f64>>>,
    metric_params: MetricParams,
    combination_count: u64,
}

impl PreparedRun {
    fn new(table: &PriceTable, params: &AnalysisParams) -> AnalysisResult<Self> {
        params.validate()?;
        let window = table.trailing_years(params.years_simulated)?;
        let combination_count =
            checked_combination_count(window.asset_count(), params.set_size, params.max_combinations)?;

        Ok(Self {
            symbols: window.asset_symbols(),
            weights: weight_vector(params.set_size, params.risk_profile, params.weight_scaling),
            benchmark: benchmark_returns(&window),
            metric_params: params.metric_params(),
            combination_count,
            window,
        })
    }

    fn evaluate(&self, subset: &[usize]) -> AnalysisResult<MetricsRecord> {
        let series = build_return_series(&self.window, subset).inspect_err(|e| debug!("Subset failed: {}", e))?;
        if let (Some(first), Some(last)) = (series.dates.first(), series.dates.last()) {
            debug!("{:?}: {} periods from {} to {}", series.symbols, series.len(), first, last);
        }
        let risk_free = mean_risk_free_rate(&self.window, &series.rows);
        Ok(compute_metrics(
            &series,
            &self.weights,
            risk_free,
            self.benchmark.as_deref(),
            &self.metric_params,
        ))
    }

    fn log_start(&self, mode: &str, params: &AnalysisParams) {
        info!(
            "{}: {} assets, set_size={}, {} combinations, {} rows since {}, profile={}",
            mode,
            self.symbols.len(),
            params.set_size,
            self.combination_count,
            self.window.len(),
            self.window.dates()[0],
            params.risk_profile.as_str(),
        );
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Full table
// ──────────────────────────────────────────────────────────────────────────────

/// Evaluates every subset and returns one record per subset in enumeration
/// order. Any subset failure fails the whole run.
pub fn analyze(table: &PriceTable, params: &AnalysisParams) -> AnalysisResult<ResultTable> {
    let started = Instant::now();
    let run = PreparedRun::new(table, params)?;
    run.log_start("Full analysis", params);

    let subsets: Vec<Vec<usize>> = Combinations::new(run.symbols.len(), params.set_size)?.collect();
    let records = subsets
        .par_iter()
        .map(|subset| run.evaluate(subset))
        .collect::<AnalysisResult<Vec<_>>>()?;

    info!(
        "Evaluated {} portfolios in {:.2?}",
        records.len(),
        started.elapsed()
    );
    Ok(ResultTable::new(params.set_size, run.benchmark.is_some(), records))
}

// ──────────────────────────────────────────────────────────────────────────────
// Top-k streaming
// ──────────────────────────────────────────────────────────────────────────────

/// Heap entry ordered so that the worst-ranked candidate is the maximum.
struct Candidate {
    key: Option<f64>,
    index: usize,
    ranking: Ranking,
    record: MetricsRecord,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ranking
            .compare_keys(self.key, other.key)
            .then(self.index.cmp(&other.index))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

fn push_bounded(heap: &mut BinaryHeap<Candidate>, candidate: Candidate, limit: usize) {
    heap.push(candidate);
    if heap.len() > limit {
        heap.pop();
    }
}

/// Returns the `limit` best subsets under `ranking` without materializing
/// the full result table. Workers keep bounded heaps that are merged at the
/// end; ties resolve by enumeration order.
pub fn top_k(
    table: &PriceTable,
    params: &AnalysisParams,
    ranking: Ranking,
    limit: usize,
) -> AnalysisResult<ResultTable> {
    let started = Instant::now();
    let run = PreparedRun::new(table, params)?;
    run.log_start("Top-k analysis", params);

    if limit == 0 {
        return Ok(ResultTable::new(params.set_size, run.benchmark.is_some(), Vec::new()));
    }

    let heap = Combinations::new(run.symbols.len(), params.set_size)?
        .enumerate()
        .par_bridge()
        .map(|(index, subset)| run.evaluate(&subset).map(|record| (index, record)))
        .try_fold(BinaryHeap::new, |mut heap, item| {
            let (index, record) = item?;
            let key = ranking.key.key(&record);
            push_bounded(
                &mut heap,
                Candidate {
                    key,
                    index,
                    ranking,
                    record,
                },
                limit,
            );
            Ok::<_, AnalysisError>(heap)
        })
        .try_reduce(BinaryHeap::new, |mut merged, other| {
            for candidate in other {
                push_bounded(&mut merged, candidate, limit);
            }
            Ok(merged)
        })?;

    let records: Vec<MetricsRecord> = heap.into_sorted_vec().into_iter().map(|c| c.record).collect();
    info!(
        "Kept top {} of {} portfolios by {} in {:.2?}",
        records.len(),
        run.combination_count,
        ranking.key.label(),
        started.elapsed()
    );
    Ok(ResultTable::new(params.set_size, run.benchmark.is_some(), records))
}

// ──────────────────────────────────────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::{InvestmentGoal, MetricField};
    use crate::table::PriceColumn;
    use chrono::NaiveDate;

    fn mock(symbols: &[&str], days: usize, benchmark: Option<&str>) -> PriceTable {
        PriceTable::new_mock(symbols, days, 42, benchmark).unwrap()
    }

    #[test]
    fn test_three_assets_pairs() {
        let table = mock(&["A", "B", "C"], 500, None);
        let result = analyze(&table, &AnalysisParams::new(1, 2)).unwrap();
        assert_eq!(result.len(), 3);

        let pairs: Vec<Vec<String>> = result.records().iter().map(|r| r.stocks.clone()).collect();
        assert_eq!(pairs, vec![vec!["A", "B"], vec!["A", "C"], vec!["B", "C"]]);
        for record in result.records() {
            assert_eq!(record.stocks.len(), 2);
            assert!(record.sharpe_ratio.is_finite());
            assert!(record.var.is_finite());
            assert!(record.cvar <= record.var);
            assert!(record.max_drawdown <= 0.0);
            assert!((record.cagr - record.total_return).abs() < 1e-9);
            assert_eq!(record.portfolio_beta, None);
        }

        let json = serde_json::to_value(result.records()).unwrap();
        assert_eq!(json[0]["stock_1"], "A");
        assert_eq!(json[0]["stock_2"], "B");
        assert_eq!(json[2]["stock_1"], "B");
    }

    #[test]
    fn test_full_set_gives_one_row() {
        let table = mock(&["A", "B", "C", "D"], 300, Some("SPY"));
        let result = analyze(&table, &AnalysisParams::new(1, 4)).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.records()[0].stocks, vec!["A", "B", "C", "D"]);
        assert!(result.records()[0].portfolio_beta.unwrap().is_finite());
    }

    #[test]
    fn test_set_size_larger_than_universe_fails() {
        let table = mock(&["A", "B", "C"], 100, None);
        let err = analyze(&table, &AnalysisParams::new(1, 4)).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::InvalidSize {
                set_size: 4,
                asset_count: 3
            }
        );
        assert!(matches!(
            analyze(&table, &AnalysisParams::new(1, 0)),
            Err(AnalysisError::InvalidSize { .. })
        ));
    }

    #[test]
    fn test_invalid_parameters() {
        let table = mock(&["A", "B"], 50, None);
        let err = analyze(&table, &AnalysisParams::new(0, 1)).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidRange { .. }));

        let params = AnalysisParams {
            var_confidence: 1.0,
            ..AnalysisParams::new(1, 1)
        };
        assert!(matches!(
            analyze(&table, &params),
            Err(AnalysisError::InvalidParameter { name: "var_confidence", .. })
        ));
    }

    #[test]
    fn test_combination_ceiling() {
        let table = mock(&["A", "B", "C", "D", "E", "F"], 60, None);
        let params = AnalysisParams {
            max_combinations: 19,
            ..AnalysisParams::new(1, 3)
        };
        assert!(matches!(
            analyze(&table, &params),
            Err(AnalysisError::CombinationLimitExceeded { count: Some(20), .. })
        ));
        assert!(matches!(
            top_k(&table, &params, Ranking::by_field(MetricField::SharpeRatio, false), 2),
            Err(AnalysisError::CombinationLimitExceeded { .. })
        ));
    }

    #[test]
    fn test_insufficient_subset_fails_run() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let dates: Vec<NaiveDate> = (0..6).map(|i| start + chrono::Duration::days(i)).collect();
        let table = PriceTable::new(
            dates,
            vec![
                PriceColumn::new("A", vec![Some(1.0), Some(1.1), Some(1.2), Some(1.3), Some(1.2), Some(1.25)]),
                PriceColumn::new("B", vec![Some(2.0), None, Some(2.1), None, Some(2.2), None]),
            ],
            vec![Some(4.0); 6],
            None,
        )
        .unwrap();
        assert!(analyze(&table, &AnalysisParams::new(1, 1)).is_err());
        let err = analyze(&table, &AnalysisParams::new(1, 2)).unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientData { .. }));
    }

    #[test]
    fn test_constant_assets_produce_nan_ratios() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let dates: Vec<NaiveDate> = (0..30).map(|i| start + chrono::Duration::days(i)).collect();
        let table = PriceTable::new(
            dates,
            vec![
                PriceColumn::new("FLAT1", vec![Some(10.0); 30]),
                PriceColumn::new("FLAT2", vec![Some(20.0); 30]),
            ],
            vec![Some(4.5); 30],
            None,
        )
        .unwrap();
        let result = analyze(&table, &AnalysisParams::new(1, 2)).unwrap();
        let record = &result.records()[0];
        assert!(record.sharpe_ratio.is_nan());
        assert!(record.sortino_ratio.is_nan());
        assert_eq!(record.total_return, 0.0);
        assert_eq!(record.max_drawdown, 0.0);
    }

    #[test]
    fn test_top_k_matches_sorted_full_table() {
        let table = mock(&["A", "B", "C", "D", "E", "F", "G"], 400, Some("SPY"));
        let params = AnalysisParams::new(1, 3);
        let full = analyze(&table, &params).unwrap();

        for ranking in [
            Ranking::by_field(MetricField::SharpeRatio, false),
            Ranking::by_field(MetricField::MaxDrawdown, true),
            Ranking::by_goal(InvestmentGoal::LongTermGrowth),
        ] {
            let expected = full.sorted(ranking, Some(5));
            let streamed = top_k(&table, &params, ranking, 5).unwrap();
            assert_eq!(streamed.records(), expected.records());
        }

        let none = top_k(&table, &params, Ranking::by_goal(InvestmentGoal::RiskAdjusted), 0).unwrap();
        assert!(none.is_empty());
        let all = top_k(&table, &params, Ranking::by_goal(InvestmentGoal::RiskAdjusted), 1_000).unwrap();
        assert_eq!(all.len(), 35);
    }

    #[test]
    fn test_risk_profile_leverage_scales_returns() {
        let table = mock(&["A", "B", "C"], 250, None);
        let neutral = analyze(&table, &AnalysisParams::new(1, 2)).unwrap();
        let normalized = analyze(
            &table,
            &AnalysisParams {
                risk_profile: RiskProfile::Aggressive,
                ..AnalysisParams::new(1, 2)
            },
        )
        .unwrap();
        let leveraged = analyze(
            &table,
            &AnalysisParams {
                risk_profile: RiskProfile::Aggressive,
                weight_scaling: WeightScaling::Leveraged,
                ..AnalysisParams::new(1, 2)
            },
        )
        .unwrap();

        for ((n, z), l) in neutral.records().iter().zip(normalized.records()).zip(leveraged.records()) {
            assert!((n.expected_return - z.expected_return).abs() < 1e-12);
            assert!((l.expected_return - 1.2 * n.expected_return).abs() < 1e-9);
            assert!((l.volatility - 1.2 * n.volatility).abs() < 1e-9);
        }
    }
}
