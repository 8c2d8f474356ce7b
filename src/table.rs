use crate::error::{AnalysisError, AnalysisResult};
use chrono::{Datelike, Duration, Months, NaiveDate, Weekday};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Column names that cannot be used as asset symbols.
pub const RESERVED_COLUMNS: &[&str] = &["Date", "risk_free_rate"];

/// One price series, aligned to the table's date column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceColumn {
    pub symbol: String,
    pub prices: Vec<Option<f64>>,
}

impl PriceColumn {
    pub fn new(symbol: impl Into<String>, prices: Vec<Option<f64>>) -> Self {
        Self {
            symbol: symbol.into(),
            prices,
        }
    }
}

/// Date-aligned adjusted prices for every candidate asset, plus the
/// risk-free rate (percentage points) and an optional benchmark.
///
/// Dates are strictly ascending and there is at least one row. Non-finite
/// inputs are stored as missing.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceTable {
    dates: Vec<NaiveDate>,
    assets: Vec<PriceColumn>,
    risk_free_rate: Vec<Option<f64>>,
    benchmark: Option<PriceColumn>,
}

/// On-disk JSON layout of a [`PriceTable`].
#[derive(Debug, Serialize, Deserialize)]
pub struct PriceTableFile {
    pub dates: Vec<NaiveDate>,
    pub risk_free_rate: Vec<Option<f64>>,
    pub assets: Vec<PriceColumn>,
    #[serde(default)]
    pub benchmark: Option<PriceColumn>,
}

impl PriceTable {
    pub fn new(
        dates: Vec<NaiveDate>,
        assets: Vec<PriceColumn>,
        risk_free_rate: Vec<Option<f64>>,
        benchmark: Option<PriceColumn>,
    ) -> AnalysisResult<Self> {
        if dates.is_empty() {
            return Err(AnalysisError::invalid_table("table has no rows"));
        }
        if let Some(pair) = dates.windows(2).find(|w| w[0] >= w[1]) {
            return Err(AnalysisError::invalid_table(format!(
                "dates must be strictly ascending ({} followed by {})",
                pair[0], pair[1]
            )));
        }
        if risk_free_rate.len() != dates.len() {
            return Err(AnalysisError::invalid_table(format!(
                "risk_free_rate has {} values for {} dates",
                risk_free_rate.len(),
                dates.len()
            )));
        }

        let mut seen = HashSet::new();
        for column in &assets {
            if RESERVED_COLUMNS.contains(&column.symbol.as_str()) {
                return Err(AnalysisError::invalid_table(format!(
                    "`{}` is a reserved column name",
                    column.symbol
                )));
            }
            if !seen.insert(column.symbol.as_str()) {
                return Err(AnalysisError::invalid_table(format!(
                    "duplicate asset column `{}`",
                    column.symbol
                )));
            }
        }
        for column in assets.iter().chain(benchmark.iter()) {
            if column.prices.len() != dates.len() {
                return Err(AnalysisError::invalid_table(format!(
                    "column `{}` has {} values for {} dates",
                    column.symbol,
                    column.prices.len(),
                    dates.len()
                )));
            }
        }

        let clean = |values: Vec<Option<f64>>| -> Vec<Option<f64>> {
            values
                .into_iter()
                .map(|v| v.filter(|x| x.is_finite()))
                .collect()
        };

        Ok(Self {
            dates,
            assets: assets
                .into_iter()
                .map(|c| PriceColumn::new(c.symbol, clean(c.prices)))
                .collect(),
            risk_free_rate: clean(risk_free_rate),
            benchmark: benchmark.map(|c| PriceColumn::new(c.symbol, clean(c.prices))),
        })
    }

    /// Loads a table from the JSON layout described by [`PriceTableFile`].
    /// The risk-free column is forward-filled on load.
    pub fn load_json(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let raw: PriceTableFile = serde_json::from_reader(reader)?;
        let mut risk_free_rate = raw.risk_free_rate;
        forward_fill(&mut risk_free_rate);
        Ok(Self::new(raw.dates, raw.assets, risk_free_rate, raw.benchmark)?)
    }

    pub fn to_file(&self) -> PriceTableFile {
        PriceTableFile {
            dates: self.dates.clone(),
            risk_free_rate: self.risk_free_rate.clone(),
            assets: self.assets.clone(),
            benchmark: self.benchmark.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn latest_date(&self) -> NaiveDate {
        // Non-empty by construction.
        self.dates[self.dates.len() - 1]
    }

    pub fn assets(&self) -> &[PriceColumn] {
        &self.assets
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    pub fn asset_symbols(&self) -> Vec<String> {
        self.assets.iter().map(|c| c.symbol.clone()).collect()
    }

    pub fn risk_free_rate(&self) -> &[Option<f64>] {
        &self.risk_free_rate
    }

    pub fn benchmark(&self) -> Option<&PriceColumn> {
        self.benchmark.as_ref()
    }

    /// Restricts the table to rows dated on or after `latest - years`,
    /// using a calendar-year offset (Feb 29 falls back to Feb 28).
    pub fn trailing_years(&self, years: u32) -> AnalysisResult<Self> {
        if years == 0 {
            return Err(AnalysisError::invalid_range("years_simulated must be at least 1"));
        }

        let latest = self.latest_date();
        let start = match years
            .checked_mul(12)
            .and_then(|months| latest.checked_sub_months(Months::new(months)))
        {
            Some(cutoff) => self.dates.partition_point(|d| *d < cutoff),
            None => 0,
        };
        if start >= self.dates.len() {
            return Err(AnalysisError::invalid_range(format!(
                "no rows within {} year(s) of {}",
                years, latest
            )));
        }

        Ok(self.slice_rows(start))
    }

    fn slice_rows(&self, start: usize) -> Self {
        let tail = |column: &PriceColumn| PriceColumn::new(column.symbol.clone(), column.prices[start..].to_vec());
        Self {
            dates: self.dates[start..].to_vec(),
            assets: self.assets.iter().map(tail).collect(),
            risk_free_rate: self.risk_free_rate[start..].to_vec(),
            benchmark: self.benchmark.as_ref().map(tail),
        }
    }

    /// Builds a reproducible random-walk table over business days.
    ///
    /// Each asset gets its own drift/volatility; the risk-free rate hovers
    /// around 4% and is only published every fifth row (forward-filled).
    pub fn new_mock(
        symbols: &[&str],
        days: usize,
        seed: u64,
        benchmark: Option<&str>,
    ) -> AnalysisResult<Self> {
        if days == 0 {
            return Err(AnalysisError::invalid_table("table has no rows"));
        }
        let mut rng = StdRng::seed_from_u64(seed);

        let mut dates = Vec::with_capacity(days);
        let mut current = NaiveDate::from_ymd_opt(2019, 1, 2)
            .ok_or_else(|| AnalysisError::invalid_table("bad mock start date"))?;
        while dates.len() < days {
            if !matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
                dates.push(current);
            }
            current += Duration::days(1);
        }

        let mut random_walk = |drift: f64, vol: f64, start: f64| -> AnalysisResult<Vec<Option<f64>>> {
            let normal = Normal::new(drift, vol)
                .map_err(|e| AnalysisError::invalid_parameter("volatility", e.to_string()))?;
            let mut price = start;
            let mut prices = Vec::with_capacity(days);
            for _ in 0..days {
                prices.push(Some(price));
                price *= 1.0 + normal.sample(&mut rng);
                price = price.max(0.01);
            }
            Ok(prices)
        };

        let mut assets = Vec::with_capacity(symbols.len());
        for (i, symbol) in symbols.iter().enumerate() {
            let drift = 0.0002 + 0.0001 * i as f64;
            let vol = 0.01 + 0.004 * (i % 4) as f64;
            assets.push(PriceColumn::new(*symbol, random_walk(drift, vol, 50.0 + 25.0 * i as f64)?));
        }
        let benchmark = match benchmark {
            Some(symbol) => Some(PriceColumn::new(symbol, random_walk(0.0003, 0.011, 400.0)?)),
            None => None,
        };

        let rate_noise = Normal::new(0.0, 0.02)
            .map_err(|e| AnalysisError::invalid_parameter("volatility", e.to_string()))?;
        let mut rate: f64 = 4.0;
        let mut risk_free_rate: Vec<Option<f64>> = (0..days)
            .map(|i| {
                if i % 5 == 0 {
                    rate = (rate + rate_noise.sample(&mut rng)).max(0.0);
                    Some(rate)
                } else {
                    None
                }
            })
            .collect();
        forward_fill(&mut risk_free_rate);

        Self::new(dates, assets, risk_free_rate, benchmark)
    }
}

/// Replaces each missing value with the most recent observed one.
/// Leading gaps stay missing.
pub fn forward_fill(values: &mut [Option<f64>]) {
    let mut last = None;
    for value in values.iter_mut() {
        match value {
            Some(v) => last = Some(*v),
            None => *value = last,
        }
    }
}
