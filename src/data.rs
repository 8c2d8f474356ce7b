use crate::config::AnalysisConfig;
use crate::table::{PriceColumn, PriceTable, forward_fill};
use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const YAHOO_CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const CACHE_DIR: &str = ".cache";
const CACHE_MAX_AGE_SECS: u64 = 86_400;
const MAX_ATTEMPTS: usize = 3;

#[derive(Deserialize, Serialize, Debug)]
struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooChart {
    result: Option<Vec<YahooResult>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: YahooIndicators,
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooIndicators {
    quote: Vec<YahooQuote>,
    #[serde(default)]
    adjclose: Option<Vec<YahooAdjClose>>,
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooAdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

/// Daily observations of one symbol keyed by trading date.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DailySeries {
    pub symbol: String,
    pub points: BTreeMap<NaiveDate, f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PriceField {
    AdjustedClose,
    Close,
}

impl YahooChartResponse {
    fn into_series(self, symbol: &str, field: PriceField) -> Result<DailySeries> {
        if let Some(err) = self.chart.error.filter(|e| !e.is_null()) {
            return Err(anyhow::anyhow!("Yahoo returned an error for {}: {}", symbol, err));
        }
        let result = self
            .chart
            .result
            .and_then(|r| r.into_iter().next())
            .ok_or(anyhow::anyhow!("No data found for {}", symbol))?;

        let adjusted = result
            .indicators
            .adjclose
            .and_then(|a| a.into_iter().next())
            .map(|a| a.adjclose);
        let values = match (field, adjusted) {
            (PriceField::AdjustedClose, Some(adj)) => adj,
            _ => result
                .indicators
                .quote
                .into_iter()
                .next()
                .map(|q| q.close)
                .unwrap_or_default(),
        };

        let mut points = BTreeMap::new();
        for (ts, value) in result.timestamp.iter().zip(values) {
            let (Some(date), Some(v)) = (DateTime::from_timestamp(*ts, 0), value) else {
                continue;
            };
            if v.is_finite() {
                points.insert(date.date_naive(), v);
            }
        }

        Ok(DailySeries {
            symbol: symbol.to_uppercase(),
            points,
        })
    }
}

fn cache_path(symbol: &str, start: NaiveDate, end: NaiveDate) -> PathBuf {
    let safe: String = symbol
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    Path::new(CACHE_DIR).join(format!("{}_{}_{}.json", safe, start, end))
}

fn read_fresh_cache(path: &Path) -> Option<YahooChartResponse> {
    let metadata = std::fs::metadata(path).ok()?;
    let age = std::time::SystemTime::now()
        .duration_since(metadata.modified().ok()?)
        .ok()?;
    if age.as_secs() >= CACHE_MAX_AGE_SECS {
        return None;
    }
    let file = std::fs::File::open(path).ok()?;
    serde_json::from_reader(std::io::BufReader::new(file)).ok()
}

async fn fetch_from_api(
    client: &reqwest::Client,
    symbol: &str,
    start: NaiveDate,
    end: NaiveDate,
    cache_path: &Path,
) -> Result<YahooChartResponse> {
    let period1 = start.and_hms_opt(0, 0, 0).map(|d| d.and_utc().timestamp()).unwrap_or(0);
    let period2 = end.and_hms_opt(23, 59, 59).map(|d| d.and_utc().timestamp()).unwrap_or(0);
    let url = format!(
        "{}/{}?period1={}&period2={}&interval=1d&events=div%2Csplit",
        YAHOO_CHART_URL, symbol, period1, period2
    );

    let mut attempts = 0;
    loop {
        attempts += 1;
        match client.get(&url).header("User-Agent", "Mozilla/5.0").send().await {
            Ok(resp) => match resp.json::<YahooChartResponse>().await {
                Ok(resp_json) => {
                    if let Some(dir) = cache_path.parent() {
                        std::fs::create_dir_all(dir)?;
                    }
                    let file = std::fs::File::create(cache_path)?;
                    serde_json::to_writer(std::io::BufWriter::new(file), &resp_json)?;
                    return Ok(resp_json);
                }
                Err(e) => {
                    if attempts >= MAX_ATTEMPTS {
                        return Err(e.into());
                    }
                    warn!("Failed to parse JSON for {} (attempt {}/{}): {}", symbol, attempts, MAX_ATTEMPTS, e);
                }
            },
            Err(e) => {
                if attempts >= MAX_ATTEMPTS {
                    return Err(e.into());
                }
                warn!("Failed to fetch data for {} (attempt {}/{}): {}", symbol, attempts, MAX_ATTEMPTS, e);
            }
        }

        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    }
}

async fn fetch_series(
    client: &reqwest::Client,
    symbol: &str,
    start: NaiveDate,
    end: NaiveDate,
    field: PriceField,
) -> Result<DailySeries> {
    let path = cache_path(symbol, start, end);
    let response = match read_fresh_cache(&path) {
        Some(cached) => {
            info!("Loading {} from cache...", symbol);
            cached
        }
        None => {
            info!("Cache miss for {}, fetching...", symbol);
            fetch_from_api(client, symbol, start, end, &path).await?
        }
    };
    response.into_series(symbol, field)
}

/// Normalizes a ticker list: trimmed, upper-cased, empty and duplicate
/// entries removed, first-seen order kept.
pub fn normalize_tickers<S: AsRef<str>>(tickers: &[S]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    tickers
        .iter()
        .map(|t| t.as_ref().trim().to_uppercase())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

/// Aligns downloaded series into a [`PriceTable`].
///
/// Dates are the union of the asset series (outer join). The risk-free
/// series is left-joined onto those dates and forward-filled; the benchmark
/// is left-joined without filling. Assets with no observation at all are
/// dropped.
pub fn assemble_table(
    assets: Vec<DailySeries>,
    risk_free: &DailySeries,
    benchmark: Option<&DailySeries>,
) -> Result<PriceTable> {
    let (assets, empty): (Vec<DailySeries>, Vec<DailySeries>) =
        assets.into_iter().partition(|s| !s.points.is_empty());
    for series in &empty {
        warn!("{}: no price data in range; dropping column", series.symbol);
    }
    if assets.is_empty() {
        return Err(anyhow::anyhow!("None of the requested tickers returned price data"));
    }

    let dates: Vec<NaiveDate> = assets
        .iter()
        .flat_map(|s| s.points.keys().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let align = |series: &DailySeries| -> Vec<Option<f64>> {
        dates.iter().map(|d| series.points.get(d).copied()).collect()
    };

    let columns = assets
        .iter()
        .map(|s| PriceColumn::new(s.symbol.clone(), align(s)))
        .collect();
    let mut risk_free_rate = align(risk_free);
    forward_fill(&mut risk_free_rate);
    if risk_free_rate.iter().all(|v| v.is_none()) {
        warn!("{}: no risk-free observations in range; Sharpe/Sortino will be undefined", risk_free.symbol);
    }
    let benchmark = benchmark
        .filter(|b| !b.points.is_empty())
        .map(|b| PriceColumn::new(b.symbol.clone(), align(b)));

    Ok(PriceTable::new(dates, columns, risk_free_rate, benchmark)?)
}

/// Downloads `years` of daily adjusted closes for `tickers` plus the
/// risk-free proxy and (if configured) the benchmark.
pub async fn fetch_price_table(tickers: &[String], years: u32, cfg: &AnalysisConfig) -> Result<PriceTable> {
    let tickers = normalize_tickers(tickers);
    if tickers.is_empty() {
        return Err(anyhow::anyhow!("At least one ticker is required"));
    }

    let end = Utc::now().date_naive();
    let start = end - Duration::days(years as i64 * 365);
    let client = reqwest::Client::new();
    info!("Fetching {} ticker(s) from {} to {}", tickers.len(), start, end);

    let mut assets = Vec::with_capacity(tickers.len());
    for symbol in &tickers {
        match fetch_series(&client, symbol, start, end, PriceField::AdjustedClose).await {
            Ok(series) => assets.push(series),
            Err(e) => {
                warn!("Failed to fetch {}: {}. Dropping column.", symbol, e);
                assets.push(DailySeries {
                    symbol: symbol.clone(),
                    points: BTreeMap::new(),
                });
            }
        }
    }

    let risk_free = match fetch_series(&client, &cfg.risk_free_symbol, start, end, PriceField::Close).await {
        Ok(series) => series,
        Err(e) => {
            warn!("Failed to fetch risk-free proxy {}: {}", cfg.risk_free_symbol, e);
            DailySeries {
                symbol: cfg.risk_free_symbol.clone(),
                points: BTreeMap::new(),
            }
        }
    };

    let benchmark = match &cfg.benchmark_symbol {
        Some(symbol) => match fetch_series(&client, symbol, start, end, PriceField::AdjustedClose).await {
            Ok(series) => Some(series),
            Err(e) => {
                warn!("Failed to fetch benchmark {}: {}. Beta will be omitted.", symbol, e);
                None
            }
        },
        None => None,
    };

    assemble_table(assets, &risk_free, benchmark.as_ref())
}
