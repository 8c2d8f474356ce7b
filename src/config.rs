use rayon::ThreadPoolBuilder;
use std::sync::OnceLock;
use tracing::{info, warn};

static RAYON_INIT: OnceLock<()> = OnceLock::new();

/// Annualization constant for daily price data.
pub const TRADING_DAYS: u32 = 252;

/// Default VaR/CVaR tail probability (bottom 5% of returns).
pub const VAR_CONFIDENCE: f64 = 0.05;

/// Largest `C(n, k)` an analysis run is allowed to enumerate.
pub const MAX_COMBINATIONS: u64 = 250_000;

/// Broad index proxy used for portfolio beta.
pub const BENCHMARK_SYMBOL: &str = "SPY";

/// 10-year treasury yield, quoted in percentage points.
pub const RISK_FREE_SYMBOL: &str = "^TNX";

pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Row count returned by the JSON POST endpoint when no limit is given.
pub const DEFAULT_POST_LIMIT: usize = 3;

/// Volatilities at or below this are treated as zero.
pub const MIN_VOLATILITY: f64 = 1e-12;

pub fn init_cpu_parallelism(threads: Option<usize>) {
    RAYON_INIT.get_or_init(|| {
        let num_threads = threads.unwrap_or_else(num_cpus::get).max(1);
        match ThreadPoolBuilder::new().num_threads(num_threads).build_global() {
            Ok(_) => info!("Initialized Rayon thread pool with {} threads", num_threads),
            Err(e) => warn!(
                "Rayon thread pool already initialized or unavailable ({}). Using existing configuration.",
                e
            ),
        }
    });
}

/// Process-level settings shared by the CLI and the HTTP server.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisConfig {
    pub max_combinations: u64,
    pub trading_days_per_year: u32,
    /// `None` disables the benchmark column (and therefore beta).
    pub benchmark_symbol: Option<String>,
    pub risk_free_symbol: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_combinations: MAX_COMBINATIONS,
            trading_days_per_year: TRADING_DAYS,
            benchmark_symbol: Some(BENCHMARK_SYMBOL.to_string()),
            risk_free_symbol: RISK_FREE_SYMBOL.to_string(),
        }
    }
}

impl AnalysisConfig {
    /// Defaults overridden by `SCREENER_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(v) = parse_var(&lookup, "SCREENER_MAX_COMBINATIONS") {
            cfg.max_combinations = v;
        }
        if let Some(v) = parse_var::<u32>(&lookup, "SCREENER_TRADING_DAYS") {
            if v == 0 {
                warn!("SCREENER_TRADING_DAYS=0 ignored; keeping {}", cfg.trading_days_per_year);
            } else {
                cfg.trading_days_per_year = v;
            }
        }
        if let Some(raw) = lookup("SCREENER_BENCHMARK") {
            let symbol = raw.trim().to_uppercase();
            cfg.benchmark_symbol = match symbol.as_str() {
                "" | "NONE" | "OFF" => None,
                _ => Some(symbol),
            };
        }
        if let Some(raw) = lookup("SCREENER_RISK_FREE_SYMBOL") {
            let symbol = raw.trim().to_uppercase();
            if !symbol.is_empty() {
                cfg.risk_free_symbol = symbol;
            }
        }

        cfg
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Unparsable {}={}; keeping default", key, trimmed);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_overrides() {
        let cfg = AnalysisConfig::from_lookup(lookup_from(&[]));
        assert_eq!(cfg, AnalysisConfig::default());
        assert_eq!(cfg.trading_days_per_year, 252);
        assert_eq!(cfg.benchmark_symbol.as_deref(), Some("SPY"));
    }

    #[test]
    fn test_env_overrides_are_applied() {
        let cfg = AnalysisConfig::from_lookup(lookup_from(&[
            ("SCREENER_MAX_COMBINATIONS", "1000"),
            ("SCREENER_TRADING_DAYS", "365"),
            ("SCREENER_BENCHMARK", "qqq"),
            ("SCREENER_RISK_FREE_SYMBOL", "^irx"),
        ]));
        assert_eq!(cfg.max_combinations, 1000);
        assert_eq!(cfg.trading_days_per_year, 365);
        assert_eq!(cfg.benchmark_symbol.as_deref(), Some("QQQ"));
        assert_eq!(cfg.risk_free_symbol, "^IRX");
    }

    #[test]
    fn test_bad_values_keep_defaults() {
        let cfg = AnalysisConfig::from_lookup(lookup_from(&[
            ("SCREENER_MAX_COMBINATIONS", "lots"),
            ("SCREENER_TRADING_DAYS", "0"),
            ("SCREENER_BENCHMARK", "none"),
        ]));
        assert_eq!(cfg.max_combinations, MAX_COMBINATIONS);
        assert_eq!(cfg.trading_days_per_year, TRADING_DAYS);
        assert_eq!(cfg.benchmark_symbol, None);
    }
}
