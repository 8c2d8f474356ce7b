mod combinations;
mod config;
mod data;
mod engine;
mod error;
mod metrics;
mod results;
mod returns;
mod scoring;
mod server;
mod stats;
mod table;
mod weights;

use anyhow::Result;
use clap::Parser;
use config::AnalysisConfig;
use engine::AnalysisParams;
use scoring::{InvestmentGoal, MetricField, RankKey, Ranking};
use std::path::PathBuf;
use table::PriceTable;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use weights::{RiskProfile, WeightScaling};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Portfolio screener: ranks every fixed-size subset of a ticker list by risk/return metrics",
    after_help = "EXAMPLES:
    # Rank all 3-stock portfolios over the last 5 years by Sharpe ratio
    cargo run --release -- --tickers AAPL,MSFT,NVDA,AMZN,GOOGL --set-size 3 --order-by Sharpe_Ratio --limit 5

    # Offline run on a saved price table
    cargo run --release -- --prices prices.json --years 2 --set-size 2 --wide

    # Synthetic data, ranked by investment goal
    cargo run --release -- --demo 12 --set-size 4 --goal long_term_growth --limit 10

    # HTTP API
    cargo run --release -- --serve --port 8080"
)]
struct Args {
    /// Comma-separated tickers to download (e.g., AAPL,MSFT,NVDA)
    #[arg(long)]
    tickers: Option<String>,

    /// Load the price table from a JSON file instead of downloading
    #[arg(long)]
    prices: Option<PathBuf>,

    /// Use a synthetic random-walk table with this many assets
    #[arg(long)]
    demo: Option<usize>,

    /// Write the (downloaded or synthetic) price table to this JSON file
    #[arg(long)]
    save_prices: Option<PathBuf>,

    /// Trailing window in years
    #[arg(long, default_value_t = 5)]
    years: u32,

    /// Number of assets per portfolio
    #[arg(long, default_value_t = 3)]
    set_size: usize,

    /// Metric column to sort by (e.g., Sharpe_Ratio, Total_Return, CAGR)
    #[arg(long, default_value = "Total_Return")]
    order_by: String,

    /// Sort ascending instead of descending
    #[arg(long)]
    ascending: bool,

    /// Keep only the best N portfolios (streams a bounded top-k)
    #[arg(long)]
    limit: Option<usize>,

    /// Rank by investment goal instead of --order-by
    /// (short_term_gains | long_term_growth | risk_adjusted | downside_aware | capital_preservation)
    #[arg(long)]
    goal: Option<InvestmentGoal>,

    /// Risk profile applied to equal weights (neutral | aggressive | conservative)
    #[arg(long, default_value = "neutral")]
    risk_profile: RiskProfile,

    /// Weight handling after the risk multiplier (normalized | leveraged)
    #[arg(long, default_value = "normalized")]
    weight_scaling: WeightScaling,

    /// VaR tail probability (default: 0.05)
    #[arg(long)]
    var_confidence: Option<f64>,

    /// CVaR tail probability (default: 0.05)
    #[arg(long)]
    cvar_confidence: Option<f64>,

    /// Trading periods per year used for annualization (default: 252)
    #[arg(long)]
    trading_days: Option<u32>,

    /// Reject runs whose combination count exceeds this ceiling
    #[arg(long)]
    max_combinations: Option<u64>,

    /// Benchmark symbol for beta, or "none" to disable (default: SPY)
    #[arg(long)]
    benchmark: Option<String>,

    /// Show every metric column instead of just the sort column
    #[arg(long)]
    wide: bool,

    /// Print results as JSON records
    #[arg(long)]
    json: bool,

    /// Start the HTTP API instead of running a single analysis
    #[arg(long)]
    serve: bool,

    /// HTTP API port
    #[arg(long, default_value_t = config::DEFAULT_SERVER_PORT)]
    port: u16,

    /// Worker threads for subset evaluation (default: all logical cores)
    #[arg(long)]
    threads: Option<usize>,
}

impl Args {
    fn analysis_config(&self) -> AnalysisConfig {
        let mut cfg = AnalysisConfig::from_env();
        if let Some(max) = self.max_combinations {
            cfg.max_combinations = max;
        }
        if let Some(days) = self.trading_days {
            cfg.trading_days_per_year = days;
        }
        if let Some(ref symbol) = self.benchmark {
            let symbol = symbol.trim().to_uppercase();
            cfg.benchmark_symbol = if matches!(symbol.as_str(), "" | "NONE" | "OFF") {
                None
            } else {
                Some(symbol)
            };
        }
        cfg
    }

    fn analysis_params(&self, cfg: &AnalysisConfig) -> AnalysisParams {
        let mut params = AnalysisParams::from_config(cfg, self.years, self.set_size);
        if let Some(v) = self.var_confidence {
            params.var_confidence = v;
            params.cvar_confidence = v;
        }
        if let Some(v) = self.cvar_confidence {
            params.cvar_confidence = v;
        }
        params.risk_profile = self.risk_profile;
        params.weight_scaling = self.weight_scaling;
        params
    }

    fn ranking(&self) -> Result<Ranking> {
        Ok(match self.goal {
            Some(goal) => Ranking::by_goal(goal),
            None => Ranking::by_field(self.order_by.parse::<MetricField>()?, self.ascending),
        })
    }
}

async fn load_table(args: &Args, cfg: &AnalysisConfig) -> Result<PriceTable> {
    if let Some(ref path) = args.prices {
        info!("Loading price table from {}", path.display());
        return PriceTable::load_json(path);
    }
    if let Some(count) = args.demo {
        let symbols: Vec<String> = (1..=count).map(|i| format!("SYN{:02}", i)).collect();
        let refs: Vec<&str> = symbols.iter().map(String::as_str).collect();
        let days = (args.years as usize + 1) * 252;
        info!("Generating synthetic table: {} assets x {} days", count, days);
        return Ok(PriceTable::new_mock(&refs, days, 42, cfg.benchmark_symbol.as_deref())?);
    }
    if let Some(ref tickers) = args.tickers {
        let tickers: Vec<String> = tickers.split(',').map(str::to_string).collect();
        return data::fetch_price_table(&tickers, args.years, cfg).await;
    }
    Err(anyhow::anyhow!(
        "Nothing to analyze. Pass --tickers, --prices or --demo (or --serve for the HTTP API)."
    ))
}

async fn run_analysis(args: &Args) -> Result<()> {
    let cfg = args.analysis_config();
    let params = args.analysis_params(&cfg);
    let ranking = args.ranking()?;
    params.validate()?;

    let table = load_table(args, &cfg).await?;
    if let Some(ref path) = args.save_prices {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), &table.to_file())?;
        info!("Saved price table to {}", path.display());
    }

    let result = match args.limit {
        Some(limit) => engine::top_k(&table, &params, ranking, limit)?,
        None => engine::analyze(&table, &params)?.sorted(ranking, None),
    };

    if result.is_empty() {
        warn!("No portfolios to report");
    }
    if args.json {
        println!("{}", serde_json::to_string_pretty(result.records())?);
    } else {
        let column = match ranking.key {
            RankKey::Field(field) => Some(field),
            RankKey::Goal(_) => None,
        };
        result.print(column, args.wide || column.is_none());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("portfolio_screener=info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    let args = Args::parse();

    config::init_cpu_parallelism(args.threads);

    if args.serve {
        match server::run_server(args.port, args.analysis_config()).await {
            Ok(_) => info!("Server exited."),
            Err(e) => error!("Server failed: {}", e),
        }
        return Ok(());
    }

    if let Err(e) = run_analysis(&args).await {
        error!("Analysis failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing_and_overrides() {
        let args = Args::parse_from([
            "portfolio-screener",
            "--demo",
            "5",
            "--set-size",
            "2",
            "--years",
            "1",
            "--goal",
            "risk_adjusted",
            "--risk-profile",
            "conservative",
            "--var-confidence",
            "0.1",
            "--benchmark",
            "none",
            "--max-combinations",
            "50",
        ]);
        let cfg = args.analysis_config();
        assert_eq!(cfg.benchmark_symbol, None);
        assert_eq!(cfg.max_combinations, 50);

        let params = args.analysis_params(&cfg);
        assert_eq!(params.set_size, 2);
        assert_eq!(params.risk_profile, RiskProfile::Conservative);
        assert_eq!(params.var_confidence, 0.1);
        assert_eq!(params.cvar_confidence, 0.1);
        assert_eq!(args.ranking().unwrap(), Ranking::by_goal(InvestmentGoal::RiskAdjusted));
    }

    #[test]
    fn test_unknown_order_by_is_reported() {
        let args = Args::parse_from(["portfolio-screener", "--demo", "3", "--order-by", "Alpha"]);
        assert!(args.ranking().is_err());
    }

    #[tokio::test]
    async fn test_demo_run_end_to_end() {
        let args = Args::parse_from([
            "portfolio-screener",
            "--demo",
            "4",
            "--years",
            "1",
            "--set-size",
            "2",
            "--limit",
            "3",
            "--json",
        ]);
        let cfg = args.analysis_config();
        let table = load_table(&args, &cfg).await.unwrap();
        assert_eq!(table.asset_count(), 4);
        assert!(run_analysis(&args).await.is_ok());
    }
}
