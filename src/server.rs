use crate::config::{AnalysisConfig, DEFAULT_POST_LIMIT};
use crate::data;
use crate::engine::{self, AnalysisParams};
use crate::error::{AnalysisError, AnalysisResult};
use crate::metrics::MetricsRecord;
use crate::results::ResultTable;
use crate::scoring::{InvestmentGoal, MetricField, Ranking};
use crate::table::PriceTable;
use crate::weights::{RiskProfile, WeightScaling};
use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::{Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

#[derive(Clone)]
struct WebState {
    config: Arc<AnalysisConfig>,
    last_run: Arc<Mutex<LastRunState>>,
}

#[derive(Clone, Debug, Serialize)]
struct ApiError {
    error: String,
}

#[derive(Clone, Debug, Serialize, Default)]
struct LastRunState {
    tickers: Vec<String>,
    set_size: usize,
    rows_returned: usize,
    has_benchmark: bool,
    updated_at: Option<String>,
    last_error: Option<String>,
}

fn default_order_by() -> String {
    MetricField::TotalReturn.as_str().to_string()
}

fn default_ascending() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct PortfolioRequest {
    years_simulated: u32,
    set_size: usize,
    tickers: Vec<String>,
    #[serde(default = "default_order_by")]
    order_by: String,
    #[serde(default = "default_ascending")]
    ascending: bool,
    limit: Option<usize>,
    risk_profile: Option<RiskProfile>,
    weight_scaling: Option<WeightScaling>,
    goal: Option<InvestmentGoal>,
}

/// Query form of [`PortfolioRequest`]; `tickers` is comma-separated.
#[derive(Debug, Deserialize)]
struct OptimizeQuery {
    years_simulated: u32,
    set_size: usize,
    tickers: String,
    #[serde(default = "default_order_by")]
    order_by: String,
    #[serde(default = "default_ascending")]
    ascending: bool,
    limit: Option<usize>,
    risk_profile: Option<RiskProfile>,
}

/// Transport-independent request after defaults are applied.
#[derive(Debug)]
struct AnalysisRequest {
    years_simulated: u32,
    set_size: usize,
    tickers: Vec<String>,
    order_by: String,
    ascending: bool,
    limit: Option<usize>,
    risk_profile: RiskProfile,
    weight_scaling: WeightScaling,
    goal: Option<InvestmentGoal>,
}

pub fn router(config: AnalysisConfig) -> Router {
    let state = WebState {
        config: Arc::new(config),
        last_run: Arc::new(Mutex::new(LastRunState::default())),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/state", get(last_run))
        .route("/portfolio/", post(portfolio))
        .route("/optimize", get(optimize))
        .layer(cors)
        .with_state(state)
}

pub async fn run_server(port: u16, config: AnalysisConfig) -> Result<()> {
    let app = router(config);
    let addr = format!("0.0.0.0:{}", port);
    info!("Portfolio screener listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

async fn last_run(State(state): State<WebState>) -> Json<LastRunState> {
    Json(state.last_run.lock().await.clone())
}

async fn portfolio(
    State(state): State<WebState>,
    Json(req): Json<PortfolioRequest>,
) -> Result<Json<Vec<MetricsRecord>>, (StatusCode, Json<ApiError>)> {
    let request = AnalysisRequest {
        years_simulated: req.years_simulated,
        set_size: req.set_size,
        tickers: req.tickers,
        order_by: req.order_by,
        ascending: req.ascending,
        limit: Some(req.limit.unwrap_or(DEFAULT_POST_LIMIT)),
        risk_profile: req.risk_profile.unwrap_or_default(),
        weight_scaling: req.weight_scaling.unwrap_or_default(),
        goal: req.goal,
    };
    handle(state, request).await
}

async fn optimize(
    State(state): State<WebState>,
    Query(query): Query<OptimizeQuery>,
) -> Result<Json<Vec<MetricsRecord>>, (StatusCode, Json<ApiError>)> {
    let request = AnalysisRequest {
        years_simulated: query.years_simulated,
        set_size: query.set_size,
        tickers: query.tickers.split(',').map(str::to_string).collect(),
        order_by: query.order_by,
        ascending: query.ascending,
        limit: query.limit,
        risk_profile: query.risk_profile.unwrap_or_default(),
        weight_scaling: WeightScaling::default(),
        goal: None,
    };
    handle(state, request).await
}

async fn handle(
    state: WebState,
    req: AnalysisRequest,
) -> Result<Json<Vec<MetricsRecord>>, (StatusCode, Json<ApiError>)> {
    let tickers = data::normalize_tickers(&req.tickers);
    if tickers.is_empty() {
        return Err(api_err(StatusCode::BAD_REQUEST, "tickers cannot be empty"));
    }
    let ranking = resolve_ranking(&req.order_by, req.ascending, req.goal)?;

    let mut params = AnalysisParams::from_config(&state.config, req.years_simulated, req.set_size);
    params.risk_profile = req.risk_profile;
    params.weight_scaling = req.weight_scaling;
    // Cheap checks before any network round-trip.
    params.validate().map_err(analysis_err)?;

    let table = data::fetch_price_table(&tickers, req.years_simulated, &state.config)
        .await
        .map_err(|e| api_err(StatusCode::BAD_GATEWAY, &e.to_string()))?;

    let limit = req.limit;
    let result = tokio::task::spawn_blocking(move || rank_table(&table, &params, ranking, limit))
        .await
        .map_err(internal_err)?;

    let mut last = state.last_run.lock().await;
    last.tickers = tickers;
    last.updated_at = Some(chrono::Local::now().to_rfc3339());
    match result {
        Ok(table) => {
            last.set_size = table.set_size();
            last.rows_returned = table.len();
            last.has_benchmark = table.has_benchmark();
            last.last_error = None;
            Ok(Json(table.into_records()))
        }
        Err(e) => {
            warn!("Analysis failed: {}", e);
            last.set_size = req.set_size;
            last.rows_returned = 0;
            last.last_error = Some(e.to_string());
            Err(analysis_err(e))
        }
    }
}

fn resolve_ranking(
    order_by: &str,
    ascending: bool,
    goal: Option<InvestmentGoal>,
) -> Result<Ranking, (StatusCode, Json<ApiError>)> {
    if let Some(goal) = goal {
        return Ok(Ranking::by_goal(goal));
    }
    let field: MetricField = order_by
        .parse()
        .map_err(|e: crate::scoring::UnknownMetricField| api_err(StatusCode::BAD_REQUEST, &e.to_string()))?;
    Ok(Ranking::by_field(field, ascending))
}

/// Streams a bounded top-k when a limit is requested, otherwise sorts the
/// full table.
fn rank_table(
    table: &PriceTable,
    params: &AnalysisParams,
    ranking: Ranking,
    limit: Option<usize>,
) -> AnalysisResult<ResultTable> {
    match limit {
        Some(limit) => engine::top_k(table, params, ranking, limit),
        None => Ok(engine::analyze(table, params)?.sorted(ranking, None)),
    }
}

fn analysis_err(err: AnalysisError) -> (StatusCode, Json<ApiError>) {
    api_err(StatusCode::UNPROCESSABLE_ENTITY, &err.to_string())
}

fn api_err(status: StatusCode, message: &str) -> (StatusCode, Json<ApiError>) {
    (
        status,
        Json(ApiError {
            error: message.to_string(),
        }),
    )
}

fn internal_err<E: std::fmt::Display>(err: E) -> (StatusCode, Json<ApiError>) {
    api_err(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
}
