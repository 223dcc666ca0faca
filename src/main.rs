// =============================================================================
// Helios Control Plane — Main Entry Point
// =============================================================================
//
// Wires every subsystem behind one `ControlPlaneState` and exposes the
// control-port surfaces named in §6: bot runtime (start/pause/stop/
// enqueueRun), signal (generateAndPersistPrediction/runCompositeStrategy),
// and news (listEconomicEvents/evaluateNewsRiskForSymbol). Structured after
// the teacher's own `main.rs`: build shared state, spawn background loops,
// serve the API, wait on `ctrl_c` for graceful shutdown.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use helios_control_plane::ai::{AiGuard, AiQualityGateRollingState};
use helios_control_plane::config::Config;
use helios_control_plane::exchange::{self, AdapterRegistry};
use helios_control_plane::license::{LicenseGate, StaticFreeSource};
use helios_control_plane::news::{
    apply_news_risk_to_feature_snapshot, evaluate_news_blackout, EconomicCalendar, HttpCalendarSource, Impact,
};
use helios_control_plane::notify::{NotificationSink, NullSink};
use helios_control_plane::orchestrator::{InMemoryQueue, Orchestrator};
use helios_control_plane::signal::refresh::{LocalExplainer, PredictionRefreshService};
use helios_control_plane::signal::trigger::{TriggerBucketState, TriggerInput};
use helios_control_plane::signal::types::{prediction_unique_key, FeatureSnapshot, PredictionState, Signal, TriggerDebounceState};
use helios_control_plane::strategy::dag::{run_composite_strategy, AiNodeInvoker, CompositeGraph};
use helios_control_plane::strategy::local::{LocalStrategyRegistry, StrategyContext, StrategyOutcome};

/// Bundles the per-`(bot,timeframe)` bookkeeping the refresh/trigger engines
/// need to carry between ticks (§3 `TriggerBucketState`/`TriggerDebounceState`).
#[derive(Default, Clone)]
struct PredictionBookkeeping {
    bucket_state: TriggerBucketState,
    debounce_state: TriggerDebounceState,
    quality_gate_state: Arc<parking_lot::Mutex<AiQualityGateRollingState>>,
}

/// Central control-plane state, shared across every axum handler and
/// background task via `Arc`, mirroring the teacher's `AppState` shape.
struct ControlPlaneState {
    config: Config,
    exchanges: AdapterRegistry,
    orchestrator: Arc<Orchestrator>,
    ai_guard: Arc<AiGuard>,
    calendar: Arc<EconomicCalendar>,
    local_registry: Arc<LocalStrategyRegistry>,
    refresh_service: Arc<PredictionRefreshService>,
    local_explainer: LocalExplainer,
    notifier: Arc<dyn NotificationSink>,
    predictions: RwLock<HashMap<String, PredictionState>>,
    bookkeeping: RwLock<HashMap<String, PredictionBookkeeping>>,
}

impl ControlPlaneState {
    fn new(config: Config, exchanges: AdapterRegistry) -> Self {
        let license_source = Box::new(StaticFreeSource);
        let license = Arc::new(LicenseGate::new(license_source, config.license.enforcement, config.license.cache_ttl_seconds));
        let queue = Box::new(InMemoryQueue::new());

        ControlPlaneState {
            exchanges,
            orchestrator: Arc::new(Orchestrator::new(queue, license)),
            ai_guard: Arc::new(AiGuard::new()),
            calendar: Arc::new(EconomicCalendar::new(Box::new(HttpCalendarSource::new(
                std::env::var("ECON_CALENDAR_URL").unwrap_or_else(|_| "http://localhost:9100".to_string()),
            )))),
            local_registry: Arc::new(LocalStrategyRegistry::with_builtins()),
            refresh_service: Arc::new(PredictionRefreshService::new()),
            local_explainer: LocalExplainer,
            notifier: Arc::new(NullSink),
            predictions: RwLock::new(HashMap::new()),
            bookkeeping: RwLock::new(HashMap::new()),
            config,
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// =============================================================================
// Bot runtime surface (§6)
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartBotRequest {
    user_id: String,
    exchange: String,
    total_bots: u32,
    running_bots: u32,
}

#[derive(Debug, Serialize)]
struct StartBotResponse {
    ok: bool,
    reason: String,
}

async fn start_bot(
    State(state): State<Arc<ControlPlaneState>>,
    Path(bot_id): Path<String>,
    Json(req): Json<StartBotRequest>,
) -> impl IntoResponse {
    let (ok, decision) = state
        .orchestrator
        .start(&bot_id, &req.user_id, &req.exchange, req.total_bots, req.running_bots)
        .await;
    Json(StartBotResponse { ok, reason: decision.to_string() })
}

#[derive(Debug, Deserialize)]
struct ReasonBody {
    #[serde(default)]
    reason: Option<String>,
}

async fn pause_bot(
    State(state): State<Arc<ControlPlaneState>>,
    Path(bot_id): Path<String>,
    Json(body): Json<ReasonBody>,
) -> impl IntoResponse {
    let status = state.orchestrator.pause(&bot_id, body.reason.unwrap_or_else(|| "manual_pause".to_string()));
    Json(status)
}

async fn stop_bot(
    State(state): State<Arc<ControlPlaneState>>,
    Path(bot_id): Path<String>,
    Json(body): Json<ReasonBody>,
) -> impl IntoResponse {
    let status = state.orchestrator.stop(&bot_id, body.reason.unwrap_or_else(|| "manual_stop".to_string()));
    Json(status)
}

async fn enqueue_run(State(state): State<Arc<ControlPlaneState>>, Path(bot_id): Path<String>) -> impl IntoResponse {
    let outcome = state.orchestrator.enqueue_run(&bot_id).await;
    Json(outcome)
}

// =============================================================================
// Signal surface (§6)
// =============================================================================

/// Input to `generateAndPersistPrediction`: the caller has already computed
/// indicator/SMC features this tick (C7) and the trigger-relevant scalars
/// (C8); this endpoint owns significance/debounce/AI-gating/persistence
/// (C8-C10) and explanation (C9).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PredictInput {
    exchange: String,
    account_id: String,
    symbol: String,
    market_type: String,
    timeframe: String,
    signal: Signal,
    confidence: f64,
    expected_move_pct: f64,
    #[serde(default)]
    tags: Vec<String>,
    feature_snapshot: FeatureSnapshot,
    #[serde(default)]
    trigger: TriggerInputDto,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TriggerInputDto {
    #[serde(default)]
    trend_rank: Option<f64>,
    #[serde(default)]
    trend_enter: f64,
    #[serde(default)]
    rsi: Option<f64>,
    #[serde(default)]
    rsi_enter: f64,
    #[serde(default)]
    vol_rank: Option<f64>,
    #[serde(default)]
    vol_enter: f64,
    #[serde(default)]
    signal_bias_up: Option<bool>,
    #[serde(default)]
    breakout_score: Option<f64>,
    #[serde(default)]
    funding_rate: Option<f64>,
    #[serde(default)]
    basis_bps: Option<f64>,
    #[serde(default)]
    data_gap: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictResponse {
    persisted: bool,
    prediction: PredictionState,
    signal_source: &'static str,
    explanation: String,
    feature_snapshot: FeatureSnapshot,
    model_version: String,
    row_id: String,
}

async fn generate_and_persist_prediction(
    State(state): State<Arc<ControlPlaneState>>,
    Json(input): Json<PredictInput>,
) -> impl IntoResponse {
    let unique_key = prediction_unique_key(&input.exchange, &input.account_id, &input.symbol, &input.market_type, &input.timeframe);
    let now = now_ms();

    let prev = state.predictions.read().get(&unique_key).cloned();
    let bookkeeping = state.bookkeeping.read().get(&unique_key).cloned().unwrap_or_default();

    let trigger_input = TriggerInput {
        now_ms: now,
        last_updated_ms: prev.as_ref().map(|p| p.ts_updated).unwrap_or(0),
        timeframe: input.timeframe.clone(),
        prev_trend_bucket_entered: bookkeeping.bucket_state.trend_entered,
        trend_rank: input.trigger.trend_rank,
        trend_enter: input.trigger.trend_enter,
        prev_rsi_bucket_entered: bookkeeping.bucket_state.rsi_entered,
        rsi: input.trigger.rsi,
        rsi_enter: input.trigger.rsi_enter,
        prev_vol_bucket_entered: bookkeeping.bucket_state.vol_entered,
        vol_rank: input.trigger.vol_rank,
        vol_enter: input.trigger.vol_enter,
        prev_signal_bias_up: prev.as_ref().map(|p| matches!(p.signal, Signal::Up)),
        signal_bias_up: input.trigger.signal_bias_up,
        breakout_score: input.trigger.breakout_score,
        prev_breakout_above: bookkeeping.bucket_state.breakout_above,
        funding_rate: input.trigger.funding_rate,
        prev_funding_above: bookkeeping.bucket_state.funding_above,
        basis_bps: input.trigger.basis_bps,
        prev_basis_above: bookkeeping.bucket_state.basis_above,
        data_gap: input.trigger.data_gap,
    };

    let candidate = PredictionState {
        unique_key: unique_key.clone(),
        signal: input.signal,
        confidence: input.confidence,
        expected_move_pct: input.expected_move_pct,
        tags: input.tags,
        key_drivers: vec![],
        explanation: String::new(),
        feature_snapshot: input.feature_snapshot,
        model_version: String::new(),
        ts_updated: now,
        last_ai_explained_at: prev.as_ref().and_then(|p| p.last_ai_explained_at),
        unstable: false,
    };

    let (outcome, decision) = state
        .refresh_service
        .refresh(
            &input.symbol,
            &input.timeframe,
            prev,
            candidate,
            trigger_input,
            bookkeeping.bucket_state,
            bookkeeping.debounce_state,
            None,
            &state.local_explainer,
            &state.config.prediction,
        )
        .await;

    state.bookkeeping.write().insert(
        unique_key.clone(),
        PredictionBookkeeping { bucket_state: decision.bucket_state, debounce_state: decision.trigger_state, ..Default::default() },
    );

    if outcome.persisted {
        state.predictions.write().insert(unique_key.clone(), outcome.prediction.clone());
    }

    let response = PredictResponse {
        persisted: outcome.persisted,
        signal_source: match outcome.signal_source {
            helios_control_plane::signal::refresh::SignalSource::Local => "local",
            helios_control_plane::signal::refresh::SignalSource::Ai => "ai",
        },
        explanation: outcome.prediction.explanation.clone(),
        feature_snapshot: outcome.prediction.feature_snapshot.clone(),
        model_version: outcome.prediction.model_version.clone(),
        row_id: unique_key,
        prediction: outcome.prediction,
    };
    Json(response)
}

/// Resolves AI nodes in a composite run to the "no AI backend configured"
/// local default — this control plane wires real explainers per-deployment;
/// out of the box an AI node is always gated off (§4.11: "`None` when the
/// gate blocks the call").
struct NoAiInvoker;
impl AiNodeInvoker for NoAiInvoker {
    fn invoke(&mut self, _ctx: &StrategyContext, _node: &helios_control_plane::strategy::dag::CompositeNode) -> Option<StrategyOutcome> {
        None
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompositeInput {
    graph: CompositeGraph,
    base_signal: Signal,
    base_confidence: f64,
    feature_snapshot: FeatureSnapshot,
}

async fn run_composite(State(state): State<Arc<ControlPlaneState>>, Json(input): Json<CompositeInput>) -> impl IntoResponse {
    let mut ai_invoker = NoAiInvoker;
    let result = run_composite_strategy(
        &input.graph,
        input.base_signal,
        input.base_confidence,
        input.feature_snapshot,
        &state.local_registry,
        &mut ai_invoker,
    );
    Json(result)
}

// =============================================================================
// News surface (§6)
// =============================================================================

#[derive(Debug, Deserialize)]
struct ListEventsQuery {
    from: i64,
    to: i64,
    currency: Option<String>,
    #[serde(rename = "impactMin")]
    impact_min: Option<Impact>,
}

async fn list_economic_events(State(state): State<Arc<ControlPlaneState>>, Query(q): Query<ListEventsQuery>) -> impl IntoResponse {
    let events = state.calendar.list_events(q.from, q.to, q.currency.as_deref(), q.impact_min);
    Json(events)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvaluateNewsRiskRequest {
    currencies: Vec<String>,
    #[serde(default = "default_impact_min")]
    impact_min: Impact,
    #[serde(default = "default_pre_minutes")]
    pre_minutes: i64,
    #[serde(default = "default_post_minutes")]
    post_minutes: i64,
    #[serde(default)]
    now: Option<i64>,
}

fn default_impact_min() -> Impact {
    Impact::High
}
fn default_pre_minutes() -> i64 {
    15
}
fn default_post_minutes() -> i64 {
    15
}

async fn evaluate_news_risk_for_symbol(
    State(state): State<Arc<ControlPlaneState>>,
    Json(req): Json<EvaluateNewsRiskRequest>,
) -> impl IntoResponse {
    let now = req.now.unwrap_or_else(now_ms);
    let result = evaluate_news_blackout(&state.calendar, &req.currencies, req.impact_min, req.pre_minutes, req.post_minutes, now);
    Json(result)
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    server_time: i64,
    exchanges_configured: usize,
}

async fn health(State(state): State<Arc<ControlPlaneState>>) -> impl IntoResponse {
    Json(HealthResponse { status: "ok", server_time: now_ms(), exchanges_configured: state.exchanges.len() })
}

fn router(state: Arc<ControlPlaneState>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/bots/:bot_id/start", post(start_bot))
        .route("/api/v1/bots/:bot_id/pause", post(pause_bot))
        .route("/api/v1/bots/:bot_id/stop", post(stop_bot))
        .route("/api/v1/bots/:bot_id/enqueue-run", post(enqueue_run))
        .route("/api/v1/predict", post(generate_and_persist_prediction))
        .route("/api/v1/composite", post(run_composite))
        .route("/api/v1/news/economic-events", get(list_economic_events))
        .route("/api/v1/news/evaluate", post(evaluate_news_risk_for_symbol))
        .layer(cors)
        .with_state(state)
        .fallback(not_found)
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "not found")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Helios control plane starting up");

    let config = Config::from_env();
    let exchanges = exchange::build_registry(&config.venue_throttle);
    info!(count = exchanges.len(), "exchange adapters configured");

    let state = Arc::new(ControlPlaneState::new(config, exchanges));

    // Background: keep the economic calendar warm (§4.14).
    let calendar_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(6 * 60 * 60));
        loop {
            interval.tick().await;
            if !calendar_state.config.news.risk_enabled {
                continue;
            }
            let currencies = vec!["USD".to_string(), "EUR".to_string()];
            if let Err(e) = calendar_state.calendar.refresh_economic_calendar(&currencies, chrono::Utc::now()).await {
                warn!(error = %e, "economic calendar refresh failed");
            }
        }
    });

    let bind_addr = std::env::var("HELIOS_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3100".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "control-port API listening");

    let serve_state = state.clone();
    tokio::spawn(async move {
        let app = router(serve_state);
        if let Err(e) = axum::serve(listener, app).await {
            warn!(error = %e, "API server exited");
        }
    });

    info!("all subsystems running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received, stopping gracefully");

    info!("helios control plane shut down complete");
    Ok(())
}
