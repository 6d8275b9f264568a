//! API Request Handlers

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::middleware::{RateLimitConfig, RateLimiter};
use super::types::*;
use crate::core::pipeline::Guardian;
use crate::core::risk_score::recommendation_for;
use crate::models::errors::{GuardianError, GuardianResult};
use crate::models::types::{
    AnalysisRequest, AnalysisResult, FunctionPath, Network, SimulationOutcome, SimulationStatus,
};
use crate::utils::circuit_breaker::list_circuits;
use crate::utils::constants::SIMULATION_TTL_SECS;

/// Shared application state
pub struct AppState {
    pub guardian: Arc<Guardian>,
    pub rate_limiter: Arc<RateLimiter>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(guardian: Arc<Guardian>) -> Self {
        Self::with_rate_limit(guardian, RateLimitConfig::default())
    }

    pub fn with_rate_limit(guardian: Arc<Guardian>, rate_limit: RateLimitConfig) -> Self {
        Self {
            guardian,
            rate_limiter: Arc::new(RateLimiter::new(rate_limit)),
            start_time: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

type ApiFailure = (StatusCode, Json<ApiResponse<()>>);

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

fn failure(err: &GuardianError, start: Instant) -> ApiFailure {
    let status = StatusCode::from_u16(err.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ApiResponse::error(ApiError::from(err), elapsed_ms(start))))
}

fn to_response(state: &AppState, result: AnalysisResult) -> AnalysisResponse {
    let recommendation = recommendation_for(result.severity).to_string();
    AnalysisResponse {
        share_url: state.guardian.config().share_url(&result.share_id),
        recommendation,
        result,
    }
}

/// Validate the DTO into a domain request
fn build_request(req: AnalyzeRequest) -> GuardianResult<(AnalysisRequest, Option<String>)> {
    let network = match req.network.as_deref() {
        Some(name) => name.parse::<Network>()?,
        None => Network::default(),
    };
    let function = FunctionPath::parse(&req.function)?;
    let mut request = AnalysisRequest::new(network, &req.sender, function)?
        .with_type_arguments(req.type_arguments)
        .with_arguments(req.arguments);
    if let Some(simulation) = req.simulation {
        request = request.with_simulation(simulation);
    }
    Ok((request, req.simulation_id))
}

// ============================================
// Health Check
// ============================================

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<ApiResponse<HealthData>> {
    let start = Instant::now();

    let data = HealthData {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
    };

    Json(ApiResponse::success(data, elapsed_ms(start)))
}

// ============================================
// Analysis
// ============================================

pub async fn analyze(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<ApiResponse<AnalysisResponse>>, ApiFailure> {
    let start = Instant::now();

    let (mut request, simulation_id) = build_request(req).map_err(|e| {
        warn!("⚠️ Rejected analyze request: {}", e);
        failure(&e, start)
    })?;

    // An inline simulation wins over a referenced one
    let mut simulation_status = if request.simulation().is_some() {
        SimulationStatus::Provided
    } else {
        SimulationStatus::NotProvided
    };
    if let Some(id) = simulation_id.filter(|_| request.simulation().is_none()) {
        match state.guardian.results().load_simulation(&id).await {
            Ok(Some(simulation)) => {
                request = request.with_simulation(simulation);
                simulation_status = SimulationStatus::Provided;
            }
            Ok(None) => simulation_status = SimulationStatus::NotFound,
            Err(e) => {
                warn!("⚠️ Simulation {} unreadable: {}", id, e);
                simulation_status = SimulationStatus::NotFound;
            }
        }
    }

    let result = state
        .guardian
        .analyze_with_simulation_status(&request, simulation_status)
        .await;

    Ok(Json(ApiResponse::success(to_response(&state, result), elapsed_ms(start))))
}

pub async fn get_analysis(
    State(state): State<Arc<AppState>>,
    Path(share_id): Path<String>,
) -> Result<Json<ApiResponse<AnalysisResponse>>, ApiFailure> {
    let start = Instant::now();

    match state.guardian.results().by_share_id(&share_id).await {
        Ok(Some(result)) => Ok(Json(ApiResponse::success(to_response(&state, result), elapsed_ms(start)))),
        Ok(None) => Err(failure(
            &GuardianError::not_found(format!("No analysis with share id {}", share_id)),
            start,
        )),
        Err(e) => Err(failure(&e, start)),
    }
}

// ============================================
// Simulations
// ============================================

pub async fn store_simulation(
    State(state): State<Arc<AppState>>,
    Json(simulation): Json<SimulationOutcome>,
) -> Result<(StatusCode, Json<ApiResponse<SimulationStored>>), ApiFailure> {
    let start = Instant::now();

    let id = state
        .guardian
        .results()
        .save_simulation(&simulation)
        .await
        .map_err(|e| failure(&e, start))?;

    info!("🧪 Stored simulation {}", id);
    let data = SimulationStored {
        simulation_id: id,
        expires_in_secs: SIMULATION_TTL_SECS,
    };
    Ok((StatusCode::CREATED, Json(ApiResponse::success(data, elapsed_ms(start)))))
}

// ============================================
// Circuits
// ============================================

pub async fn get_circuits(State(state): State<Arc<AppState>>) -> Json<ApiResponse<Vec<CircuitData>>> {
    let start = Instant::now();
    let store = state.guardian.store();

    let mut circuits: Vec<CircuitData> = list_circuits(store.as_ref())
        .await
        .into_iter()
        .map(|(dependency, snapshot)| CircuitData { dependency, snapshot })
        .collect();
    circuits.sort_by(|a, b| a.dependency.cmp(&b.dependency));

    Json(ApiResponse::success(circuits, elapsed_ms(start)))
}

// ============================================
// Stats
// ============================================

pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<ApiResponse<StatsData>> {
    let start = Instant::now();
    let telemetry = state.guardian.telemetry().get_stats();

    info!("📊 {}", telemetry.summary());

    let data = StatsData {
        telemetry,
        uptime_seconds: state.uptime_seconds(),
        api_version: env!("CARGO_PKG_VERSION").to_string(),
    };

    Json(ApiResponse::success(data, elapsed_ms(start)))
}
