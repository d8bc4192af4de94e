use std::sync::{Arc, RwLock};

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::metrics::Metrics;
use crate::pipeline::{CycleReport, SharedPipeline};
use crate::shutdown::Shutdown;
use crate::store::DeliveryStats;

#[derive(Clone)]
pub struct AppState {
    pipeline: SharedPipeline,
    last: Arc<RwLock<Option<CycleReport>>>,
    shutdown: Shutdown,
}

impl AppState {
    pub fn new(pipeline: SharedPipeline, shutdown: Shutdown) -> Self {
        Self {
            pipeline,
            last: Arc::new(RwLock::new(None)),
            shutdown,
        }
    }

    /// Remember `report` as the latest one (scheduler callback and POST /cycles).
    pub fn record(&self, report: &CycleReport) {
        let mut guard = self.last.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(report.clone());
    }

    pub fn last_report(&self) -> Option<CycleReport> {
        self.last.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

pub fn create_router(state: AppState, metrics: &Metrics) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/cycles", post(run_cycle_now))
        .route("/cycles/last", get(last_cycle))
        .route("/stats", get(stats))
        .with_state(state)
        .merge(metrics.router())
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
}

/// Runs one cycle now. Waits for a scheduled cycle in flight to finish first.
async fn run_cycle_now(State(state): State<AppState>) -> Json<CycleReport> {
    let report = {
        let mut pipeline = state.pipeline.lock().await;
        pipeline.run_cycle(&state.shutdown).await
    };
    state.record(&report);
    Json(report)
}

async fn last_cycle(State(state): State<AppState>) -> Json<Option<CycleReport>> {
    Json(state.last_report())
}

#[derive(Debug, Serialize)]
pub struct RadarStats {
    pub channel: String,
    pub seen_ids: usize,
    pub delivered_log: Option<DeliveryStats>,
}

async fn stats(State(state): State<AppState>) -> Result<Json<RadarStats>, (StatusCode, String)> {
    let (channel, seen_ids, log) = {
        let pipeline = state.pipeline.lock().await;
        (
            pipeline.channel().to_string(),
            pipeline.seen().len(),
            pipeline.delivery_log().cloned(),
        )
    };
    let delivered_log = match log {
        Some(log) => Some(log.stats().await.map_err(|e| {
            tracing::error!(target: "api", error = %e, "delivered log stats failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?),
        None => None,
    };
    Ok(Json(RadarStats {
        channel,
        seen_ids,
        delivered_log,
    }))
}
