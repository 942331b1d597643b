use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::assignment::DeliveryAssignment;
use crate::models::distributor::{Distributor, DistributorProfile, DistributorStatus};
use crate::models::performance::{DistributorPerformance, PerformancePeriod};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/distributors", post(register_distributor).get(list_distributors))
        .route("/distributors/reset-daily", post(reset_daily_capacity))
        .route("/distributors/:id", get(get_distributor))
        .route("/distributors/:id/status", patch(update_distributor_status))
        .route("/distributors/:id/performance", get(distributor_performance))
        .route("/distributors/:id/assignments", get(distributor_assignments))
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DistributorStatus,
}

#[derive(Deserialize)]
pub struct PerformanceQuery {
    #[serde(default)]
    pub period: PerformancePeriod,
}

#[derive(Serialize)]
pub struct ResetResponse {
    pub reset: usize,
}

async fn register_distributor(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DistributorProfile>,
) -> Result<Json<Distributor>, AppError> {
    let distributor = state.registry.register(payload)?;
    state
        .metrics
        .observe_utilization(&distributor.id.to_string(), distributor.utilization());
    Ok(Json(distributor))
}

async fn list_distributors(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<Distributor>> {
    let distributors = if query.active_only {
        state.registry.list_active()
    } else {
        state.registry.list()
    };
    Json(distributors)
}

async fn get_distributor(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Distributor>, AppError> {
    Ok(Json(state.registry.get(id)?))
}

async fn update_distributor_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Distributor>, AppError> {
    Ok(Json(state.registry.set_status(id, payload.status)?))
}

async fn distributor_performance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<PerformanceQuery>,
) -> Result<Json<DistributorPerformance>, AppError> {
    Ok(Json(state.tracker.performance(id, query.period)?))
}

async fn distributor_assignments(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<DeliveryAssignment>>, AppError> {
    Ok(Json(state.tracker.list_for_distributor(id)?))
}

async fn reset_daily_capacity(State(state): State<Arc<AppState>>) -> Json<ResetResponse> {
    Json(ResetResponse {
        reset: state.registry.reset_daily_orders(),
    })
}
