use std::collections::HashSet;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::lifecycle::{DispatchRequest, Dispatched};
use crate::engine::matching::{MatchRequest, MatchResult};
use crate::error::AppError;
use crate::models::assignment::{AssignmentStatus, DeliveryAssignment, NewAssignment};
use crate::models::location::GeoPoint;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/match", post(find_match))
        .route("/dispatch", post(dispatch))
        .route("/assignments", post(create_assignment))
        .route("/assignments/:id", get(get_assignment))
        .route("/assignments/:id/status", patch(update_assignment_status))
        .route("/assignments/:id/rating", post(rate_assignment))
}

#[derive(Deserialize)]
pub struct MatchBody {
    #[serde(flatten)]
    pub request: MatchRequest,
    /// Distributors to skip, e.g. ones that just rejected a reservation.
    #[serde(default)]
    pub exclude: Vec<Uuid>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AssignmentStatus,
    #[serde(default)]
    pub current_location: Option<GeoPoint>,
}

#[derive(Deserialize)]
pub struct RateRequest {
    pub rating: u8,
    #[serde(default)]
    pub feedback: Option<String>,
}

async fn find_match(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<MatchBody>,
) -> Result<Json<MatchResult>, AppError> {
    let excluded: HashSet<Uuid> = payload.exclude.into_iter().collect();
    Ok(Json(state.tracker.find_optimal(&payload.request, &excluded)?))
}

async fn dispatch(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DispatchRequest>,
) -> Result<Json<Dispatched>, AppError> {
    Ok(Json(state.tracker.dispatch(payload, state.deadline())?))
}

async fn create_assignment(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewAssignment>,
) -> Result<Json<DeliveryAssignment>, AppError> {
    Ok(Json(state.tracker.create(payload, state.deadline())?))
}

async fn get_assignment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryAssignment>, AppError> {
    Ok(Json(state.tracker.get(id)?))
}

async fn update_assignment_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<DeliveryAssignment>, AppError> {
    let assignment = state.tracker.transition(
        id,
        payload.status,
        payload.current_location,
        state.deadline(),
    )?;
    Ok(Json(assignment))
}

async fn rate_assignment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RateRequest>,
) -> Result<Json<DeliveryAssignment>, AppError> {
    Ok(Json(state.tracker.rate(id, payload.rating, payload.feedback)?))
}
