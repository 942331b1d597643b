use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::registry::DistributorRegistry;
use crate::error::AppError;
use crate::geo::haversine_km;
use crate::models::distributor::Distributor;
use crate::models::location::Location;

/// Straight-line travel speed used for time estimates.
pub const AVERAGE_SPEED_KMH: f64 = 30.0;

const SUCCESS_RATE_WEIGHT: f64 = 0.30;
const RATING_POINTS: f64 = 20.0;
const PROXIMITY_POINTS: f64 = 20.0;
const CAPACITY_POINTS: f64 = 15.0;
const SPEED_POINTS: f64 = 15.0;

const PROXIMITY_HORIZON_KM: f64 = 50.0;
const SPEED_HORIZON_HOURS: f64 = 48.0;

const MAX_SCORE: f64 = 100.0;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    #[default]
    Standard,
    Express,
    SameDay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRequest {
    pub pickup: Location,
    pub delivery: Location,
    #[serde(default)]
    pub package_value: f64,
    #[serde(default)]
    pub urgency: Urgency,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScoreBreakdown {
    pub success_rate_score: f64,
    pub rating_score: f64,
    pub proximity_score: f64,
    pub capacity_score: f64,
    pub speed_score: f64,
    pub urgency_bonus: f64,
    pub tier_bonus: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub distributor: Distributor,
    pub score: f64,
    pub score_breakdown: ScoreBreakdown,
    pub distance_to_pickup: f64,
    pub delivery_distance: f64,
    pub estimated_fee: f64,
    /// Hours.
    pub estimated_time: f64,
}

pub fn compute_score(
    distributor: &Distributor,
    distance_to_pickup: f64,
    urgency: Urgency,
) -> (f64, ScoreBreakdown) {
    let proximity_score = proximity_score(distance_to_pickup);
    let speed_score = speed_score(distributor.average_delivery_time);

    let breakdown = ScoreBreakdown {
        success_rate_score: distributor.success_rate * SUCCESS_RATE_WEIGHT,
        rating_score: (distributor.average_rating / 5.0) * RATING_POINTS,
        proximity_score,
        capacity_score: capacity_score(distributor),
        speed_score,
        urgency_bonus: urgency_bonus(urgency, speed_score, proximity_score),
        tier_bonus: distributor.tier.bonus(),
    };

    (total(&breakdown), breakdown)
}

pub fn total(breakdown: &ScoreBreakdown) -> f64 {
    let sum = breakdown.success_rate_score
        + breakdown.rating_score
        + breakdown.proximity_score
        + breakdown.capacity_score
        + breakdown.speed_score
        + breakdown.urgency_bonus
        + breakdown.tier_bonus;
    sum.clamp(0.0, MAX_SCORE)
}

fn proximity_score(distance_to_pickup: f64) -> f64 {
    (1.0 - distance_to_pickup / PROXIMITY_HORIZON_KM).max(0.0) * PROXIMITY_POINTS
}

fn capacity_score(distributor: &Distributor) -> f64 {
    if distributor.max_daily_orders == 0 {
        return 0.0;
    }
    (distributor.available_capacity as f64 / distributor.max_daily_orders as f64) * CAPACITY_POINTS
}

fn speed_score(average_delivery_time: f64) -> f64 {
    (1.0 - average_delivery_time / SPEED_HORIZON_HOURS).max(0.0) * SPEED_POINTS
}

fn urgency_bonus(urgency: Urgency, speed_score: f64, proximity_score: f64) -> f64 {
    match urgency {
        Urgency::Standard => 0.0,
        Urgency::Express => 0.3 * speed_score,
        Urgency::SameDay => 0.5 * speed_score + 0.5 * proximity_score,
    }
}

/// Scores one distributor against `request`. Returns `None` when it cannot
/// take the job: not active, full, or the pickup lies outside its coverage.
pub fn evaluate(distributor: &Distributor, request: &MatchRequest) -> Option<MatchResult> {
    if !distributor.is_matchable() {
        return None;
    }

    let pickup = request.pickup.point();
    let distance_to_pickup = haversine_km(&distributor.base_location.point(), &pickup);
    if distance_to_pickup > distributor.coverage_radius {
        return None;
    }

    let delivery_distance = haversine_km(&pickup, &request.delivery.point());
    let (score, score_breakdown) = compute_score(distributor, distance_to_pickup, request.urgency);

    Some(MatchResult {
        distributor: distributor.clone(),
        score,
        score_breakdown,
        distance_to_pickup,
        delivery_distance,
        estimated_fee: distributor.base_fee + delivery_distance * distributor.per_km_fee,
        estimated_time: (distance_to_pickup + delivery_distance) / AVERAGE_SPEED_KMH,
    })
}

/// Highest score wins; ties go to the closer distributor, then the lower id.
fn rank(a: &MatchResult, b: &MatchResult) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then(a.distance_to_pickup.total_cmp(&b.distance_to_pickup))
        .then(a.distributor.id.cmp(&b.distributor.id))
}

/// Picks the best candidate from a point-in-time snapshot. Pure.
pub fn select_best(
    candidates: &[Distributor],
    request: &MatchRequest,
    excluded: &HashSet<Uuid>,
) -> Option<MatchResult> {
    candidates
        .iter()
        .filter(|d| !excluded.contains(&d.id))
        .filter_map(|d| evaluate(d, request))
        .min_by(rank)
        .filter(|best| best.score > 0.0)
}

/// Reads a snapshot of active distributors and returns the optimal one.
/// Never mutates the registry.
pub fn find_optimal(
    registry: &DistributorRegistry,
    request: &MatchRequest,
    excluded: &HashSet<Uuid>,
) -> Result<MatchResult, AppError> {
    validate_request(request)?;

    let candidates = registry.list_active();
    debug!(candidates = candidates.len(), "scoring distributors");

    match select_best(&candidates, request, excluded) {
        Some(best) => {
            info!(
                distributor_id = %best.distributor.id,
                score = best.score,
                estimated_fee = best.estimated_fee,
                package_value = request.package_value,
                "distributor selected"
            );
            Ok(best)
        }
        None => {
            info!(
                candidates = candidates.len(),
                excluded = excluded.len(),
                "no distributor available for request"
            );
            Err(AppError::NoCandidate)
        }
    }
}

fn validate_request(request: &MatchRequest) -> Result<(), AppError> {
    if !request.pickup.point().is_valid() {
        return Err(AppError::BadRequest("pickup is not a valid coordinate".to_string()));
    }
    if !request.delivery.point().is_valid() {
        return Err(AppError::BadRequest("delivery is not a valid coordinate".to_string()));
    }
    Ok(())
}
