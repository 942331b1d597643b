use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::matching::{self, MatchRequest, MatchResult, Urgency};
use crate::engine::registry::{DeliveryOutcome, DistributorRegistry, validate_rating};
use crate::engine::tier;
use crate::error::AppError;
use crate::models::assignment::{
    AssignmentStatus, CustomerInfo, DeliveryAssignment, NewAssignment, PackageInfo,
};
use crate::models::distributor::Distributor;
use crate::models::location::{GeoPoint, Location, TrackedPosition};
use crate::models::performance::{DistributorPerformance, PerformancePeriod};
use crate::observability::metrics::Metrics;

/// Share of the delivery fee paid out to the distributor; the platform keeps the rest.
pub const DISTRIBUTOR_SHARE: f64 = 0.8;

/// Match-and-assign input: the assignment is priced from the match estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub order_id: String,
    pub pickup: Location,
    pub delivery: Location,
    #[serde(default)]
    pub customer: CustomerInfo,
    #[serde(default)]
    pub package: PackageInfo,
    #[serde(default)]
    pub urgency: Urgency,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispatched {
    pub matched: MatchResult,
    pub assignment: DeliveryAssignment,
}

/// Creates assignments and walks them through their status lifecycle.
///
/// Lock order is always assignment entry first, distributor entry second.
pub struct AssignmentTracker {
    registry: Arc<DistributorRegistry>,
    assignments: DashMap<Uuid, DeliveryAssignment>,
    sequence: AtomicU64,
    events_tx: broadcast::Sender<DeliveryAssignment>,
    metrics: Metrics,
}

impl AssignmentTracker {
    pub fn new(registry: Arc<DistributorRegistry>, metrics: Metrics, event_buffer_size: usize) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size.max(1));

        Self {
            registry,
            assignments: DashMap::new(),
            sequence: AtomicU64::new(0),
            events_tx,
            metrics,
        }
    }

    pub fn registry(&self) -> &Arc<DistributorRegistry> {
        &self.registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeliveryAssignment> {
        self.events_tx.subscribe()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn find_optimal(
        &self,
        request: &MatchRequest,
        excluded: &HashSet<Uuid>,
    ) -> Result<MatchResult, AppError> {
        let start = Instant::now();
        let result = matching::find_optimal(&self.registry, request, excluded);

        let outcome = match &result {
            Ok(_) => "matched",
            Err(AppError::NoCandidate) => "no_candidate",
            Err(_) => "rejected",
        };
        self.metrics
            .match_latency_seconds
            .with_label_values(&[outcome])
            .observe(start.elapsed().as_secs_f64());
        self.metrics
            .match_requests_total
            .with_label_values(&[outcome])
            .inc();

        result
    }

    pub fn create(
        &self,
        new: NewAssignment,
        deadline: Option<Instant>,
    ) -> Result<DeliveryAssignment, AppError> {
        check_deadline(deadline)?;
        validate_new_assignment(&new)?;

        let distributor = match self.registry.reserve_capacity(new.distributor_id) {
            Ok(distributor) => distributor,
            Err(err) => {
                if let AppError::InsufficientCapacity(id) = &err {
                    info!(distributor_id = %id, order_id = %new.order_id, "distributor at capacity");
                }
                self.metrics
                    .assignments_total
                    .with_label_values(&[outcome_label(&err)])
                    .inc();
                return Err(err);
            }
        };

        let distance = crate::geo::haversine_km(&new.pickup.point(), &new.delivery.point());
        let distributor_earning = new.delivery_fee * DISTRIBUTOR_SHARE;
        let platform_fee = new.delivery_fee - distributor_earning;
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;

        let assignment = DeliveryAssignment {
            id: Uuid::new_v4(),
            assignment_number: format!("ASN-{seq:08}"),
            order_id: new.order_id,
            distributor_id: distributor.id,
            distributor_name: distributor.name.clone(),
            pickup_location: new.pickup,
            delivery_location: new.delivery,
            distance,
            estimated_delivery_time: distance / matching::AVERAGE_SPEED_KMH,
            customer: new.customer,
            package: new.package,
            delivery_fee: new.delivery_fee,
            distributor_earning,
            platform_fee,
            capacity_epoch: distributor.capacity_epoch,
            status: AssignmentStatus::Assigned,
            assigned_date: Utc::now(),
            accepted_date: None,
            picked_up_date: None,
            in_transit_date: None,
            delivered_date: None,
            failed_date: None,
            cancelled_date: None,
            current_location: None,
            rating: None,
            feedback: None,
            notes: new.notes,
        };

        self.assignments.insert(assignment.id, assignment.clone());

        self.observe_distributor(&distributor);
        self.metrics
            .assignments_total
            .with_label_values(&["created"])
            .inc();
        self.publish(&assignment);

        info!(
            assignment_id = %assignment.id,
            assignment_number = %assignment.assignment_number,
            order_id = %assignment.order_id,
            distributor_id = %distributor.id,
            delivery_fee = assignment.delivery_fee,
            "delivery assigned"
        );

        Ok(assignment)
    }

    /// Moves an assignment to `status`. The status change and the registry
    /// update it implies are applied while the assignment entry is locked; if
    /// the registry update fails the assignment is restored.
    pub fn transition(
        &self,
        id: Uuid,
        status: AssignmentStatus,
        current_location: Option<GeoPoint>,
        deadline: Option<Instant>,
    ) -> Result<DeliveryAssignment, AppError> {
        check_deadline(deadline)?;
        if let Some(point) = &current_location {
            if !point.is_valid() {
                return Err(AppError::BadRequest(
                    "current_location is not a valid coordinate".to_string(),
                ));
            }
        }

        let mut entry = self
            .assignments
            .get_mut(&id)
            .ok_or_else(|| AppError::assignment_not_found(id))?;

        let from = entry.status;
        if !from.can_transition_to(status) {
            debug!(assignment_id = %id, %from, to = %status, "transition rejected");
            return Err(AppError::InvalidTransition { from, to: status });
        }

        let previous = entry.value().clone();
        let now = Utc::now();
        entry.status = status;
        entry.stamp(status, now);
        if let Some(point) = current_location {
            entry.current_location = Some(TrackedPosition {
                lat: point.lat,
                lng: point.lng,
                recorded_at: now,
            });
        }

        let distributor_id = entry.distributor_id;
        let effect = match status {
            AssignmentStatus::Delivered => self.registry.record_outcome(
                distributor_id,
                DeliveryOutcome::Delivered {
                    earning: entry.distributor_earning,
                    elapsed_hours: entry.actual_delivery_hours().unwrap_or(0.0),
                },
            ),
            AssignmentStatus::Failed => self
                .registry
                .record_outcome(distributor_id, DeliveryOutcome::Failed),
            AssignmentStatus::Cancelled => self
                .registry
                .release_capacity(distributor_id, entry.capacity_epoch),
            _ => self.registry.get(distributor_id),
        };

        let distributor = match effect {
            Ok(distributor) => distributor,
            Err(err) => {
                *entry = previous;
                return Err(err);
            }
        };

        let assignment = entry.value().clone();
        drop(entry);

        self.observe_distributor(&distributor);
        self.metrics
            .assignment_transitions_total
            .with_label_values(&[status.as_str()])
            .inc();
        self.publish(&assignment);

        info!(
            assignment_id = %assignment.id,
            assignment_number = %assignment.assignment_number,
            %from,
            to = %status,
            "assignment status updated"
        );

        Ok(assignment)
    }

    /// Records the single allowed rating for an assignment, at any status.
    pub fn rate(
        &self,
        id: Uuid,
        rating: u8,
        feedback: Option<String>,
    ) -> Result<DeliveryAssignment, AppError> {
        validate_rating(rating)?;

        let mut entry = self
            .assignments
            .get_mut(&id)
            .ok_or_else(|| AppError::assignment_not_found(id))?;

        if entry.rating.is_some() {
            return Err(AppError::AlreadyRated(id));
        }

        let distributor = self.registry.record_rating(entry.distributor_id, rating)?;
        entry.rating = Some(rating);
        entry.feedback = feedback;

        let assignment = entry.value().clone();
        drop(entry);

        self.publish(&assignment);
        info!(
            assignment_id = %assignment.id,
            distributor_id = %distributor.id,
            rating,
            average_rating = distributor.average_rating,
            "delivery rated"
        );

        Ok(assignment)
    }

    pub fn get(&self, id: Uuid) -> Result<DeliveryAssignment, AppError> {
        self.assignments
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::assignment_not_found(id))
    }

    /// Assignments bound to `distributor_id`, newest first.
    pub fn list_for_distributor(
        &self,
        distributor_id: Uuid,
    ) -> Result<Vec<DeliveryAssignment>, AppError> {
        if !self.registry.contains(distributor_id) {
            return Err(AppError::distributor_not_found(distributor_id));
        }

        let mut assignments: Vec<DeliveryAssignment> = self
            .assignments
            .iter()
            .filter(|entry| entry.value().distributor_id == distributor_id)
            .map(|entry| entry.value().clone())
            .collect();

        // Numbers are zero-padded, so string order matches creation order.
        assignments.sort_by(|a, b| {
            b.assigned_date
                .cmp(&a.assigned_date)
                .then_with(|| b.assignment_number.cmp(&a.assignment_number))
        });

        Ok(assignments)
    }

    pub fn performance(
        &self,
        distributor_id: Uuid,
        period: PerformancePeriod,
    ) -> Result<DistributorPerformance, AppError> {
        let assignments = self.list_for_distributor(distributor_id)?;
        let distributor = self.registry.get(distributor_id)?;

        Ok(tier::build_performance(
            &distributor,
            &assignments,
            period,
            Utc::now(),
        ))
    }

    /// Matches and assigns in one step. A distributor that fills up between
    /// the match and the reservation is excluded and matching runs again.
    pub fn dispatch(
        &self,
        request: DispatchRequest,
        deadline: Option<Instant>,
    ) -> Result<Dispatched, AppError> {
        let match_request = MatchRequest {
            pickup: request.pickup.clone(),
            delivery: request.delivery.clone(),
            package_value: request.package.value,
            urgency: request.urgency,
        };
        let mut excluded = HashSet::new();

        loop {
            check_deadline(deadline)?;
            let matched = self.find_optimal(&match_request, &excluded)?;

            let new = NewAssignment {
                order_id: request.order_id.clone(),
                distributor_id: matched.distributor.id,
                pickup: request.pickup.clone(),
                delivery: request.delivery.clone(),
                customer: request.customer.clone(),
                package: request.package.clone(),
                delivery_fee: matched.estimated_fee,
                notes: request.notes.clone(),
            };

            match self.create(new, deadline) {
                Ok(assignment) => return Ok(Dispatched { matched, assignment }),
                Err(AppError::InsufficientCapacity(id)) => {
                    debug!(distributor_id = %id, "matched distributor filled up; re-matching");
                    excluded.insert(id);
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn observe_distributor(&self, distributor: &Distributor) {
        self.metrics
            .observe_utilization(&distributor.id.to_string(), distributor.utilization());
    }

    fn publish(&self, assignment: &DeliveryAssignment) {
        // No subscribers is fine.
        let _ = self.events_tx.send(assignment.clone());
    }
}

fn check_deadline(deadline: Option<Instant>) -> Result<(), AppError> {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => Err(AppError::DeadlineExceeded),
        _ => Ok(()),
    }
}

fn validate_new_assignment(new: &NewAssignment) -> Result<(), AppError> {
    if new.order_id.trim().is_empty() {
        return Err(AppError::BadRequest("order_id cannot be empty".to_string()));
    }
    if !new.delivery_fee.is_finite() || new.delivery_fee < 0.0 {
        return Err(AppError::BadRequest("delivery_fee must be >= 0".to_string()));
    }
    if !new.pickup.point().is_valid() {
        return Err(AppError::BadRequest("pickup is not a valid coordinate".to_string()));
    }
    if !new.delivery.point().is_valid() {
        return Err(AppError::BadRequest("delivery is not a valid coordinate".to_string()));
    }
    Ok(())
}

fn outcome_label(err: &AppError) -> &'static str {
    match err {
        AppError::InsufficientCapacity(_) => "insufficient_capacity",
        AppError::NotFound(_) => "not_found",
        _ => "error",
    }
}
