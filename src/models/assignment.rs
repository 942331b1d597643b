use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::location::{Location, TrackedPosition};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Assigned,
    Accepted,
    PickedUp,
    InTransit,
    Delivered,
    Failed,
    Cancelled,
}

impl AssignmentStatus {
    pub const ALL: [AssignmentStatus; 7] = [
        AssignmentStatus::Assigned,
        AssignmentStatus::Accepted,
        AssignmentStatus::PickedUp,
        AssignmentStatus::InTransit,
        AssignmentStatus::Delivered,
        AssignmentStatus::Failed,
        AssignmentStatus::Cancelled,
    ];

    pub fn can_transition_to(&self, target: AssignmentStatus) -> bool {
        use AssignmentStatus::*;

        matches!(
            (self, target),
            (Assigned, Accepted)
                | (Assigned, Cancelled)
                | (Accepted, PickedUp)
                | (Accepted, Cancelled)
                | (PickedUp, InTransit)
                | (PickedUp, Failed)
                | (PickedUp, Cancelled)
                | (InTransit, Delivered)
                | (InTransit, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AssignmentStatus::Delivered | AssignmentStatus::Failed | AssignmentStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Assigned => "assigned",
            AssignmentStatus::Accepted => "accepted",
            AssignmentStatus::PickedUp => "picked_up",
            AssignmentStatus::InTransit => "in_transit",
            AssignmentStatus::Delivered => "delivered",
            AssignmentStatus::Failed => "failed",
            AssignmentStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub name: String,
    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageInfo {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub description_ar: String,
    #[serde(default)]
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAssignment {
    pub id: Uuid,
    pub assignment_number: String,
    /// Reference into the order-management system; opaque here.
    pub order_id: String,
    pub distributor_id: Uuid,
    pub distributor_name: String,

    pub pickup_location: Location,
    pub delivery_location: Location,
    /// Kilometers, pickup to delivery.
    pub distance: f64,
    /// Hours.
    pub estimated_delivery_time: f64,

    pub customer: CustomerInfo,
    pub package: PackageInfo,

    pub delivery_fee: f64,
    pub distributor_earning: f64,
    pub platform_fee: f64,
    /// Distributor capacity epoch the slot was reserved in.
    #[serde(default)]
    pub capacity_epoch: u64,

    pub status: AssignmentStatus,
    pub assigned_date: DateTime<Utc>,
    pub accepted_date: Option<DateTime<Utc>>,
    pub picked_up_date: Option<DateTime<Utc>>,
    pub in_transit_date: Option<DateTime<Utc>>,
    pub delivered_date: Option<DateTime<Utc>>,
    pub failed_date: Option<DateTime<Utc>>,
    pub cancelled_date: Option<DateTime<Utc>>,

    pub current_location: Option<TrackedPosition>,

    pub rating: Option<u8>,
    pub feedback: Option<String>,
    pub notes: Option<String>,
}

impl DeliveryAssignment {
    pub(crate) fn stamp(&mut self, status: AssignmentStatus, at: DateTime<Utc>) {
        let slot = match status {
            AssignmentStatus::Assigned => {
                self.assigned_date = at;
                return;
            }
            AssignmentStatus::Accepted => &mut self.accepted_date,
            AssignmentStatus::PickedUp => &mut self.picked_up_date,
            AssignmentStatus::InTransit => &mut self.in_transit_date,
            AssignmentStatus::Delivered => &mut self.delivered_date,
            AssignmentStatus::Failed => &mut self.failed_date,
            AssignmentStatus::Cancelled => &mut self.cancelled_date,
        };
        *slot = Some(at);
    }

    /// Hours between assignment and delivery, if delivered.
    pub fn actual_delivery_hours(&self) -> Option<f64> {
        self.delivered_date
            .map(|done| (done - self.assigned_date).num_milliseconds().max(0) as f64 / 3_600_000.0)
    }
}

/// Input to the lifecycle tracker's `create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAssignment {
    pub order_id: String,
    pub distributor_id: Uuid,
    pub pickup: Location,
    pub delivery: Location,
    #[serde(default)]
    pub customer: CustomerInfo,
    #[serde(default)]
    pub package: PackageInfo,
    pub delivery_fee: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::AssignmentStatus;
    use super::AssignmentStatus::*;

    #[test]
    fn happy_path_is_legal() {
        assert!(Assigned.can_transition_to(Accepted));
        assert!(Accepted.can_transition_to(PickedUp));
        assert!(PickedUp.can_transition_to(InTransit));
        assert!(InTransit.can_transition_to(Delivered));
    }

    #[test]
    fn in_transit_cannot_be_cancelled() {
        assert!(!InTransit.can_transition_to(Cancelled));
        assert!(InTransit.can_transition_to(Failed));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for from in AssignmentStatus::ALL.iter().filter(|s| s.is_terminal()) {
            for to in AssignmentStatus::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn skipping_steps_is_rejected() {
        assert!(!Assigned.can_transition_to(PickedUp));
        assert!(!Assigned.can_transition_to(Delivered));
        assert!(!Accepted.can_transition_to(InTransit));
    }
}
