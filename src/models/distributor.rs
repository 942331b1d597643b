use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::location::Location;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DistributorKind {
    Company,
    #[default]
    Individual,
    Partner,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DistributorStatus {
    Active,
    Inactive,
    Busy,
    Offline,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl Tier {
    /// Flat bonus added to the match score.
    pub fn bonus(self) -> f64 {
        match self {
            Tier::Bronze => 0.0,
            Tier::Silver => 2.0,
            Tier::Gold => 5.0,
            Tier::Platinum => 10.0,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Bronze => write!(f, "bronze"),
            Tier::Silver => write!(f, "silver"),
            Tier::Gold => write!(f, "gold"),
            Tier::Platinum => write!(f, "platinum"),
        }
    }
}

/// Authoritative courier record. Only the registry holds a writable copy;
/// everything handed out is a clone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Distributor {
    pub id: Uuid,
    pub name: String,
    pub name_ar: String,
    pub kind: DistributorKind,
    pub phone: String,
    pub email: Option<String>,
    pub status: DistributorStatus,

    pub base_location: Location,
    pub coverage_areas: Vec<String>,
    /// Kilometers from `base_location` within which pickups are accepted.
    pub coverage_radius: f64,

    pub max_daily_orders: u32,
    pub current_daily_orders: u32,
    pub available_capacity: u32,
    /// Bumped by every daily reset; reservations are only releasable in the
    /// epoch they were taken in.
    #[serde(default)]
    pub capacity_epoch: u64,

    pub total_deliveries: u64,
    pub successful_deliveries: u64,
    pub failed_deliveries: u64,
    /// Percentage in `[0, 100]`.
    pub success_rate: f64,
    /// Hours.
    pub average_delivery_time: f64,
    pub average_rating: f64,
    pub total_ratings: u64,

    pub base_fee: f64,
    pub per_km_fee: f64,
    pub total_earnings: f64,
    pub pending_payment: f64,

    pub tier: Tier,
    pub join_date: DateTime<Utc>,
    pub last_active_date: DateTime<Utc>,
}

impl Distributor {
    pub fn is_matchable(&self) -> bool {
        self.status == DistributorStatus::Active && self.available_capacity > 0
    }

    pub fn utilization(&self) -> f64 {
        if self.max_daily_orders == 0 {
            return 1.0;
        }
        self.current_daily_orders as f64 / self.max_daily_orders as f64
    }
}

/// Registration payload. Fee fields fall back to the registry defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributorProfile {
    pub name: String,
    #[serde(default)]
    pub name_ar: String,
    #[serde(default)]
    pub kind: DistributorKind,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    pub base_location: Location,
    #[serde(default)]
    pub coverage_areas: Vec<String>,
    pub coverage_radius: f64,
    pub max_daily_orders: u32,
    #[serde(default)]
    pub base_fee: Option<f64>,
    #[serde(default)]
    pub per_km_fee: Option<f64>,
}
