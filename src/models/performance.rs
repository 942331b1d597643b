use chrono::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PerformancePeriod {
    Daily,
    Weekly,
    #[default]
    Monthly,
}

impl PerformancePeriod {
    pub fn window(self) -> Duration {
        match self {
            PerformancePeriod::Daily => Duration::days(1),
            PerformancePeriod::Weekly => Duration::days(7),
            PerformancePeriod::Monthly => Duration::days(30),
        }
    }
}

/// Reporting view derived on demand; never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributorPerformance {
    pub distributor_id: Uuid,
    pub period: PerformancePeriod,

    pub deliveries: usize,
    pub successful_deliveries: usize,
    pub failed_deliveries: usize,
    pub success_rate: f64,

    pub average_delivery_time: f64,
    pub on_time_deliveries: usize,
    pub late_deliveries: usize,
    pub on_time_rate: f64,

    pub average_rating: f64,
    pub total_ratings: u64,

    pub total_earnings: f64,
    pub average_earning_per_delivery: f64,

    pub score: f64,
}
