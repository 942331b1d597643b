use chrono::{DateTime, Utc};
use tracing::info;

use crate::models::assignment::{AssignmentStatus, DeliveryAssignment};
use crate::models::distributor::{Distributor, Tier};
use crate::models::performance::{DistributorPerformance, PerformancePeriod};

struct TierThreshold {
    tier: Tier,
    min_deliveries: u64,
    min_success_rate: f64,
    min_rating: f64,
}

// Checked top-down; first match wins.
const THRESHOLDS: [TierThreshold; 3] = [
    TierThreshold {
        tier: Tier::Platinum,
        min_deliveries: 1000,
        min_success_rate: 98.0,
        min_rating: 4.8,
    },
    TierThreshold {
        tier: Tier::Gold,
        min_deliveries: 500,
        min_success_rate: 95.0,
        min_rating: 4.5,
    },
    TierThreshold {
        tier: Tier::Silver,
        min_deliveries: 200,
        min_success_rate: 90.0,
        min_rating: 4.0,
    },
];

pub fn success_rate(successful: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (successful as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

/// Tiers are recomputed from scratch, so a distributor can be demoted.
pub fn evaluate_tier(total_deliveries: u64, success_rate: f64, average_rating: f64) -> Tier {
    THRESHOLDS
        .iter()
        .find(|t| {
            total_deliveries >= t.min_deliveries
                && success_rate >= t.min_success_rate
                && average_rating >= t.min_rating
        })
        .map(|t| t.tier)
        .unwrap_or(Tier::Bronze)
}

/// Recomputes the derived performance fields in place. Must run under the
/// registry's per-distributor lock.
pub fn refresh(distributor: &mut Distributor) {
    distributor.success_rate =
        success_rate(distributor.successful_deliveries, distributor.total_deliveries);

    let previous = distributor.tier;
    distributor.tier = evaluate_tier(
        distributor.total_deliveries,
        distributor.success_rate,
        distributor.average_rating,
    );

    if previous != distributor.tier {
        info!(
            distributor_id = %distributor.id,
            from = %previous,
            to = %distributor.tier,
            "distributor tier changed"
        );
    }
}

pub fn performance_score(success_rate: f64, average_rating: f64, total_deliveries: u64) -> f64 {
    let volume = (total_deliveries as f64 / 100.0).min(1.0);
    let score = success_rate * 0.4 + average_rating * 20.0 * 0.3 + volume * 0.3 * 100.0;
    score.clamp(0.0, 100.0)
}

/// Builds the reporting view for `distributor` from the assignments it owns
/// that were created inside `period` ending at `now`.
pub fn build_performance(
    distributor: &Distributor,
    assignments: &[DeliveryAssignment],
    period: PerformancePeriod,
    now: DateTime<Utc>,
) -> DistributorPerformance {
    let since = now - period.window();
    let in_period: Vec<&DeliveryAssignment> = assignments
        .iter()
        .filter(|a| a.distributor_id == distributor.id && a.assigned_date >= since)
        .collect();

    let delivered: Vec<&DeliveryAssignment> = in_period
        .iter()
        .copied()
        .filter(|a| a.status == AssignmentStatus::Delivered)
        .collect();
    let failed = in_period
        .iter()
        .filter(|a| a.status == AssignmentStatus::Failed)
        .count();

    let on_time = delivered
        .iter()
        .filter(|a| {
            a.actual_delivery_hours()
                .is_some_and(|hours| hours <= a.estimated_delivery_time)
        })
        .count();
    let late = delivered.len() - on_time;
    let on_time_rate = if delivered.is_empty() {
        100.0
    } else {
        on_time as f64 / delivered.len() as f64 * 100.0
    };

    let total_earnings: f64 = delivered.iter().map(|a| a.distributor_earning).sum();
    let average_earning_per_delivery = if delivered.is_empty() {
        0.0
    } else {
        total_earnings / delivered.len() as f64
    };

    DistributorPerformance {
        distributor_id: distributor.id,
        period,
        deliveries: in_period.len(),
        successful_deliveries: delivered.len(),
        failed_deliveries: failed,
        success_rate: distributor.success_rate,
        average_delivery_time: distributor.average_delivery_time,
        on_time_deliveries: on_time,
        late_deliveries: late,
        on_time_rate,
        average_rating: distributor.average_rating,
        total_ratings: distributor.total_ratings,
        total_earnings,
        average_earning_per_delivery,
        score: performance_score(
            distributor.success_rate,
            distributor.average_rating,
            distributor.total_deliveries,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_distributor_has_full_success_rate() {
        assert_eq!(success_rate(0, 0), 100.0);
        assert_eq!(success_rate(9, 10), 90.0);
    }

    #[test]
    fn thousand_strong_deliveries_reach_platinum() {
        let rate = success_rate(990, 1000);
        assert_eq!(evaluate_tier(1000, rate, 4.9), Tier::Platinum);
    }

    #[test]
    fn tiers_are_checked_top_down() {
        assert_eq!(evaluate_tier(1000, 96.0, 4.9), Tier::Gold);
        assert_eq!(evaluate_tier(600, 99.0, 4.2), Tier::Silver);
        assert_eq!(evaluate_tier(199, 100.0, 5.0), Tier::Bronze);
    }

    #[test]
    fn degrading_performance_demotes() {
        assert_eq!(evaluate_tier(500, 95.0, 4.5), Tier::Gold);
        assert_eq!(evaluate_tier(500, 94.9, 4.5), Tier::Silver);
    }

    #[test]
    fn performance_score_is_bounded() {
        assert_eq!(performance_score(100.0, 5.0, 10_000), 100.0);
        assert!((performance_score(100.0, 5.0, 50) - 85.0).abs() < 1e-9);
        assert!(performance_score(0.0, 0.0, 0) >= 0.0);
    }
}
