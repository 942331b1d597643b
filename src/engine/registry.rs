use std::sync::Arc;

use chrono::{NaiveTime, Utc};
use dashmap::DashMap;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::tier;
use crate::error::AppError;
use crate::models::distributor::{Distributor, DistributorProfile, DistributorStatus, Tier};

/// Values applied to distributors registered without an explicit fee schedule.
#[derive(Debug, Clone)]
pub struct RegistryDefaults {
    pub base_fee: f64,
    pub per_km_fee: f64,
    pub average_delivery_hours: f64,
}

impl Default for RegistryDefaults {
    fn default() -> Self {
        Self {
            base_fee: 30.0,
            per_km_fee: 2.0,
            average_delivery_hours: 24.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeliveryOutcome {
    Delivered { earning: f64, elapsed_hours: f64 },
    Failed,
}

/// Owns every distributor record. Each mutation runs while holding the
/// entry's write guard, so all changes to one distributor are linearizable.
pub struct DistributorRegistry {
    distributors: DashMap<Uuid, Distributor>,
    defaults: RegistryDefaults,
}

impl DistributorRegistry {
    pub fn new(defaults: RegistryDefaults) -> Self {
        Self {
            distributors: DashMap::new(),
            defaults,
        }
    }

    pub fn register(&self, profile: DistributorProfile) -> Result<Distributor, AppError> {
        validate_profile(&profile)?;

        let now = Utc::now();
        let distributor = Distributor {
            id: Uuid::new_v4(),
            name: profile.name.trim().to_string(),
            name_ar: profile.name_ar,
            kind: profile.kind,
            phone: profile.phone,
            email: profile.email,
            status: DistributorStatus::Active,
            base_location: profile.base_location,
            coverage_areas: profile.coverage_areas,
            coverage_radius: profile.coverage_radius,
            max_daily_orders: profile.max_daily_orders,
            current_daily_orders: 0,
            available_capacity: profile.max_daily_orders,
            capacity_epoch: 0,
            total_deliveries: 0,
            successful_deliveries: 0,
            failed_deliveries: 0,
            success_rate: 100.0,
            average_delivery_time: self.defaults.average_delivery_hours,
            average_rating: 5.0,
            total_ratings: 0,
            base_fee: profile.base_fee.unwrap_or(self.defaults.base_fee),
            per_km_fee: profile.per_km_fee.unwrap_or(self.defaults.per_km_fee),
            total_earnings: 0.0,
            pending_payment: 0.0,
            tier: Tier::Bronze,
            join_date: now,
            last_active_date: now,
        };

        self.distributors.insert(distributor.id, distributor.clone());
        info!(
            distributor_id = %distributor.id,
            name = %distributor.name,
            max_daily_orders = distributor.max_daily_orders,
            "distributor registered"
        );

        Ok(distributor)
    }

    pub fn get(&self, id: Uuid) -> Result<Distributor, AppError> {
        self.distributors
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::distributor_not_found(id))
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.distributors.contains_key(&id)
    }

    /// All distributors, oldest registration first.
    pub fn list(&self) -> Vec<Distributor> {
        let mut all: Vec<Distributor> = self
            .distributors
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| a.join_date.cmp(&b.join_date).then(a.id.cmp(&b.id)));
        all
    }

    pub fn list_active(&self) -> Vec<Distributor> {
        self.list()
            .into_iter()
            .filter(|d| d.status == DistributorStatus::Active)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.distributors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distributors.is_empty()
    }

    pub fn reserve_capacity(&self, id: Uuid) -> Result<Distributor, AppError> {
        self.mutate(id, |d| {
            if d.available_capacity == 0 {
                return Err(AppError::InsufficientCapacity(d.id));
            }
            d.current_daily_orders += 1;
            d.available_capacity -= 1;
            Ok(())
        })
    }

    /// Gives back a slot taken in `epoch`. A slot from before the last daily
    /// reset is already accounted for by the reset and is not returned again.
    pub fn release_capacity(&self, id: Uuid, epoch: u64) -> Result<Distributor, AppError> {
        self.mutate(id, |d| {
            if d.capacity_epoch != epoch {
                warn!(
                    distributor_id = %d.id,
                    reserved_in = epoch,
                    current = d.capacity_epoch,
                    "release of slot from a previous day ignored"
                );
                return Ok(());
            }
            if d.current_daily_orders == 0 {
                warn!(distributor_id = %d.id, "release on empty daily counter ignored");
                return Ok(());
            }
            d.current_daily_orders -= 1;
            d.available_capacity += 1;
            Ok(())
        })
    }

    pub fn record_outcome(&self, id: Uuid, outcome: DeliveryOutcome) -> Result<Distributor, AppError> {
        self.mutate(id, |d| {
            d.total_deliveries += 1;
            match outcome {
                DeliveryOutcome::Delivered {
                    earning,
                    elapsed_hours,
                } => {
                    d.successful_deliveries += 1;
                    let n = d.successful_deliveries as f64;
                    d.average_delivery_time = if d.successful_deliveries == 1 {
                        elapsed_hours
                    } else {
                        (d.average_delivery_time * (n - 1.0) + elapsed_hours) / n
                    };
                    d.total_earnings += earning;
                    d.pending_payment += earning;
                }
                DeliveryOutcome::Failed => {
                    d.failed_deliveries += 1;
                }
            }
            tier::refresh(d);
            Ok(())
        })
    }

    pub fn record_rating(&self, id: Uuid, rating: u8) -> Result<Distributor, AppError> {
        validate_rating(rating)?;

        self.mutate(id, |d| {
            let total_points = d.average_rating * d.total_ratings as f64;
            d.total_ratings += 1;
            d.average_rating = (total_points + rating as f64) / d.total_ratings as f64;
            tier::refresh(d);
            Ok(())
        })
    }

    pub fn set_status(&self, id: Uuid, status: DistributorStatus) -> Result<Distributor, AppError> {
        self.mutate(id, |d| {
            d.status = status;
            Ok(())
        })
    }

    /// Starts a new day: every distributor gets its full daily capacity back
    /// and moves to a fresh capacity epoch.
    pub fn reset_daily_orders(&self) -> usize {
        let now = Utc::now();
        let mut reset = 0;

        for mut entry in self.distributors.iter_mut() {
            let d = entry.value_mut();
            d.capacity_epoch += 1;
            if d.current_daily_orders > 0 {
                d.current_daily_orders = 0;
                d.available_capacity = d.max_daily_orders;
                d.last_active_date = now;
                reset += 1;
            }
        }

        info!(distributors = reset, "daily order counters reset");
        reset
    }

    #[cfg(test)]
    pub(crate) fn remove(&self, id: Uuid) -> Option<Distributor> {
        self.distributors.remove(&id).map(|(_, d)| d)
    }

    /// Applies `f` to a copy of the record under the entry's write guard and
    /// commits it only when `f` succeeds and the capacity invariant holds.
    fn mutate<F>(&self, id: Uuid, f: F) -> Result<Distributor, AppError>
    where
        F: FnOnce(&mut Distributor) -> Result<(), AppError>,
    {
        let mut entry = self
            .distributors
            .get_mut(&id)
            .ok_or_else(|| AppError::distributor_not_found(id))?;

        let mut next = entry.value().clone();
        f(&mut next)?;
        check_capacity_invariant(&next)?;
        next.last_active_date = Utc::now();

        *entry = next.clone();
        Ok(next)
    }
}

fn check_capacity_invariant(d: &Distributor) -> Result<(), AppError> {
    let holds = d.current_daily_orders <= d.max_daily_orders
        && d.available_capacity == d.max_daily_orders - d.current_daily_orders;

    debug_assert!(holds, "capacity invariant violated for distributor {}", d.id);

    if !holds {
        error!(
            distributor_id = %d.id,
            max_daily_orders = d.max_daily_orders,
            current_daily_orders = d.current_daily_orders,
            available_capacity = d.available_capacity,
            "capacity invariant violated; mutation rejected"
        );
        return Err(AppError::Internal(format!(
            "capacity invariant violated for distributor {}",
            d.id
        )));
    }

    Ok(())
}

fn validate_profile(profile: &DistributorProfile) -> Result<(), AppError> {
    if profile.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }
    if profile.max_daily_orders == 0 {
        return Err(AppError::BadRequest("max_daily_orders must be > 0".to_string()));
    }
    if !profile.coverage_radius.is_finite() || profile.coverage_radius < 0.0 {
        return Err(AppError::BadRequest(
            "coverage_radius must be a non-negative number".to_string(),
        ));
    }
    if !profile.base_location.point().is_valid() {
        return Err(AppError::BadRequest("base_location is not a valid coordinate".to_string()));
    }
    for (field, fee) in [("base_fee", profile.base_fee), ("per_km_fee", profile.per_km_fee)] {
        if let Some(fee) = fee {
            if !fee.is_finite() || fee < 0.0 {
                return Err(AppError::BadRequest(format!("{field} must be >= 0")));
            }
        }
    }
    Ok(())
}

pub fn validate_rating(rating: u8) -> Result<(), AppError> {
    if !(1..=5).contains(&rating) {
        return Err(AppError::BadRequest("rating must be between 1 and 5".to_string()));
    }
    Ok(())
}

/// Resets daily counters at every UTC midnight until the process exits.
pub async fn run_daily_rollover(registry: Arc<DistributorRegistry>) {
    info!("daily rollover scheduler started");

    loop {
        let now = Utc::now();
        let wait = now
            .date_naive()
            .succ_opt()
            .map(|tomorrow| tomorrow.and_time(NaiveTime::MIN).and_utc() - now)
            .and_then(|delta| delta.to_std().ok())
            .unwrap_or(Duration::from_secs(60));

        sleep(wait).await;
        registry.reset_daily_orders();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::distributor::DistributorKind;
    use crate::models::location::Location;

    fn profile(max_daily_orders: u32) -> DistributorProfile {
        DistributorProfile {
            name: "Nile Express".to_string(),
            name_ar: "نايل إكسبريس".to_string(),
            kind: DistributorKind::Company,
            phone: "+20100000000".to_string(),
            email: None,
            base_location: Location {
                lat: 30.0,
                lng: 31.0,
                address: "Downtown".to_string(),
                address_ar: String::new(),
            },
            coverage_areas: vec!["Cairo".to_string()],
            coverage_radius: 10.0,
            max_daily_orders,
            base_fee: None,
            per_km_fee: None,
        }
    }

    #[test]
    fn register_applies_neutral_defaults() {
        let registry = DistributorRegistry::new(RegistryDefaults::default());
        let d = registry.register(profile(5)).unwrap();

        assert_eq!(d.status, DistributorStatus::Active);
        assert_eq!(d.available_capacity, 5);
        assert_eq!(d.current_daily_orders, 0);
        assert_eq!(d.success_rate, 100.0);
        assert_eq!(d.average_rating, 5.0);
        assert_eq!(d.tier, Tier::Bronze);
        assert_eq!(d.base_fee, 30.0);
        assert_eq!(d.per_km_fee, 2.0);
    }

    #[test]
    fn register_rejects_zero_capacity() {
        let registry = DistributorRegistry::new(RegistryDefaults::default());
        let err = registry.register(profile(0)).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn reserve_stops_at_zero() {
        let registry = DistributorRegistry::new(RegistryDefaults::default());
        let d = registry.register(profile(2)).unwrap();

        registry.reserve_capacity(d.id).unwrap();
        let after = registry.reserve_capacity(d.id).unwrap();
        assert_eq!(after.available_capacity, 0);
        assert_eq!(after.current_daily_orders, 2);

        let err = registry.reserve_capacity(d.id).unwrap_err();
        assert!(matches!(err, AppError::InsufficientCapacity(id) if id == d.id));
        assert_eq!(registry.get(d.id).unwrap().available_capacity, 0);
    }

    #[test]
    fn release_never_exceeds_max() {
        let registry = DistributorRegistry::new(RegistryDefaults::default());
        let d = registry.register(profile(1)).unwrap();

        let released = registry.release_capacity(d.id, d.capacity_epoch).unwrap();
        assert_eq!(released.available_capacity, 1);

        let reserved = registry.reserve_capacity(d.id).unwrap();
        let released = registry.release_capacity(d.id, reserved.capacity_epoch).unwrap();
        assert_eq!(released.available_capacity, 1);
        assert_eq!(released.current_daily_orders, 0);
    }

    #[test]
    fn unknown_distributor_is_not_found() {
        let registry = DistributorRegistry::new(RegistryDefaults::default());
        let err = registry.reserve_capacity(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn outcomes_update_success_rate() {
        let registry = DistributorRegistry::new(RegistryDefaults::default());
        let d = registry.register(profile(5)).unwrap();

        registry
            .record_outcome(
                d.id,
                DeliveryOutcome::Delivered {
                    earning: 40.0,
                    elapsed_hours: 2.0,
                },
            )
            .unwrap();
        let after = registry.record_outcome(d.id, DeliveryOutcome::Failed).unwrap();

        assert_eq!(after.total_deliveries, 2);
        assert_eq!(after.successful_deliveries, 1);
        assert_eq!(after.failed_deliveries, 1);
        assert_eq!(after.success_rate, 50.0);
        assert_eq!(after.average_delivery_time, 2.0);
        assert_eq!(after.pending_payment, 40.0);
        assert_eq!(after.total_earnings, 40.0);
    }

    #[test]
    fn rating_uses_running_average() {
        let registry = DistributorRegistry::new(RegistryDefaults::default());
        let d = registry.register(profile(5)).unwrap();

        registry.record_rating(d.id, 4).unwrap();
        let after = registry.record_rating(d.id, 3).unwrap();

        assert_eq!(after.total_ratings, 2);
        assert!((after.average_rating - 3.5).abs() < 1e-9);
    }

    #[test]
    fn rating_out_of_range_is_rejected() {
        let registry = DistributorRegistry::new(RegistryDefaults::default());
        let d = registry.register(profile(5)).unwrap();

        assert!(matches!(registry.record_rating(d.id, 0), Err(AppError::BadRequest(_))));
        assert!(matches!(registry.record_rating(d.id, 6), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn reset_restores_full_capacity() {
        let registry = DistributorRegistry::new(RegistryDefaults::default());
        let d = registry.register(profile(3)).unwrap();
        registry.reserve_capacity(d.id).unwrap();
        registry.reserve_capacity(d.id).unwrap();

        assert_eq!(registry.reset_daily_orders(), 1);
        let after = registry.get(d.id).unwrap();
        assert_eq!(after.available_capacity, 3);
        assert_eq!(after.capacity_epoch, d.capacity_epoch + 1);
    }

    #[test]
    fn release_from_previous_epoch_is_ignored() {
        let registry = DistributorRegistry::new(RegistryDefaults::default());
        let d = registry.register(profile(2)).unwrap();
        let yesterday = registry.reserve_capacity(d.id).unwrap().capacity_epoch;

        registry.reset_daily_orders();
        registry.reserve_capacity(d.id).unwrap();

        let after = registry.release_capacity(d.id, yesterday).unwrap();
        assert_eq!(after.current_daily_orders, 1);
        assert_eq!(after.available_capacity, 1);
    }

    #[test]
    fn inactive_distributors_are_not_listed_active() {
        let registry = DistributorRegistry::new(RegistryDefaults::default());
        let a = registry.register(profile(3)).unwrap();
        let b = registry.register(profile(3)).unwrap();
        registry.set_status(b.id, DistributorStatus::Offline).unwrap();

        let active: Vec<Uuid> = registry.list_active().iter().map(|d| d.id).collect();
        assert_eq!(active, vec![a.id]);
        assert_eq!(registry.list().len(), 2);
    }
}
