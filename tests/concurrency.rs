use std::sync::Arc;

use distributor_engine::config::Config;
use distributor_engine::engine::lifecycle::DispatchRequest;
use distributor_engine::engine::matching::Urgency;
use distributor_engine::error::AppError;
use distributor_engine::models::assignment::{CustomerInfo, NewAssignment, PackageInfo};
use distributor_engine::models::distributor::{DistributorKind, DistributorProfile};
use distributor_engine::models::location::Location;
use distributor_engine::state::AppState;
use uuid::Uuid;

fn location(lat: f64, lng: f64) -> Location {
    Location {
        lat,
        lng,
        address: String::new(),
        address_ar: String::new(),
    }
}

fn register(state: &AppState, max_daily_orders: u32) -> Uuid {
    register_at(state, max_daily_orders, location(30.0, 31.0))
}

fn register_at(state: &AppState, max_daily_orders: u32, base_location: Location) -> Uuid {
    state
        .registry
        .register(DistributorProfile {
            name: "Contended".to_string(),
            name_ar: String::new(),
            kind: DistributorKind::Individual,
            phone: "+20100000002".to_string(),
            email: None,
            base_location,
            coverage_areas: Vec::new(),
            coverage_radius: 15.0,
            max_daily_orders,
            base_fee: None,
            per_km_fee: None,
        })
        .unwrap()
        .id
}

fn new_assignment(distributor_id: Uuid, n: usize) -> NewAssignment {
    NewAssignment {
        order_id: format!("ORD-{n}"),
        distributor_id,
        pickup: location(30.01, 31.0),
        delivery: location(30.02, 31.01),
        customer: CustomerInfo::default(),
        package: PackageInfo::default(),
        delivery_fee: 35.0,
        notes: None,
    }
}

async fn race(n: usize, k: u32) -> (usize, usize, Arc<AppState>, Uuid) {
    let state = Arc::new(AppState::new(&Config::default()));
    let distributor_id = register(&state, k);

    let mut handles = Vec::new();
    for i in 0..n {
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            state.tracker.create(new_assignment(distributor_id, i), None)
        }));
    }

    let mut ok = 0;
    let mut full = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(AppError::InsufficientCapacity(id)) => {
                assert_eq!(id, distributor_id);
                full += 1;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    (ok, full, state, distributor_id)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_assignments_never_overbook() {
    let (n, k) = (64, 10);
    let (ok, full, state, id) = race(n, k).await;

    assert_eq!(ok, 10);
    assert_eq!(full, 54);

    let distributor = state.registry.get(id).unwrap();
    assert_eq!(distributor.available_capacity, 0);
    assert_eq!(distributor.current_daily_orders, k);
    assert_eq!(state.tracker.len(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_assignments_below_capacity_all_succeed() {
    let (n, k) = (12, 20);
    let (ok, full, state, id) = race(n, k).await;

    assert_eq!(ok, n);
    assert_eq!(full, 0);
    assert_eq!(state.registry.get(id).unwrap().available_capacity, k - n as u32);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_reserve_and_release_stay_in_bounds() {
    let state = Arc::new(AppState::new(&Config::default()));
    let id = register(&state, 5);

    let mut handles = Vec::new();
    for i in 0..200 {
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                let _ = state.registry.reserve_capacity(id);
            } else {
                let _ = state.registry.release_capacity(id, 0);
            }
            let d = state.registry.get(id).unwrap();
            assert!(d.available_capacity <= d.max_daily_orders);
            assert_eq!(d.available_capacity + d.current_daily_orders, d.max_daily_orders);
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }
}

fn dispatch_request(n: usize) -> DispatchRequest {
    DispatchRequest {
        order_id: format!("ORD-D{n}"),
        pickup: location(30.01, 31.0),
        delivery: location(30.02, 31.01),
        customer: CustomerInfo::default(),
        package: PackageInfo::default(),
        urgency: Urgency::Standard,
        notes: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_dispatch_fills_every_distributor_then_reports_no_candidate() {
    let state = Arc::new(AppState::new(&Config::default()));
    let near = register_at(&state, 3, location(30.009, 31.0));
    let far = register_at(&state, 4, location(30.0, 31.0));

    let mut handles = Vec::new();
    for i in 0..48 {
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            state.tracker.dispatch(dispatch_request(i), None)
        }));
    }

    let mut assigned = Vec::new();
    let mut no_candidate = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(dispatched) => {
                assert_eq!(dispatched.matched.distributor.id, dispatched.assignment.distributor_id);
                assigned.push(dispatched.assignment.distributor_id);
            }
            Err(AppError::NoCandidate) => no_candidate += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(assigned.len(), 7);
    assert_eq!(no_candidate, 41);
    assert_eq!(assigned.iter().filter(|id| **id == near).count(), 3);
    assert_eq!(assigned.iter().filter(|id| **id == far).count(), 4);

    for id in [near, far] {
        let distributor = state.registry.get(id).unwrap();
        assert_eq!(distributor.available_capacity, 0);
        assert_eq!(distributor.current_daily_orders, distributor.max_daily_orders);
    }
    assert_eq!(state.tracker.len(), 7);
}
