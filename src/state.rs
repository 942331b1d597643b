use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::engine::lifecycle::AssignmentTracker;
use crate::engine::registry::DistributorRegistry;
use crate::observability::metrics::Metrics;

/// Handle shared by every request. Built once at startup; there is no
/// process-wide instance.
pub struct AppState {
    pub registry: Arc<DistributorRegistry>,
    pub tracker: AssignmentTracker,
    pub metrics: Metrics,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let metrics = Metrics::new();
        let registry = Arc::new(DistributorRegistry::new(config.registry_defaults()));
        let tracker = AssignmentTracker::new(
            registry.clone(),
            metrics.clone(),
            config.event_buffer_size,
        );

        Self {
            registry,
            tracker,
            metrics,
            request_timeout: config.request_timeout(),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        Instant::now().checked_add(self.request_timeout)
    }
}
