use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub match_requests_total: IntCounterVec,
    pub match_latency_seconds: HistogramVec,
    pub assignments_total: IntCounterVec,
    pub assignment_transitions_total: IntCounterVec,
    pub distributor_utilization: GaugeVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let match_requests_total = IntCounterVec::new(
            Opts::new("match_requests_total", "Match requests by outcome"),
            &["outcome"],
        )
        .expect("valid match_requests_total metric");

        let match_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "match_latency_seconds",
                "Latency of distributor matching in seconds",
            ),
            &["outcome"],
        )
        .expect("valid match_latency_seconds metric");

        let assignments_total = IntCounterVec::new(
            Opts::new("assignments_total", "Assignment creation attempts by outcome"),
            &["outcome"],
        )
        .expect("valid assignments_total metric");

        let assignment_transitions_total = IntCounterVec::new(
            Opts::new(
                "assignment_transitions_total",
                "Accepted assignment status transitions by target status",
            ),
            &["status"],
        )
        .expect("valid assignment_transitions_total metric");

        let distributor_utilization = GaugeVec::new(
            Opts::new(
                "distributor_utilization",
                "Share of daily capacity in use [0..1]",
            ),
            &["distributor_id"],
        )
        .expect("valid distributor_utilization metric");

        registry
            .register(Box::new(match_requests_total.clone()))
            .expect("register match_requests_total");
        registry
            .register(Box::new(match_latency_seconds.clone()))
            .expect("register match_latency_seconds");
        registry
            .register(Box::new(assignments_total.clone()))
            .expect("register assignments_total");
        registry
            .register(Box::new(assignment_transitions_total.clone()))
            .expect("register assignment_transitions_total");
        registry
            .register(Box::new(distributor_utilization.clone()))
            .expect("register distributor_utilization");

        Self {
            registry,
            match_requests_total,
            match_latency_seconds,
            assignments_total,
            assignment_transitions_total,
            distributor_utilization,
        }
    }

    pub fn observe_utilization(&self, distributor_id: &str, utilization: f64) {
        self.distributor_utilization
            .with_label_values(&[distributor_id])
            .set(utilization);
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
