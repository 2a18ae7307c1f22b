use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub events_total: IntCounterVec,
    pub rejections_total: IntCounterVec,
    pub ingest_latency_seconds: HistogramVec,
    pub active_sessions: IntGauge,
    pub notifications_dropped_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let events_total = IntCounterVec::new(
            Opts::new("tracking_events_total", "Inbound tracking events by kind and outcome"),
            &["kind", "outcome"],
        )
        .expect("valid tracking_events_total metric");

        let rejections_total = IntCounterVec::new(
            Opts::new("tracking_rejections_total", "Rejected inbound events by error kind"),
            &["error"],
        )
        .expect("valid tracking_rejections_total metric");

        let ingest_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "tracking_ingest_latency_seconds",
                "Latency of inbound event processing in seconds",
            ),
            &["kind"],
        )
        .expect("valid tracking_ingest_latency_seconds metric");

        let active_sessions =
            IntGauge::new("tracking_active_sessions", "Currently active tracking sessions")
                .expect("valid tracking_active_sessions metric");

        let notifications_dropped_total = IntCounter::new(
            "tracking_notifications_dropped_total",
            "Notification requests dropped because the queue was full",
        )
        .expect("valid tracking_notifications_dropped_total metric");

        registry
            .register(Box::new(events_total.clone()))
            .expect("register tracking_events_total");
        registry
            .register(Box::new(rejections_total.clone()))
            .expect("register tracking_rejections_total");
        registry
            .register(Box::new(ingest_latency_seconds.clone()))
            .expect("register tracking_ingest_latency_seconds");
        registry
            .register(Box::new(active_sessions.clone()))
            .expect("register tracking_active_sessions");
        registry
            .register(Box::new(notifications_dropped_total.clone()))
            .expect("register tracking_notifications_dropped_total");

        Self {
            registry,
            events_total,
            rejections_total,
            ingest_latency_seconds,
            active_sessions,
            notifications_dropped_total,
        }
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

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
