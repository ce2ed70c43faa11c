//! Metrics collection and export module

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use std::time::Instant;

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Workflow counters
    pub workflows_started: IntCounter,
    pub workflows_succeeded: IntCounter,
    pub workflows_failed: IntCounter,
    pub submissions_rejected: IntCounter,
    pub submissions_unknown: IntCounter,
    pub confirmation_timeouts: IntCounter,
    pub observability_timeouts: IntCounter,
    pub pool_exhausted: IntCounter,

    /// Confirmation and observability polls sent
    pub poll_attempts: IntCounter,

    // Gauges
    pub pool_allocated: IntGauge,
    pub pool_in_flight: IntGauge,

    // Histograms
    pub rpc_latency: Histogram,
    pub workflow_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let workflows_started = IntCounter::with_opts(Opts::new(
            "swap_workflows_started_total",
            "Number of swap workflow runs started",
        ))?;

        let workflows_succeeded = IntCounter::with_opts(Opts::new(
            "swap_workflows_succeeded_total",
            "Number of swap workflow runs that reached Recorded",
        ))?;

        let workflows_failed = IntCounter::with_opts(Opts::new(
            "swap_workflows_failed_total",
            "Number of swap workflow runs that ended in Failed",
        ))?;

        let submissions_rejected = IntCounter::with_opts(Opts::new(
            "swap_submissions_rejected_total",
            "Transactions the ledger refused at submission",
        ))?;

        let submissions_unknown = IntCounter::with_opts(Opts::new(
            "swap_submissions_unknown_total",
            "Submissions that failed in transit and may still land",
        ))?;

        let confirmation_timeouts = IntCounter::with_opts(Opts::new(
            "swap_confirmation_timeouts_total",
            "Signatures that never reached the requested commitment",
        ))?;

        let observability_timeouts = IntCounter::with_opts(Opts::new(
            "swap_observability_timeouts_total",
            "Confirmed writes whose account never became readable",
        ))?;

        let pool_exhausted = IntCounter::with_opts(Opts::new(
            "swap_pool_exhausted_total",
            "Runs refused because the identifier pool was full",
        ))?;

        let poll_attempts = IntCounter::with_opts(Opts::new(
            "swap_poll_attempts_total",
            "Confirmation and account polls sent",
        ))?;

        let pool_allocated = IntGauge::with_opts(Opts::new(
            "id_pool_allocated",
            "Identifiers durably allocated",
        ))?;

        let pool_in_flight = IntGauge::with_opts(Opts::new(
            "id_pool_in_flight",
            "Identifiers reserved by running workflows",
        ))?;

        let rpc_latency = Histogram::with_opts(
            HistogramOpts::new("rpc_latency_seconds", "RPC call latency")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;

        let workflow_latency = Histogram::with_opts(
            HistogramOpts::new("swap_workflow_latency_seconds", "End-to-end workflow run time")
                .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 40.0, 80.0]),
        )?;

        // Register all metrics
        registry.register(Box::new(workflows_started.clone()))?;
        registry.register(Box::new(workflows_succeeded.clone()))?;
        registry.register(Box::new(workflows_failed.clone()))?;
        registry.register(Box::new(submissions_rejected.clone()))?;
        registry.register(Box::new(submissions_unknown.clone()))?;
        registry.register(Box::new(confirmation_timeouts.clone()))?;
        registry.register(Box::new(observability_timeouts.clone()))?;
        registry.register(Box::new(pool_exhausted.clone()))?;
        registry.register(Box::new(poll_attempts.clone()))?;
        registry.register(Box::new(pool_allocated.clone()))?;
        registry.register(Box::new(pool_in_flight.clone()))?;
        registry.register(Box::new(rpc_latency.clone()))?;
        registry.register(Box::new(workflow_latency.clone()))?;

        Ok(Self {
            registry,
            workflows_started,
            workflows_succeeded,
            workflows_failed,
            submissions_rejected,
            submissions_unknown,
            confirmation_timeouts,
            observability_timeouts,
            pool_exhausted,
            poll_attempts,
            pool_allocated,
            pool_in_flight,
            rpc_latency,
            workflow_latency,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render every registered metric in the Prometheus text format
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.elapsed_secs());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
