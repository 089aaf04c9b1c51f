//! Metrics module for Prometheus
//!
//! This module provides metrics collection for the gateway service:
//! - Request count by dispatch decision
//! - Forwarded request count by upstream status
//! - Upstream latency histogram

use prometheus::{CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Gateway metrics collector
#[derive(Clone)]
pub struct GatewayMetrics {
    registry: Registry,
    request_counter: CounterVec,
    upstream_counter: CounterVec,
    upstream_latency: Histogram,
    // Plain counters for the diagnostics endpoint
    total_requests: Arc<AtomicU64>,
    total_rejections: Arc<AtomicU64>,
}

impl GatewayMetrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        let registry = Registry::new();

        let request_counter = CounterVec::new(
            Opts::new("gateway_requests_total", "Total number of requests by verdict"),
            &["verdict"],
        )
        .expect("Failed to create request counter");

        let upstream_counter = CounterVec::new(
            Opts::new(
                "gateway_upstream_requests_total",
                "Total number of forwarded requests by upstream status",
            ),
            &["status"],
        )
        .expect("Failed to create upstream counter");

        let upstream_latency = Histogram::with_opts(
            HistogramOpts::new(
                "gateway_upstream_latency_seconds",
                "Upstream latency in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]),
        )
        .expect("Failed to create latency histogram");

        registry
            .register(Box::new(request_counter.clone()))
            .expect("Failed to register request counter");
        registry
            .register(Box::new(upstream_counter.clone()))
            .expect("Failed to register upstream counter");
        registry
            .register(Box::new(upstream_latency.clone()))
            .expect("Failed to register latency histogram");

        Self {
            registry,
            request_counter,
            upstream_counter,
            upstream_latency,
            total_requests: Arc::new(AtomicU64::new(0)),
            total_rejections: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record one dispatch decision (see `Dispatch::label`)
    pub fn record_verdict(&self, verdict: &str) {
        self.request_counter.with_label_values(&[verdict]).inc();

        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if verdict == "rejected" {
            self.total_rejections.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record the outcome of a forwarded request
    pub fn record_upstream(&self, status: u16, latency: Duration) {
        let status = status.to_string();
        self.upstream_counter
            .with_label_values(&[status.as_str()])
            .inc();
        self.upstream_latency.observe(latency.as_secs_f64());
    }

    /// Get the Prometheus metrics output
    pub fn prometheus_output(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Get total request count
    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Get total rejection count
    pub fn total_rejections(&self) -> u64 {
        self.total_rejections.load(Ordering::Relaxed)
    }

    /// Get rejection rate (percentage)
    pub fn rejection_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            (self.total_rejections() as f64 / total as f64) * 100.0
        }
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}
