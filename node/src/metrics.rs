//! # Prometheus Metrics
//!
//! Operational metrics for the hub node, scraped at `/metrics` on the
//! configured metrics port. Everything is registered in a dedicated
//! [`prometheus::Registry`] under the `relayhub` prefix.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};

/// Metric handles shared by request handlers.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Raw transactions submitted through `hub_sendRawTransaction`.
    pub transactions_submitted_total: IntCounter,
    /// Submitted transactions the hub refused.
    pub operations_rejected_total: IntCounter,
    /// Successful penalizations.
    pub penalizations_total: IntCounter,
    /// Relays currently in the `Registered` state.
    pub registered_relays: IntGauge,
    /// Time spent executing a submitted transaction, in seconds.
    pub transaction_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Create and register all metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("relayhub".into()), None)?;

        let transactions_submitted_total = IntCounter::new(
            "transactions_submitted_total",
            "Raw transactions submitted to the hub",
        )?;
        registry.register(Box::new(transactions_submitted_total.clone()))?;

        let operations_rejected_total = IntCounter::new(
            "operations_rejected_total",
            "Submitted transactions rejected by the hub",
        )?;
        registry.register(Box::new(operations_rejected_total.clone()))?;

        let penalizations_total =
            IntCounter::new("penalizations_total", "Relays successfully penalized")?;
        registry.register(Box::new(penalizations_total.clone()))?;

        let registered_relays =
            IntGauge::new("registered_relays", "Relays in the Registered state")?;
        registry.register(Box::new(registered_relays.clone()))?;

        let transaction_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "transaction_latency_seconds",
                "Hub execution time of a submitted transaction in seconds",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 1.0]),
        )?;
        registry.register(Box::new(transaction_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            transactions_submitted_total,
            operations_rejected_total,
            penalizations_total,
            registered_relays,
            transaction_latency_seconds,
        })
    }

    /// Render all metrics in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// `GET /metrics`
pub async fn metrics_handler(State(metrics): State<SharedMetrics>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
