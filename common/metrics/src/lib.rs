//! Per-service HTTP metrics: a Prometheus-backed registry and the axum middleware
//! that records one observation per request.
//!
//! The registry is never installed as the global recorder. Each service owns its
//! own instance, so several services (or tests) in one process do not share counters.

mod config;
mod error;
mod middleware;
mod registry;

pub use config::{Buckets, MetricsConfig};
pub use error::{ExportError, MetricsError};
pub use middleware::{track_metrics, track_requests, CLIENT_CLOSED_REQUEST, UNKNOWN_ROUTE};
pub use metrics::{NoopRecorder, Recorder};
pub use registry::{MetricsExporter, MetricsRegistry, PrometheusExporter, RequestLabelSet};
