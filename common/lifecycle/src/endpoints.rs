//! Version, liveness, readiness and metrics probes.
//!
//! Each handler only reads the lifecycle state and the metrics registry; they hold
//! no state of their own.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use common_metrics::MetricsRegistry;

use crate::config::BuildInfo;
use crate::state::StateHandle;

const OK: &str = "OK";
const NOT_OK: &str = "not OK";
const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

#[derive(Clone)]
pub struct EndpointState {
    pub state: StateHandle,
    pub metrics: MetricsRegistry,
    pub build: BuildInfo,
}

pub fn router(endpoints: EndpointState) -> Router {
    Router::new()
        .route("/", get(version))
        .route("/health", get(liveness))
        .route("/ready", get(readiness))
        .route("/metrics", get(metrics))
        .with_state(endpoints)
}

pub async fn version(State(endpoints): State<EndpointState>) -> Json<BuildInfo> {
    Json(endpoints.build)
}

/// The process answered, so it is alive. Independent of readiness.
pub async fn liveness() -> (StatusCode, &'static str) {
    (StatusCode::OK, OK)
}

pub async fn readiness(State(endpoints): State<EndpointState>) -> (StatusCode, &'static str) {
    if endpoints.state.get().is_ready() {
        (StatusCode::OK, OK)
    } else {
        not_ok()
    }
}

/// Metrics are only trusted while ready.
pub async fn metrics(State(endpoints): State<EndpointState>) -> Response {
    let state = endpoints.state.get();
    if !state.is_ready() {
        return not_ok().into_response();
    }

    match endpoints.metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(_) => not_ok().into_response(),
    }
}

fn not_ok() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, NOT_OK)
}
