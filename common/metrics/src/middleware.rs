use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::{self, Next},
    response::Response,
    Router,
};
use tower_http::catch_panic::CatchPanicLayer;

use crate::registry::{MetricsRegistry, RequestLabelSet};

/// Route label for requests that did not match any registered route.
pub const UNKNOWN_ROUTE: &str = "unknown_route";

/// Status recorded when the request future is dropped before a response exists,
/// e.g. the client went away mid-request.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Wrap every route of `router` with request metrics, should be called last.
///
/// Panicking handlers are turned into 500 responses before they reach the
/// metrics layer, so they are counted as errors instead of tearing down the
/// connection unrecorded.
pub fn track_requests(router: Router, registry: MetricsRegistry) -> Router {
    router
        .layer(CatchPanicLayer::new())
        .layer(middleware::from_fn_with_state(registry, track_metrics))
}

/// Middleware recording request count, error count and latency for each request.
pub async fn track_metrics(
    State(registry): State<MetricsRegistry>,
    req: Request,
    next: Next,
) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|matched_path| matched_path.as_str().to_owned())
        .unwrap_or_else(|| UNKNOWN_ROUTE.to_owned());
    let observation = RequestObservation::start(registry, req.method().to_string(), route);

    let response = next.run(req).await;

    observation.finish(response.status().as_u16());
    response
}

/// Records exactly one observation when dropped, whether or not the request
/// reached a response.
struct RequestObservation {
    registry: MetricsRegistry,
    method: String,
    route: String,
    start: Instant,
    status: Option<u16>,
}

impl RequestObservation {
    fn start(registry: MetricsRegistry, method: String, route: String) -> Self {
        Self {
            registry,
            method,
            route,
            start: Instant::now(),
            status: None,
        }
    }

    fn finish(mut self, status: u16) {
        self.status = Some(status);
    }
}

impl Drop for RequestObservation {
    fn drop(&mut self) {
        let labels = RequestLabelSet {
            method: std::mem::take(&mut self.method),
            route: std::mem::take(&mut self.route),
            status: self.status.unwrap_or(CLIENT_CLOSED_REQUEST),
        };
        self.registry.record_request(labels, self.start.elapsed());
    }
}
