use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use common_metrics::MetricsRegistry;
use serde::Serialize;

pub const GREETINGS_TOTAL: &str = "greetings_total";

#[derive(Clone)]
pub struct GreetState {
    pub greeting: Arc<str>,
    pub served: Arc<AtomicU64>,
    pub metrics: MetricsRegistry,
}

#[derive(Serialize, Debug)]
pub struct Greeting {
    pub message: String,
    pub served: u64,
}

pub async fn greet(State(state): State<GreetState>, Path(name): Path<String>) -> Json<Greeting> {
    let served = state.served.fetch_add(1, Ordering::SeqCst) + 1;
    state.metrics.increment_counter(GREETINGS_TOTAL, &[]);

    Json(Greeting {
        message: format!("{}, {name}!", state.greeting),
        served,
    })
}
