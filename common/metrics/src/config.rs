use std::ops::Deref;
use std::str::FromStr;

use crate::error::MetricsError;

/// Default latency buckets, in seconds.
pub const DEFAULT_DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Histogram bucket boundaries, parsed from a comma separated list so they can be
/// loaded from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Buckets(pub Vec<f64>);

impl FromStr for Buckets {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bounds = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let bound = part
                .parse::<f64>()
                .map_err(|_| MetricsError::InvalidBuckets(s.to_string()))?;
            if !bound.is_finite() || bounds.last().is_some_and(|last| *last >= bound) {
                return Err(MetricsError::InvalidBuckets(s.to_string()));
            }
            bounds.push(bound);
        }
        if bounds.is_empty() {
            return Err(MetricsError::InvalidBuckets(s.to_string()));
        }
        Ok(Buckets(bounds))
    }
}

impl Default for Buckets {
    fn default() -> Self {
        Buckets(DEFAULT_DURATION_BUCKETS.to_vec())
    }
}

impl Deref for Buckets {
    type Target = [f64];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Metric names and bucket boundaries used by the request instrumentation.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsConfig {
    pub request_total: String,
    pub error_total: String,
    pub request_duration: String,
    pub duration_buckets: Buckets,
}

impl MetricsConfig {
    pub fn with_buckets(mut self, buckets: Buckets) -> Self {
        self.duration_buckets = buckets;
        self
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            request_total: "http_request_total".to_string(),
            error_total: "http_error_total".to_string(),
            request_duration: "http_request_duration_seconds".to_string(),
            duration_buckets: Buckets::default(),
        }
    }
}
