use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use metrics::Recorder;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use tracing::{error, warn};

use crate::config::MetricsConfig;
use crate::error::{ExportError, MetricsError};

/// Storage and exposition backend for a [`MetricsRegistry`].
///
/// The recorder receives every observation, `render` turns the current values into
/// the text served on `/metrics`. Swapping the exporter changes the storage without
/// touching the instrumentation.
pub trait MetricsExporter: Send + Sync + 'static {
    fn recorder(&self) -> &dyn Recorder;
    fn render(&self) -> Result<String, ExportError>;
}

/// Prometheus text exposition, backed by a recorder that is never installed globally.
pub struct PrometheusExporter {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
}

impl PrometheusExporter {
    pub fn new(config: &MetricsConfig) -> Result<Self, MetricsError> {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full(config.request_duration.clone()),
                &config.duration_buckets,
            )?
            .build_recorder();
        let handle = recorder.handle();

        Ok(Self { recorder, handle })
    }
}

impl MetricsExporter for PrometheusExporter {
    fn recorder(&self) -> &dyn Recorder {
        &self.recorder
    }

    fn render(&self) -> Result<String, ExportError> {
        panic::catch_unwind(AssertUnwindSafe(|| self.handle.render())).map_err(|payload| {
            let message = panic_message(payload.as_ref());
            error!(panic = %message, "prometheus render panicked");
            ExportError::Panicked(message)
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Dimensions of a single HTTP observation. Built once per request, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLabelSet {
    pub method: String,
    pub route: String,
    pub status: u16,
}

impl RequestLabelSet {
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    fn into_labels(self) -> [(&'static str, String); 3] {
        [
            ("method", self.method),
            ("route", self.route),
            ("status", self.status.to_string()),
        ]
    }
}

/// Owns every metric instrument of a service. Cheap to clone, all clones share the
/// same instruments. Updates go through atomic instruments and are safe from any
/// number of concurrent request handlers.
#[derive(Clone)]
pub struct MetricsRegistry {
    exporter: Arc<dyn MetricsExporter>,
    config: Arc<MetricsConfig>,
}

impl MetricsRegistry {
    /// Registry backed by a fresh [`PrometheusExporter`].
    pub fn new(config: MetricsConfig) -> Result<Self, MetricsError> {
        let exporter = PrometheusExporter::new(&config)?;
        Ok(Self::with_exporter(config, exporter))
    }

    pub fn with_exporter<E: MetricsExporter>(config: MetricsConfig, exporter: E) -> Self {
        Self {
            exporter: Arc::new(exporter),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    pub fn increment_counter(&self, name: &str, labels: &[(&'static str, String)]) {
        metrics::with_local_recorder(self.exporter.recorder(), || {
            metrics::counter!(name.to_owned(), labels).increment(1);
        });
    }

    pub fn observe_duration(&self, name: &str, labels: &[(&'static str, String)], elapsed: Duration) {
        metrics::with_local_recorder(self.exporter.recorder(), || {
            metrics::histogram!(name.to_owned(), labels).record(elapsed.as_secs_f64());
        });
    }

    pub fn set_gauge(&self, name: &str, labels: &[(&'static str, String)], value: f64) {
        metrics::with_local_recorder(self.exporter.recorder(), || {
            metrics::gauge!(name.to_owned(), labels).set(value);
        });
    }

    /// Records one completed request: the request counter always, the error counter
    /// for 5xx statuses, and the latency histogram.
    pub fn record_request(&self, labels: RequestLabelSet, elapsed: Duration) {
        let is_error = labels.is_server_error();
        let labels = labels.into_labels();

        self.increment_counter(&self.config.request_total, &labels);
        if is_error {
            self.increment_counter(&self.config.error_total, &labels);
        }
        self.observe_duration(&self.config.request_duration, &labels, elapsed);
    }

    pub fn render(&self) -> Result<String, ExportError> {
        self.exporter.render().map_err(|err| {
            warn!(error = %err, "failed to render metrics");
            err
        })
    }
}

impl fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sums the samples of `name` whose label set contains every `(key, value)` pair.
    fn sample_sum(rendered: &str, name: &str, labels: &[(&str, &str)]) -> u64 {
        rendered
            .lines()
            .filter(|line| {
                line.strip_prefix(name)
                    .is_some_and(|rest| rest.starts_with('{') || rest.starts_with(' '))
            })
            .filter(|line| {
                labels
                    .iter()
                    .all(|(k, v)| line.contains(&format!("{k}=\"{v}\"")))
            })
            .filter_map(|line| line.rsplit(' ').next()?.parse::<f64>().ok())
            .map(|value| value as u64)
            .sum()
    }

    fn labels(status: u16) -> RequestLabelSet {
        RequestLabelSet {
            method: "GET".to_string(),
            route: "/things/:id".to_string(),
            status,
        }
    }

    #[test]
    fn records_requests_and_errors() {
        let registry = MetricsRegistry::new(MetricsConfig::default()).unwrap();

        registry.record_request(labels(200), Duration::from_millis(3));
        registry.record_request(labels(404), Duration::from_millis(3));
        registry.record_request(labels(503), Duration::from_millis(3));

        let rendered = registry.render().unwrap();
        assert_eq!(sample_sum(&rendered, "http_request_total", &[]), 3);
        assert_eq!(sample_sum(&rendered, "http_error_total", &[]), 1);
        assert_eq!(
            sample_sum(&rendered, "http_error_total", &[("status", "503")]),
            1
        );
        assert_eq!(
            sample_sum(
                &rendered,
                "http_request_duration_seconds_count",
                &[("route", "/things/:id")]
            ),
            3
        );
    }

    #[test]
    fn error_range_is_half_open() {
        assert!(!labels(499).is_server_error());
        assert!(labels(500).is_server_error());
        assert!(labels(599).is_server_error());
        assert!(!labels(600).is_server_error());
    }

    #[test]
    fn registries_are_isolated() {
        let first = MetricsRegistry::new(MetricsConfig::default()).unwrap();
        let second = MetricsRegistry::new(MetricsConfig::default()).unwrap();

        first.record_request(labels(200), Duration::from_millis(1));

        assert_eq!(
            sample_sum(&first.render().unwrap(), "http_request_total", &[]),
            1
        );
        assert_eq!(
            sample_sum(&second.render().unwrap(), "http_request_total", &[]),
            0
        );
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        for threads in [1usize, 10, 1000] {
            let registry = MetricsRegistry::new(MetricsConfig::default()).unwrap();
            let workers: Vec<_> = (0..threads)
                .map(|_| {
                    let registry = registry.clone();
                    std::thread::spawn(move || {
                        registry.record_request(labels(200), Duration::from_micros(50))
                    })
                })
                .collect();
            for worker in workers {
                worker.join().unwrap();
            }

            let rendered = registry.render().unwrap();
            assert_eq!(
                sample_sum(&rendered, "http_request_total", &[]),
                threads as u64
            );
        }
    }

    #[test]
    fn custom_names_and_buckets() {
        let config = MetricsConfig {
            request_total: "api_requests".to_string(),
            error_total: "api_errors".to_string(),
            request_duration: "api_latency".to_string(),
            duration_buckets: "0.5,1".parse().unwrap(),
        };
        let registry = MetricsRegistry::new(config).unwrap();
        registry.record_request(labels(500), Duration::from_millis(700));

        let rendered = registry.render().unwrap();
        assert_eq!(sample_sum(&rendered, "api_requests", &[]), 1);
        assert_eq!(sample_sum(&rendered, "api_errors", &[]), 1);
        assert_eq!(
            sample_sum(&rendered, "api_latency_bucket", &[("le", "0.5")]),
            0
        );
        assert_eq!(sample_sum(&rendered, "api_latency_count", &[]), 1);
    }

    struct BrokenExporter;

    impl MetricsExporter for BrokenExporter {
        fn recorder(&self) -> &dyn Recorder {
            &metrics::NoopRecorder
        }

        fn render(&self) -> Result<String, ExportError> {
            Err(ExportError::Unavailable("storage gone".to_string()))
        }
    }

    #[test]
    fn panic_payloads_are_described() {
        let message = panic::catch_unwind(|| panic!("bucket overflow")).unwrap_err();
        assert_eq!(panic_message(message.as_ref()), "bucket overflow");

        let formatted = panic::catch_unwind(|| panic!("bad value {}", 7)).unwrap_err();
        assert_eq!(panic_message(formatted.as_ref()), "bad value 7");

        let opaque = panic::catch_unwind(|| std::panic::panic_any(42u8)).unwrap_err();
        assert_eq!(panic_message(opaque.as_ref()), "unknown panic");
    }

    #[test]
    fn render_failure_is_reported() {
        let registry = MetricsRegistry::with_exporter(MetricsConfig::default(), BrokenExporter);
        registry.record_request(labels(200), Duration::from_millis(1));
        assert!(matches!(registry.render(), Err(ExportError::Unavailable(_))));
    }
}
