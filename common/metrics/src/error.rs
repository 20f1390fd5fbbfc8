use thiserror::Error;

/// Errors raised while building a registry.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to configure prometheus exporter: {0}")]
    Configure(#[from] metrics_exporter_prometheus::BuildError),
    #[error("invalid bucket list '{0}'")]
    InvalidBuckets(String),
}

/// Errors raised while rendering the exposition text. Callers answer with a 500.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("exporter panicked while rendering: {0}")]
    Panicked(String),
    #[error("exporter unavailable: {0}")]
    Unavailable(String),
}
