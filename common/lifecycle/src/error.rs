//! Startup error types returned by the container.

use thiserror::Error;

/// Fatal errors raised while bringing a service up. The lifecycle state never
/// reaches `ready` when one of these is returned.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The metrics registry could not be built from configuration.
    #[error("failed to build metrics registry: {0}")]
    Metrics(#[from] common_metrics::MetricsError),

    /// OS signal handlers could not be installed.
    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),

    /// The user `up` hook returned an error.
    #[error("up hook failed: {0:#}")]
    Up(anyhow::Error),

    /// The listener could not be bound, usually because the port is taken.
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}
