use envconfig::Envconfig;
use eyre::Result;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use common_metrics::MetricsRegistry;
use lifecycle::ServiceContainer;

use crate::config::Config;
use crate::handlers::GreeterHooks;

mod config;
mod handlers;

fn init_tracing(debug: bool) {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let log_layer = {
        let base_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true);

        if debug {
            // Development: pretty colored output
            base_layer.with_ansi(true).with_filter(filter()).boxed()
        } else {
            // Production: one JSON object per line
            base_layer.json().with_filter(filter()).boxed()
        }
    };

    tracing_subscriber::registry().with(log_layer).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::init_from_env()?;
    init_tracing(config.debug);

    let metrics = MetricsRegistry::new(config.service.metrics_config())?;
    let hooks = GreeterHooks::new(&config.greeting, config.warmup(), metrics.clone());

    ServiceContainer::with_metrics(config.service, hooks, metrics)
        .run()
        .await?;

    tracing::info!("bootstrap-api exited cleanly");
    Ok(())
}
