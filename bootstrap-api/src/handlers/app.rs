use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use axum::{routing, Router};
use common_metrics::MetricsRegistry;
use lifecycle::ServiceHooks;
use tracing::info;

use super::greet::{self, GreetState};

/// Greeting service plugged into the lifecycle container.
pub struct GreeterHooks {
    state: GreetState,
    warmup: Duration,
}

impl GreeterHooks {
    pub fn new(greeting: &str, warmup: Duration, metrics: MetricsRegistry) -> Self {
        Self {
            state: GreetState {
                greeting: greeting.into(),
                served: Arc::new(AtomicU64::new(0)),
                metrics,
            },
            warmup,
        }
    }

    pub fn served(&self) -> u64 {
        self.state.served.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceHooks for GreeterHooks {
    async fn up(&self) -> anyhow::Result<()> {
        if self.state.greeting.trim().is_empty() {
            bail!("GREETING must not be empty");
        }
        tokio::time::sleep(self.warmup).await;
        info!(warmup_ms = self.warmup.as_millis() as u64, "greeter warmed up");
        Ok(())
    }

    async fn down(&self) -> anyhow::Result<()> {
        info!(served = self.served(), "greeter stopped taking greetings");
        Ok(())
    }

    fn populate(&self, router: Router) -> Router {
        router.route(
            "/greet/:name",
            routing::get(greet::greet).with_state(self.state.clone()),
        )
    }
}
