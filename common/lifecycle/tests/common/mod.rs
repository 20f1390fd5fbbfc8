#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use axum::http::StatusCode;
use axum::routing;
use axum::Router;
use lifecycle::{Config, RunningService, ServiceContainer, ServiceHooks};

pub const SLOW_REQUEST: Duration = Duration::from_millis(300);

/// Hooks that record what the container did to them.
#[derive(Clone, Default)]
pub struct RecordingHooks {
    pub fail_up: bool,
    pub fail_down: bool,
    pub up_delay: Duration,
    pub ups: Arc<AtomicUsize>,
    pub downs: Arc<AtomicUsize>,
    /// Set after start so `down` can probe its own service.
    pub addr: Arc<Mutex<Option<SocketAddr>>>,
    /// Status of `/ready` as seen from inside `down`.
    pub ready_during_down: Arc<Mutex<Option<u16>>>,
}

impl RecordingHooks {
    pub fn ups(&self) -> usize {
        self.ups.load(Ordering::SeqCst)
    }

    pub fn downs(&self) -> usize {
        self.downs.load(Ordering::SeqCst)
    }

    pub fn ready_during_down(&self) -> Option<u16> {
        *self.ready_during_down.lock().unwrap()
    }
}

#[async_trait]
impl ServiceHooks for RecordingHooks {
    async fn up(&self) -> anyhow::Result<()> {
        self.ups.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.up_delay).await;
        if self.fail_up {
            bail!("database unreachable");
        }
        Ok(())
    }

    async fn down(&self) -> anyhow::Result<()> {
        self.downs.fetch_add(1, Ordering::SeqCst);

        let addr = *self.addr.lock().unwrap();
        if let Some(addr) = addr {
            let status = reqwest::get(format!("http://{addr}/ready"))
                .await
                .map(|res| res.status().as_u16())
                .ok();
            *self.ready_during_down.lock().unwrap() = status;
        }

        if self.fail_down {
            bail!("flush failed");
        }
        Ok(())
    }

    fn populate(&self, router: Router) -> Router {
        router
            .route("/work", routing::get(|| async { "ok" }))
            .route(
                "/slow",
                routing::get(|| async {
                    tokio::time::sleep(SLOW_REQUEST).await;
                    "done"
                }),
            )
            .route(
                "/hang",
                routing::get(|| async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    "never"
                }),
            )
            .route(
                "/fail",
                routing::get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "try later") }),
            )
    }
}

pub fn test_config() -> Config {
    Config::default_test_config()
}

/// Start a container and hand the bound address to the hooks.
pub async fn start(config: Config, hooks: RecordingHooks) -> RunningService {
    let addr = hooks.addr.clone();
    let running = ServiceContainer::new(config, hooks)
        .unwrap()
        .start()
        .await
        .expect("service failed to start");
    *addr.lock().unwrap() = Some(running.local_addr());
    running
}

pub async fn get(addr: SocketAddr, path: &str) -> reqwest::Response {
    reqwest::get(format!("http://{addr}{path}"))
        .await
        .expect("failed to send request")
}

pub async fn wait_shutdown(running: &RunningService) {
    tokio::time::timeout(Duration::from_secs(10), running.wait())
        .await
        .expect("shutdown did not complete");
}

/// Sum of every sample of `name` carrying all of `labels`.
pub fn sample_sum(rendered: &str, name: &str, labels: &[(&str, &str)]) -> f64 {
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
        .sum()
}
