//! Service container: runs the user hooks around the HTTP listener and drives the
//! lifecycle state through `starting → ready → shutdown`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use common_metrics::{track_requests, MetricsRegistry};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::endpoints::{self, EndpointState};
use crate::error::StartupError;
use crate::hooks::ServiceHooks;
use crate::metrics;
use crate::signals::{ShutdownTrigger, SignalCoordinator, SignalMode};
use crate::state::{LifecycleState, StateHandle};

pub struct ServiceContainer<H: ServiceHooks> {
    config: Config,
    hooks: Arc<H>,
    state: StateHandle,
    metrics: MetricsRegistry,
    coordinator: Arc<SignalCoordinator>,
}

impl<H: ServiceHooks> ServiceContainer<H> {
    pub fn new(config: Config, hooks: H) -> Result<Self, StartupError> {
        let metrics = MetricsRegistry::new(config.metrics_config())?;
        Ok(Self::with_metrics(config, hooks, metrics))
    }

    /// Use a caller-built registry, e.g. one with a custom exporter.
    pub fn with_metrics(config: Config, hooks: H, metrics: MetricsRegistry) -> Self {
        let mode = if config.trap_signals {
            SignalMode::Trap
        } else {
            SignalMode::Manual
        };
        let state = StateHandle::new();
        metrics::emit_state(&metrics, state.get());

        Self {
            config,
            hooks: Arc::new(hooks),
            state,
            metrics,
            coordinator: SignalCoordinator::new(mode),
        }
    }

    pub fn state(&self) -> StateHandle {
        self.state.clone()
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub fn coordinator(&self) -> Arc<SignalCoordinator> {
        self.coordinator.clone()
    }

    /// Probe endpoints plus the hook's business routes, all instrumented.
    pub fn router(&self) -> Router {
        let router = endpoints::router(EndpointState {
            state: self.state.clone(),
            metrics: self.metrics.clone(),
            build: self.config.build_info(),
        });
        let router = self.hooks.populate(router);
        track_requests(router, self.metrics.clone())
    }

    /// Run `up`, bind the listener, start serving and flip to `ready`.
    ///
    /// Fails without ever reaching `ready` if `up` fails or the bind fails.
    pub async fn start(self) -> Result<RunningService, StartupError> {
        info!(
            env = %self.config.environment,
            version = %self.config.version,
            commit = %self.config.commit,
            "Lifecycle: starting service"
        );

        self.coordinator.listen().map_err(StartupError::Signals)?;

        if let Err(error) = self.hooks.up().await {
            error!(error = %format!("{error:#}"), "Lifecycle: up hook failed, aborting startup");
            return Err(StartupError::Up(error));
        }

        let router = self.router();
        let addr = self.config.bind();
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(source) => {
                error!(address = %addr, error = %source, "Lifecycle: failed to bind listener");
                self.release_after_failed_start().await;
                return Err(StartupError::Bind { addr, source });
            }
        };
        let local_addr = match listener.local_addr() {
            Ok(local_addr) => local_addr,
            Err(source) => {
                self.release_after_failed_start().await;
                return Err(StartupError::Bind { addr, source });
            }
        };

        let close = CancellationToken::new();
        let server = {
            let close = close.clone();
            tokio::spawn(async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move { close.cancelled().await })
                    .await
            })
        };
        info!(address = %local_addr, "Lifecycle: listening");

        let sequence = ShutdownSequence {
            hooks: self.hooks.clone(),
            state: self.state.clone(),
            metrics: self.metrics.clone(),
            close,
            server,
            drain_timeout: self.config.shutdown_timeout(),
        };
        // Registered before `ready`: a trigger from here on flips the state to
        // `shutdown` before `fire` returns, and `ready` can never follow it.
        self.coordinator.on_shutdown(move |trigger| {
            sequence.begin(trigger);
            sequence.run()
        });

        if !transition(&self.state, &self.metrics, LifecycleState::Ready) {
            warn!("Lifecycle: shutdown requested during startup, not marking ready");
        }

        Ok(RunningService {
            local_addr,
            state: self.state,
            metrics: self.metrics,
            coordinator: self.coordinator,
        })
    }

    /// Start, then wait until the shutdown sequence has completed.
    pub async fn run(self) -> Result<(), StartupError> {
        let service = self.start().await?;
        service.wait().await;
        Ok(())
    }

    // `up` succeeded but we will never serve: give the hook its chance to release
    // what it acquired.
    async fn release_after_failed_start(&self) {
        if let Err(error) = self.hooks.down().await {
            error!(error = %format!("{error:#}"), "Lifecycle: down hook failed after aborted startup");
        }
    }
}

fn transition(state: &StateHandle, metrics: &MetricsRegistry, next: LifecycleState) -> bool {
    let changed = state.set(next);
    if changed {
        metrics::emit_state(metrics, next);
    }
    changed
}

/// Everything the shutdown callback needs, moved into it once.
struct ShutdownSequence<H: ServiceHooks> {
    hooks: Arc<H>,
    state: StateHandle,
    metrics: MetricsRegistry,
    close: CancellationToken,
    server: JoinHandle<std::io::Result<()>>,
    drain_timeout: Duration,
}

impl<H: ServiceHooks> ShutdownSequence<H> {
    /// Fail readiness. Runs synchronously on the triggering path.
    fn begin(&self, trigger: ShutdownTrigger) {
        metrics::emit_shutdown_initiated(&self.metrics, trigger.as_str());
        info!(trigger = %trigger, "Lifecycle: shutdown initiated");
        transition(&self.state, &self.metrics, LifecycleState::Shutdown);
    }

    /// `down` runs with readiness already failing, then the listener stops accepting
    /// and drains in-flight requests up to the timeout.
    async fn run(self) {
        let started = Instant::now();
        let mut clean = true;
        if let Err(error) = self.hooks.down().await {
            clean = false;
            error!(error = %format!("{error:#}"), "Lifecycle: down hook failed, continuing shutdown");
        }

        self.close.cancel();
        let mut server = self.server;
        match tokio::time::timeout(self.drain_timeout, &mut server).await {
            Ok(Ok(Ok(()))) => debug!("Lifecycle: listener closed and drained"),
            Ok(Ok(Err(error))) => {
                clean = false;
                error!(error = %error, "Lifecycle: server exited with error");
            }
            Ok(Err(error)) => {
                clean = false;
                error!(error = %error, "Lifecycle: server task failed");
            }
            Err(_) => {
                clean = false;
                warn!(
                    timeout_secs = self.drain_timeout.as_secs_f64(),
                    "Lifecycle: drain timed out, abandoning remaining connections"
                );
                server.abort();
            }
        }

        metrics::emit_shutdown_completed(&self.metrics, clean);
        if clean {
            info!(
                clean = true,
                total_duration_secs = started.elapsed().as_secs_f64(),
                "Lifecycle: shutdown complete"
            );
        } else {
            warn!(
                clean = false,
                total_duration_secs = started.elapsed().as_secs_f64(),
                "Lifecycle: shutdown complete with failures"
            );
        }
    }
}

/// Handle on a started service.
pub struct RunningService {
    local_addr: SocketAddr,
    state: StateHandle,
    metrics: MetricsRegistry,
    coordinator: Arc<SignalCoordinator>,
}

impl RunningService {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> LifecycleState {
        self.state.get()
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub fn coordinator(&self) -> Arc<SignalCoordinator> {
        self.coordinator.clone()
    }

    /// Trigger shutdown (unless already under way) and wait for it to complete.
    pub async fn shutdown(&self) {
        self.coordinator.trigger();
        self.wait().await
    }

    /// Resolves once the shutdown sequence has completed.
    pub async fn wait(&self) {
        self.coordinator.completed().await
    }
}
