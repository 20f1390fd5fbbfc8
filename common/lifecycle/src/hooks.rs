use async_trait::async_trait;
use axum::Router;

/// Capabilities a service plugs into the [`ServiceContainer`](crate::ServiceContainer).
///
/// `up` runs before the listener binds and readiness stays `starting` until it
/// returns; an error aborts startup. `down` runs once during shutdown, after
/// readiness already reports `shutdown` and before the listener closes; an error
/// is logged and shutdown carries on.
#[async_trait]
pub trait ServiceHooks: Send + Sync + 'static {
    async fn up(&self) -> anyhow::Result<()>;

    async fn down(&self) -> anyhow::Result<()>;

    /// Register business routes. Called once, before the listener binds. Routes must
    /// not overlap with `/`, `/health`, `/ready` or `/metrics`.
    fn populate(&self, router: Router) -> Router {
        router
    }
}
