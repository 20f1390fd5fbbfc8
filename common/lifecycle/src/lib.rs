//! Uniform service lifecycle: lifecycle state machine, probe endpoints, request
//! metrics, OS signal trapping and ordered graceful shutdown around a user-supplied
//! set of hooks.
//!
//! ```text
//! start:    starting → up() → routes + metrics → bind → ready
//! shutdown: signal/trigger (once) → shutdown → down() → close + drain → complete
//! ```

mod config;
mod container;
mod endpoints;
mod error;
mod hooks;
mod metrics;
mod signals;
mod state;

pub use config::{BuildInfo, Config};
pub use container::{RunningService, ServiceContainer};
pub use endpoints::EndpointState;
pub use error::StartupError;
pub use hooks::ServiceHooks;
pub use signals::{ShutdownTrigger, SignalCoordinator, SignalKind, SignalMode};
pub use state::{LifecycleState, StateHandle};
