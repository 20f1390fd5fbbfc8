//! Lifecycle state holder shared between the container and the probe handlers.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Starting,
    Ready,
    Shutdown,
    /// Reported when the cell holds a value that does not decode to a known state.
    Unknown,
}

impl LifecycleState {
    fn as_u8(self) -> u8 {
        match self {
            LifecycleState::Starting => 0,
            LifecycleState::Ready => 1,
            LifecycleState::Shutdown => 2,
            LifecycleState::Unknown => u8::MAX,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => LifecycleState::Starting,
            1 => LifecycleState::Ready,
            2 => LifecycleState::Shutdown,
            _ => LifecycleState::Unknown,
        }
    }

    /// Value exported on the `lifecycle_state` gauge.
    pub fn gauge_value(self) -> f64 {
        match self {
            LifecycleState::Unknown => -1.0,
            known => f64::from(known.as_u8()),
        }
    }

    pub fn is_ready(self) -> bool {
        self == LifecycleState::Ready
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Ready => "ready",
            LifecycleState::Shutdown => "shutdown",
            LifecycleState::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Cloneable handle on a service's lifecycle state. All clones observe the same
/// value; a `set` is visible to every reader on its next `get`.
///
/// Transitions only move forward (`starting → ready → shutdown`). Attempts to go
/// back, or to set `unknown`, are ignored.
#[derive(Clone)]
pub struct StateHandle {
    raw: Arc<AtomicU8>,
}

impl StateHandle {
    pub fn new() -> Self {
        Self {
            raw: Arc::new(AtomicU8::new(LifecycleState::Starting.as_u8())),
        }
    }

    pub fn get(&self) -> LifecycleState {
        LifecycleState::from_u8(self.raw.load(Ordering::SeqCst))
    }

    /// Move to `next`. Returns true if the state changed.
    pub fn set(&self, next: LifecycleState) -> bool {
        if next == LifecycleState::Unknown {
            warn!(to = %next, "Lifecycle: refusing to set unknown state");
            return false;
        }

        let result = self
            .raw
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |raw| {
                let current = LifecycleState::from_u8(raw);
                (current != LifecycleState::Unknown && current < next).then_some(next.as_u8())
            });

        match result {
            Ok(previous) => {
                info!(from = %LifecycleState::from_u8(previous), to = %next, "Lifecycle: state changed");
                true
            }
            Err(current) => {
                let current = LifecycleState::from_u8(current);
                if current != next {
                    warn!(from = %current, to = %next, "Lifecycle: ignoring backward transition");
                }
                false
            }
        }
    }
}

impl Default for StateHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StateHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StateHandle").field(&self.get()).finish()
    }
}
