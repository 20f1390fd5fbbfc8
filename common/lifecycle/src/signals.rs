//! OS signal trapping and the single-fire shutdown gate.

use std::fmt;
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use tokio::signal::unix::{signal, Signal, SignalKind as UnixSignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Termination signals trapped by the coordinator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalKind {
    Term,
    Int,
    Usr2,
    Hup,
}

impl SignalKind {
    pub fn name(self) -> &'static str {
        match self {
            SignalKind::Term => "SIGTERM",
            SignalKind::Int => "SIGINT",
            SignalKind::Usr2 => "SIGUSR2",
            SignalKind::Hup => "SIGHUP",
        }
    }
}

/// What started the shutdown sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownTrigger {
    Signal(SignalKind),
    Manual,
}

impl ShutdownTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            ShutdownTrigger::Signal(kind) => kind.name(),
            ShutdownTrigger::Manual => "manual",
        }
    }
}

impl fmt::Display for ShutdownTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SignalMode {
    /// Trap SIGTERM, SIGINT, SIGUSR2 and SIGHUP.
    #[default]
    Trap,
    /// Trap nothing; shutdown only happens through [`SignalCoordinator::trigger`].
    Manual,
}

type ShutdownCallback = Box<dyn FnOnce(ShutdownTrigger) -> BoxFuture<'static, ()> + Send>;

#[derive(Default)]
struct Pending {
    callback: Option<ShutdownCallback>,
    trigger: Option<ShutdownTrigger>,
    consumed: bool,
}

/// Turns any number of termination signals (or manual triggers) into exactly one
/// invocation of the registered shutdown callback.
///
/// The gate is its own atomic flag, independent from the lifecycle state, so a
/// second trigger can never slip in between "shutdown requested" and "shutdown
/// sequence started". Triggers after the first are logged and dropped.
pub struct SignalCoordinator {
    mode: SignalMode,
    fired: AtomicBool,
    listening: AtomicBool,
    pending: Mutex<Pending>,
    completed: CancellationToken,
}

impl SignalCoordinator {
    pub fn new(mode: SignalMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            fired: AtomicBool::new(false),
            listening: AtomicBool::new(false),
            pending: Mutex::new(Pending::default()),
            completed: CancellationToken::new(),
        })
    }

    pub fn mode(&self) -> SignalMode {
        self.mode
    }

    /// Install the OS signal handlers and spawn the task forwarding them to the gate.
    /// No-op in [`SignalMode::Manual`] or when already listening. Must be called
    /// from within a Tokio runtime.
    pub fn listen(self: &Arc<Self>) -> io::Result<()> {
        self.listen_with(signal)
    }

    fn listen_with<F>(self: &Arc<Self>, mut register: F) -> io::Result<()>
    where
        F: FnMut(UnixSignalKind) -> io::Result<Signal>,
    {
        if self.mode == SignalMode::Manual {
            debug!("Lifecycle: manual mode, not trapping signals");
            return Ok(());
        }
        if self.listening.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let (mut term, mut int, mut usr2, mut hup) = match install(&mut register) {
            Ok(signals) => signals,
            Err(error) => {
                // Nothing is trapped, a later listen() must try again.
                self.listening.store(false, Ordering::SeqCst);
                return Err(error);
            }
        };

        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let kind = tokio::select! {
                    Some(()) = term.recv() => SignalKind::Term,
                    Some(()) = int.recv() => SignalKind::Int,
                    Some(()) = usr2.recv() => SignalKind::Usr2,
                    Some(()) = hup.recv() => SignalKind::Hup,
                    else => break,
                };
                info!(signal = kind.name(), "Lifecycle: received signal");
                coordinator.fire(ShutdownTrigger::Signal(kind));
            }
        });

        debug!("Lifecycle: trapping SIGTERM, SIGINT, SIGUSR2 and SIGHUP");
        Ok(())
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Register the shutdown callback. Only one callback ever runs: a registration
    /// after the callback already ran is ignored. If a trigger arrived before
    /// registration, the callback starts immediately. Returns false if ignored.
    ///
    /// The callback itself is called on the triggering path, before `fire` returns;
    /// the future it returns is driven on its own task.
    pub fn on_shutdown<F, Fut>(&self, callback: F) -> bool
    where
        F: FnOnce(ShutdownTrigger) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: ShutdownCallback = Box::new(move |trigger| Box::pin(callback(trigger)));

        let run_now = {
            let mut pending = self.lock_pending();
            if pending.consumed {
                warn!("Lifecycle: shutdown callback already ran, ignoring registration");
                return false;
            }
            match pending.trigger {
                Some(trigger) => {
                    pending.consumed = true;
                    Some(trigger)
                }
                None => {
                    if pending.callback.replace(callback).is_some() {
                        warn!("Lifecycle: replacing previously registered shutdown callback");
                    }
                    return true;
                }
            }
        };

        if let Some(trigger) = run_now {
            self.run(callback, trigger);
        }
        true
    }

    /// Pass a trigger through the gate. Returns true for the first trigger only.
    /// Must be called from within a Tokio runtime.
    pub fn fire(&self, trigger: ShutdownTrigger) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            info!(trigger = %trigger, "Lifecycle: shutdown already in progress, ignoring trigger");
            return false;
        }
        info!(trigger = %trigger, "Lifecycle: shutdown triggered");

        let callback = {
            let mut pending = self.lock_pending();
            pending.trigger = Some(trigger);
            let callback = pending.callback.take();
            if callback.is_some() {
                pending.consumed = true;
            }
            callback
        };

        if let Some(callback) = callback {
            self.run(callback, trigger);
        }
        true
    }

    /// Manual shutdown, going through the same gate as signals.
    pub fn trigger(&self) -> bool {
        self.fire(ShutdownTrigger::Manual)
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Resolves once the shutdown callback has run to completion.
    pub async fn completed(&self) {
        self.completed.cancelled().await
    }

    pub fn is_completed(&self) -> bool {
        self.completed.is_cancelled()
    }

    fn run(&self, callback: ShutdownCallback, trigger: ShutdownTrigger) {
        let shutdown = callback(trigger);
        let completed = self.completed.clone();
        tokio::spawn(async move {
            shutdown.await;
            completed.cancel();
        });
    }

    fn lock_pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for SignalCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalCoordinator")
            .field("mode", &self.mode)
            .field("fired", &self.is_fired())
            .field("completed", &self.is_completed())
            .finish()
    }
}

fn install<F>(register: &mut F) -> io::Result<(Signal, Signal, Signal, Signal)>
where
    F: FnMut(UnixSignalKind) -> io::Result<Signal>,
{
    Ok((
        register(UnixSignalKind::terminate())?,
        register(UnixSignalKind::interrupt())?,
        register(UnixSignalKind::user_defined2())?,
        register(UnixSignalKind::hangup())?,
    ))
}
