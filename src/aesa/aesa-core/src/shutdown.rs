use crate::memory::{FlagMode, HostFlag, HostStatusRegister, RegisterCell};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::warn;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Sending half of the shutdown channel, handed to the interrupt handler
#[derive(Clone)]
pub struct ShutdownTrigger {
    tx: Sender<()>,
}

/// Receiving half, observed by the protocol at its suspension points
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: Receiver<()>,
    latched: Arc<AtomicBool>, // Set once a request has been received
}

/// Builds a connected trigger/signal pair
pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = bounded(1);
    let signal = ShutdownSignal {
        rx,
        latched: Arc::new(AtomicBool::new(false)),
    };
    (ShutdownTrigger { tx }, signal)
}

impl ShutdownTrigger {
    /// Requests shutdown. Returns false if a request is already pending.
    pub fn request(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

impl ShutdownSignal {
    /// Signal that never fires
    pub fn never() -> Self {
        let (_, rx) = bounded(1);
        Self {
            rx,
            latched: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Non-blocking check; once true it stays true
    pub fn is_requested(&self) -> bool {
        if self.latched.load(Ordering::SeqCst) {
            return true;
        }
        if self.rx.try_recv().is_ok() {
            self.latch();
            return true;
        }
        false
    }

    fn latch(&self) {
        self.latched.store(true, Ordering::SeqCst);
    }

    /// Sleeps for `interval` unless shutdown is requested first.
    /// Returns true if shutdown was requested.
    pub fn wait(&self, interval: Duration) -> bool {
        if self.is_requested() {
            return true;
        }
        match self.rx.recv_timeout(interval) {
            Ok(()) => {
                self.latch();
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => {
                std::thread::sleep(interval);
                false
            }
        }
    }
}

/// Best-effort device deactivation on the shutdown path
///
/// Clears RESETN and returns without waiting for the device. Safe to call on
/// an unmapped register.
pub fn deactivate<C: RegisterCell>(host: &mut HostStatusRegister<C>) {
    if !host.is_mapped() {
        warn!("Shutdown before registers were mapped; nothing to deactivate");
        return;
    }
    host.set_flag(HostFlag::Resetn, FlagMode::Clear);
}

type ResetFn = Box<dyn FnMut() + Send>;

/// RESETN clear for paths that cannot reach the channels, such as a forced
/// exit from the interrupt handler thread
#[derive(Clone, Default)]
pub struct ResetHook {
    slot: Arc<Mutex<Option<ResetFn>>>,
}

/// Keeps a `ResetHook` armed; disarms it when dropped
pub struct ArmedReset<'a> {
    hook: &'a ResetHook,
}

impl ResetHook {
    /// Arms the hook with a second handle on the host register.
    ///
    /// The guard must be dropped before the register's memory goes away.
    pub fn arm<C: RegisterCell + Send + 'static>(&self, cell: C) -> ArmedReset<'_> {
        let mut host = HostStatusRegister::new(cell);
        *self.slot() = Some(Box::new(move || deactivate(&mut host)));
        ArmedReset { hook: self }
    }

    /// Clears RESETN if armed. Returns whether a register was written.
    pub fn fire(&self) -> bool {
        match self.slot().as_mut() {
            Some(reset) => {
                reset();
                true
            }
            None => false,
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<ResetFn>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ArmedReset<'_> {
    fn drop(&mut self) {
        *self.hook.slot() = None;
    }
}
