use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use portable_atomic::{AtomicUsize, Ordering};

use crate::error::ManagerError;
use crate::factory::ControllerFactory;
use crate::guard::ReleaseGuard;

/// Phase state machine for the controller lifecycle.
enum Phase<F: ControllerFactory> {
    /// No connection; the configuration is waiting to be used.
    Idle(F::Config),
    /// Connection is open.
    Open(F::Controller),
    /// Unrecoverable error state (only reached if the factory panics).
    Poisoned,
}

/// Outcome of [`ControllerManager::ensure_initialized`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Init {
    /// This call opened the connection.
    Opened,
    /// The connection was already open; nothing was done.
    AlreadyOpen,
}

/// Owns the single controller connection of a process.
///
/// Every access goes through one lock, so concurrent callers are serialized
/// and at most one connection is ever live per manager.
pub struct ControllerManager<M: RawMutex, F: ControllerFactory> {
    state: Mutex<M, RefCell<Phase<F>>>,
    opens: AtomicUsize,
}

impl<M: RawMutex, F: ControllerFactory> ControllerManager<M, F> {
    /// Create an idle manager holding the given configuration.
    pub const fn new(config: F::Config) -> Self {
        Self {
            state: Mutex::new(RefCell::new(Phase::Idle(config))),
            opens: AtomicUsize::new(0),
        }
    }

    /// Open the connection unless it is already open.
    ///
    /// A failed open leaves the manager idle with its configuration intact.
    pub fn ensure_initialized(&self) -> Result<Init, ManagerError<F::Error>> {
        self.state.lock(|cell| {
            let mut phase =
                cell.try_borrow_mut().map_err(|_| ManagerError::Busy)?;

            match &*phase {
                Phase::Open(_) => Ok(Init::AlreadyOpen),
                Phase::Idle(_) => {
                    // Take the config out, replacing with Poisoned temporarily.
                    let config =
                        match core::mem::replace(&mut *phase, Phase::Poisoned) {
                            Phase::Idle(c) => c,
                            _ => unreachable!(),
                        };

                    match F::open(config) {
                        Ok(controller) => {
                            *phase = Phase::Open(controller);
                            self.opens.fetch_add(1, Ordering::AcqRel);
                            Ok(Init::Opened)
                        }
                        Err((err, config)) => {
                            *phase = Phase::Idle(config);
                            Err(ManagerError::Open(err))
                        }
                    }
                }
                Phase::Poisoned => Err(ManagerError::Poisoned),
            }
        })
    }

    /// Run `f` against the open controller while holding the manager lock.
    ///
    /// Fails fast with `NotInitialized` if no connection is open. Calling
    /// back into the manager from inside `f` yields `Busy`.
    pub fn with_controller<R>(
        &self,
        f: impl FnOnce(&mut F::Controller) -> R,
    ) -> Result<R, ManagerError<F::Error>> {
        self.state.lock(|cell| {
            let mut phase =
                cell.try_borrow_mut().map_err(|_| ManagerError::Busy)?;

            match &mut *phase {
                Phase::Open(controller) => Ok(f(controller)),
                Phase::Idle(_) => Err(ManagerError::NotInitialized),
                Phase::Poisoned => Err(ManagerError::Poisoned),
            }
        })
    }

    /// Close the connection and return to idle.
    ///
    /// Returns `Ok(())` if the connection was closed or was already closed.
    pub fn release(&self) -> Result<(), ManagerError<F::Error>> {
        self.state.lock(|cell| {
            let mut phase =
                cell.try_borrow_mut().map_err(|_| ManagerError::Busy)?;

            match &*phase {
                Phase::Idle(_) => Ok(()),
                Phase::Open(_) => {
                    let controller =
                        match core::mem::replace(&mut *phase, Phase::Poisoned) {
                            Phase::Open(c) => c,
                            _ => unreachable!(),
                        };

                    *phase = Phase::Idle(F::close(controller));
                    Ok(())
                }
                Phase::Poisoned => Err(ManagerError::Poisoned),
            }
        })
    }

    /// Guard that calls [`release`](Self::release) when dropped.
    pub fn release_on_drop(&self) -> ReleaseGuard<'_, M, F> {
        ReleaseGuard::new(self)
    }

    /// Number of connections opened over the manager's lifetime.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::Acquire)
    }

    /// Returns `Some(true)` if open, `Some(false)` if idle, `None` if
    /// poisoned or currently borrowed.
    pub fn is_open(&self) -> Option<bool> {
        self.state.lock(|cell| {
            cell.try_borrow().ok().and_then(|phase| match &*phase {
                Phase::Open(_) => Some(true),
                Phase::Idle(_) => Some(false),
                Phase::Poisoned => None,
            })
        })
    }
}
