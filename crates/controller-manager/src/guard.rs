use core::ops::Deref;

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::factory::ControllerFactory;
use crate::manager::ControllerManager;

/// RAII guard that releases the controller when dropped.
///
/// Hold one for the lifetime of whatever owns the process's hardware access
/// so the connection is closed on normal return, early `?` exits and panic
/// unwinding alike.
pub struct ReleaseGuard<'a, M: RawMutex, F: ControllerFactory> {
    manager: &'a ControllerManager<M, F>,
}

impl<M: RawMutex, F: ControllerFactory> Deref for ReleaseGuard<'_, M, F> {
    type Target = ControllerManager<M, F>;

    #[inline]
    fn deref(&self) -> &ControllerManager<M, F> {
        self.manager
    }
}

impl<M: RawMutex, F: ControllerFactory> Drop for ReleaseGuard<'_, M, F> {
    fn drop(&mut self) {
        // Nothing left to report to on drop; a poisoned manager stays poisoned.
        let _ = self.manager.release();
    }
}

impl<'a, M: RawMutex, F: ControllerFactory> ReleaseGuard<'a, M, F> {
    /// Create a new guard. Only called by `ControllerManager`.
    pub(crate) fn new(manager: &'a ControllerManager<M, F>) -> Self {
        Self { manager }
    }
}
