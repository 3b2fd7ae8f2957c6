//! Synchronous edge wait on top of the controller's edge callback.
//!
//! The callback runs on the controller's notification thread and only
//! stores the outcome in an [`EdgeSlot`]. The calling thread spins on the
//! slot until the first outcome lands, then deregisters the callback.

use std::sync::Arc;
use std::time::Duration;

use portable_atomic::{AtomicU8, Ordering};
use tracing::debug;

use crate::hal::{EdgeCallback, EdgeEvent, PinController};
use crate::icd::{EdgeWaitResult, Level, Pin};

const UNSET: u8 = 0;
const TRIGGERED_LOW: u8 = 1;
const TRIGGERED_HIGH: u8 = 2;
const TIMED_OUT: u8 = 3;

/// Single-slot cell written at most once per arm cycle.
#[derive(Debug, Default)]
pub struct EdgeSlot {
    state: AtomicU8,
}

impl EdgeSlot {
    pub const fn new() -> Self {
        Self { state: AtomicU8::new(UNSET) }
    }

    /// Record `event` unless an earlier one was recorded. Returns whether
    /// this call won.
    pub fn fire(&self, event: EdgeEvent) -> bool {
        let value = match event {
            EdgeEvent::Edge(Level::Low) => TRIGGERED_LOW,
            EdgeEvent::Edge(Level::High) => TRIGGERED_HIGH,
            EdgeEvent::Timeout => TIMED_OUT,
        };
        self.state
            .compare_exchange(UNSET, value, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// The recorded event, or `None` while the slot is unset.
    pub fn state(&self) -> Option<EdgeEvent> {
        match self.state.load(Ordering::Acquire) {
            TRIGGERED_LOW => Some(EdgeEvent::Edge(Level::Low)),
            TRIGGERED_HIGH => Some(EdgeEvent::Edge(Level::High)),
            TIMED_OUT => Some(EdgeEvent::Timeout),
            _ => None,
        }
    }

    /// Busy-wait until an event is recorded.
    pub fn spin_until_fired(&self) -> EdgeEvent {
        loop {
            match self.state() {
                Some(event) => return event,
                None => core::hint::spin_loop(),
            }
        }
    }
}

/// Deregisters the edge callback when dropped.
struct Armed<'a, C: PinController + ?Sized> {
    controller: &'a mut C,
    pin: Pin,
}

impl<C: PinController + ?Sized> Drop for Armed<'_, C> {
    fn drop(&mut self) {
        if let Err(err) = self.controller.set_edge_callback(self.pin, None, None)
        {
            debug!(pin = %self.pin, %err, "edge callback teardown failed");
        }
    }
}

/// Wait for either edge on `pin`, or for `timeout` to elapse.
///
/// `None` waits until an edge arrives. Registration failure yields
/// [`EdgeWaitResult::Error`] without waiting.
pub fn wait_for_edge<C: PinController + ?Sized>(
    controller: &mut C,
    pin: Pin,
    timeout: Option<Duration>,
) -> EdgeWaitResult {
    let slot = Arc::new(EdgeSlot::new());
    let callback: EdgeCallback = {
        let slot = Arc::clone(&slot);
        Arc::new(move |event| {
            slot.fire(event);
        })
    };

    let registered = controller.set_edge_callback(pin, timeout, Some(callback));
    let _armed = Armed { controller, pin };
    if let Err(err) = registered {
        debug!(%pin, %err, "edge callback registration failed");
        return EdgeWaitResult::Error;
    }

    debug!(%pin, ?timeout, "waiting for edge");
    match slot.spin_until_fired() {
        EdgeEvent::Edge(level) => {
            debug!(%pin, ?level, "edge detected");
            EdgeWaitResult::Triggered
        }
        EdgeEvent::Timeout => {
            debug!(%pin, "edge wait timed out");
            EdgeWaitResult::TimedOut
        }
    }
}
