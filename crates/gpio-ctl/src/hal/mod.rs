//! Hardware abstraction for the pin controller.
//!
//! [`PinController`] is the register-level surface the dispatcher drives.
//! Implementations are opened and closed through a
//! [`controller_manager::ControllerFactory`]:
//!
//! - [`pigpiod`]: a client for the pigpio daemon's socket interface.
//! - [`sim`]: an in-process board used by tests and `--backend sim`.

use std::sync::Arc;
use std::time::Duration;

use derive_more::Display;

use crate::icd::{Direction, Level, Pin, PullMode};

pub mod pigpiod;
pub mod sim;

/// Negative status code reported by the hardware layer.
///
/// Codes follow the pigpio numbering so the same values surface whichever
/// backend produced them.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
#[display("hardware error {code}")]
pub struct HalError {
    pub code: i32,
}

impl HalError {
    pub const BAD_USER_GPIO: HalError = HalError { code: -2 };
    pub const BAD_DUTYCYCLE: HalError = HalError { code: -8 };
    pub const BAD_WDOG_TIMEOUT: HalError = HalError { code: -15 };
    pub const BAD_DUTYRANGE: HalError = HalError { code: -21 };
    /// The transport to the controller failed; not a pigpio code.
    pub const COMMS: HalError = HalError { code: -2000 };

    pub const fn new(code: i32) -> Self {
        Self { code }
    }
}

/// What an armed edge callback observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeEvent {
    /// Rising or falling edge; carries the level after the transition.
    Edge(Level),
    /// The registration's timeout expired without an edge.
    Timeout,
}

/// Edge notification hook.
///
/// Invoked from the controller's notification thread. Implementations must
/// return promptly and must not call back into the controller.
pub type EdgeCallback = Arc<dyn Fn(EdgeEvent) + Send + Sync>;

/// Register-level operations on an open pin controller.
pub trait PinController: Send {
    /// Board revision code of the attached hardware.
    fn hardware_revision(&mut self) -> Result<u32, HalError>;

    fn read(&mut self, pin: Pin) -> Result<Level, HalError>;

    fn write(&mut self, pin: Pin, level: Level) -> Result<(), HalError>;

    fn set_direction(
        &mut self,
        pin: Pin,
        direction: Direction,
    ) -> Result<(), HalError>;

    fn set_pull(&mut self, pin: Pin, pull: PullMode) -> Result<(), HalError>;

    /// Set the full-scale value that PWM duty cycles are measured against.
    fn set_pwm_range(&mut self, pin: Pin, range: u32) -> Result<(), HalError>;

    fn set_pwm(&mut self, pin: Pin, duty: u16) -> Result<(), HalError>;

    /// Arm (`Some`) or disarm (`None`) the either-edge callback on `pin`.
    ///
    /// While armed, the controller invokes the callback on every edge and
    /// with [`EdgeEvent::Timeout`] once `timeout` elapses without one.
    /// `None` for the timeout waits indefinitely.
    fn set_edge_callback(
        &mut self,
        pin: Pin,
        timeout: Option<Duration>,
        callback: Option<EdgeCallback>,
    ) -> Result<(), HalError>;
}
