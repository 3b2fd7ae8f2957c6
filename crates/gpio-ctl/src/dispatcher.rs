use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use controller_manager::{ControllerFactory, ControllerManager, Init};
use embassy_sync::blocking_mutex::raw::RawMutex;
use tracing::{debug, info, warn};

use crate::edge_wait::wait_for_edge;
use crate::error::{Error, Result};
use crate::hal::{HalError, PinController};
use crate::icd::{
    CommandCode, CommandRecord, Direction, Level, Pin, PullMode, Request,
    Response, MAX_PWM, WAIT_FOREVER,
};
use crate::pin_state::{PinState, PinStateTable};

/// A fully validated command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read(Pin),
    Write(Pin, Level),
    Pwm(Pin, u16),
    SetDirection(Pin, Direction),
    SetPull(Pin, PullMode),
    /// `None` waits until an edge arrives.
    WaitEdge(Pin, Option<Duration>),
}

impl Operation {
    /// Validate a raw command: code first, then pin, then argument.
    pub fn parse(code: i32, pin: i32, arg: i32) -> Result<Self> {
        let code = CommandCode::try_from(code)?;
        let pin = Pin::try_from(pin)?;
        let command = code.name();

        let op = match code {
            CommandCode::Read => Operation::Read(pin),
            CommandCode::Write => {
                let level = Level::try_from(non_negative(command, arg)?)
                    .map_err(|_| Error::InvalidRange { command, value: arg })?;
                Operation::Write(pin, level)
            }
            CommandCode::Pwm => {
                let duty = non_negative(command, arg)?;
                if duty > i32::from(MAX_PWM) {
                    return Err(Error::InvalidRange { command, value: arg });
                }
                Operation::Pwm(pin, duty as u16)
            }
            CommandCode::SetDirection => {
                let direction =
                    Direction::try_from(non_negative(command, arg)?).map_err(
                        |_| Error::InvalidRange { command, value: arg },
                    )?;
                Operation::SetDirection(pin, direction)
            }
            CommandCode::SetPull => {
                if arg < -1 {
                    return Err(Error::MissingArgument { command });
                }
                let pull = PullMode::try_from(arg)
                    .map_err(|_| Error::InvalidRange { command, value: arg })?;
                Operation::SetPull(pin, pull)
            }
            CommandCode::WaitEdge => {
                let timeout = match arg {
                    WAIT_FOREVER => None,
                    ms if ms < WAIT_FOREVER => {
                        return Err(Error::MissingArgument { command })
                    }
                    ms => Some(Duration::from_millis(ms as u64)),
                };
                Operation::WaitEdge(pin, timeout)
            }
        };
        Ok(op)
    }

    pub fn pin(&self) -> Pin {
        match *self {
            Operation::Read(pin)
            | Operation::Write(pin, _)
            | Operation::Pwm(pin, _)
            | Operation::SetDirection(pin, _)
            | Operation::SetPull(pin, _)
            | Operation::WaitEdge(pin, _) => pin,
        }
    }
}

impl TryFrom<CommandRecord> for Operation {
    type Error = Error;

    fn try_from(record: CommandRecord) -> Result<Self> {
        Operation::parse(record.code, record.pin, record.arg)
    }
}

fn non_negative(command: &'static str, arg: i32) -> Result<i32> {
    if arg < 0 {
        Err(Error::MissingArgument { command })
    } else {
        Ok(arg)
    }
}

fn hardware_failure(
    operation: &'static str,
    pin: Pin,
) -> impl FnOnce(HalError) -> Error {
    move |err| {
        warn!(operation, %pin, code = err.code, "hardware operation failed");
        Error::HardwareOperationFailed { operation, pin, code: err.code }
    }
}

/// Routes requests to the pin controller owned by a [`ControllerManager`].
///
/// The controller is opened on the first request that passes validation.
/// Whenever that open is a fresh one, the recorded [`PinState`] is dropped
/// since the hardware is back at its defaults.
pub struct Dispatcher<M: RawMutex, F: ControllerFactory> {
    manager: Arc<ControllerManager<M, F>>,
    pins: PinStateTable,
}

impl<M, F> Dispatcher<M, F>
where
    M: RawMutex,
    F: ControllerFactory,
    F::Controller: PinController,
    F::Error: fmt::Display,
{
    pub fn new(manager: Arc<ControllerManager<M, F>>) -> Self {
        Self { manager, pins: PinStateTable::new() }
    }

    pub fn manager(&self) -> &Arc<ControllerManager<M, F>> {
        &self.manager
    }

    /// What this dispatcher has applied to `pin` since the last open.
    pub fn pin_state(&self, pin: Pin) -> PinState {
        self.pins.get(pin)
    }

    pub fn dispatch(&mut self, request: Request) -> Result<Response> {
        match request {
            Request::QueryRevision => self.revision(),
            Request::Command(record) => {
                let op = Operation::try_from(record)?;
                self.execute(op)
            }
        }
    }

    /// Board revision. A failed query passes the hardware code through.
    pub fn revision(&mut self) -> Result<Response> {
        self.open()?;
        let revision = self.manager.with_controller(|c| c.hardware_revision())?;
        Ok(match revision {
            Ok(revision) => Response::Value(i64::from(revision)),
            Err(err) => {
                warn!(code = err.code, "revision query failed");
                Response::Value(i64::from(err.code))
            }
        })
    }

    pub fn execute(&mut self, op: Operation) -> Result<Response> {
        self.open()?;
        let Self { manager, pins } = self;
        manager.with_controller(|c| apply(c, pins, op))?
    }

    /// Close the controller; the next request reopens it.
    pub fn release(&mut self) -> Result<()> {
        self.manager.release()?;
        self.pins.clear();
        Ok(())
    }

    fn open(&mut self) -> Result<()> {
        if self.manager.ensure_initialized()? == Init::Opened {
            info!("pin controller opened");
            self.pins.clear();
        }
        Ok(())
    }
}

fn apply<C: PinController + ?Sized>(
    controller: &mut C,
    pins: &mut PinStateTable,
    op: Operation,
) -> Result<Response> {
    debug!(pin = %op.pin(), ?op, "dispatching");
    match op {
        Operation::Read(pin) => Ok(match controller.read(pin) {
            Ok(level) => Response::Value(i64::from(i32::from(level))),
            Err(err) => {
                warn!(%pin, code = err.code, "read failed");
                Response::Value(i64::from(err.code))
            }
        }),
        Operation::Write(pin, level) => {
            controller
                .write(pin, level)
                .map_err(hardware_failure("write", pin))?;
            Ok(Response::Done)
        }
        Operation::Pwm(pin, duty) => {
            if !pins.get(pin).pwm_ranged {
                controller
                    .set_pwm_range(pin, u32::from(MAX_PWM))
                    .map_err(hardware_failure("pwm-range", pin))?;
                pins.mark_pwm_ranged(pin);
            }
            controller
                .set_pwm(pin, duty)
                .map_err(hardware_failure("pwm", pin))?;
            Ok(Response::Done)
        }
        Operation::SetDirection(pin, direction) => {
            controller
                .set_direction(pin, direction)
                .map_err(hardware_failure("set-direction", pin))?;
            pins.set_direction(pin, direction);
            Ok(Response::Done)
        }
        Operation::SetPull(pin, pull) => {
            controller
                .set_pull(pin, pull)
                .map_err(hardware_failure("set-pull", pin))?;
            pins.set_pull(pin, pull);
            Ok(Response::Done)
        }
        Operation::WaitEdge(pin, timeout) => {
            let result = wait_for_edge(controller, pin, timeout);
            Ok(Response::Value(i64::from(i32::from(result))))
        }
    }
}
