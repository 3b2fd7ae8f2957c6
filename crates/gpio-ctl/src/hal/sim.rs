//! Simulated pin controller.
//!
//! [`SimBoard`] is the shared "physical" side: tests drive input levels and
//! inject edges through it and inspect every call the controller received.
//! [`SimController`] is the [`PinController`] view handed to the dispatcher.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use controller_manager::ControllerFactory;
use derive_more::Display;
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{EdgeCallback, EdgeEvent, HalError, PinController};
use crate::icd::{Direction, Level, Pin, PullMode, MAX_PIN};

const PIN_COUNT: usize = MAX_PIN as usize + 1;

/// Revision reported when none is configured (Raspberry Pi 3 Model B).
pub const DEFAULT_REVISION: u32 = 0x00a0_2082;

/// Range pigpio applies to a pin that was never ranged explicitly.
pub const DEFAULT_PWM_RANGE: u32 = 255;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SimConfig {
    pub revision: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self { revision: DEFAULT_REVISION }
    }
}

/// One call received by the simulated controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalCall {
    Revision,
    Read(Pin),
    Write(Pin, Level),
    SetDirection(Pin, Direction),
    SetPull(Pin, PullMode),
    SetPwmRange(Pin, u32),
    SetPwm(Pin, u16),
    ArmEdge(Pin, Option<Duration>),
    DisarmEdge(Pin),
}

impl HalCall {
    /// Whether the call changes pin configuration or output.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, HalCall::Revision | HalCall::Read(_))
    }

    fn op(&self) -> SimOp {
        match self {
            HalCall::Revision => SimOp::Revision,
            HalCall::Read(_) => SimOp::Read,
            HalCall::Write(..) => SimOp::Write,
            HalCall::SetDirection(..) => SimOp::SetDirection,
            HalCall::SetPull(..) => SimOp::SetPull,
            HalCall::SetPwmRange(..) => SimOp::SetPwmRange,
            HalCall::SetPwm(..) => SimOp::SetPwm,
            HalCall::ArmEdge(..) => SimOp::ArmEdge,
            HalCall::DisarmEdge(_) => SimOp::DisarmEdge,
        }
    }
}

/// Operation kinds that can be made to fail with [`SimBoard::fail_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimOp {
    Revision,
    Read,
    Write,
    SetDirection,
    SetPull,
    SetPwmRange,
    SetPwm,
    ArmEdge,
    DisarmEdge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimPin {
    pub level: Level,
    pub direction: Direction,
    pub pull: PullMode,
    pub pwm_range: u32,
    pub duty: u16,
}

impl SimPin {
    const RESET: SimPin = SimPin {
        level: Level::Low,
        direction: Direction::Input,
        pull: PullMode::None,
        pwm_range: DEFAULT_PWM_RANGE,
        duty: 0,
    };
}

struct Registration {
    pin: Pin,
    callback: EdgeCallback,
    generation: u64,
}

struct BoardState {
    pins: [SimPin; PIN_COUNT],
    calls: Vec<HalCall>,
    failures: Vec<(SimOp, i32)>,
    edge: Option<Registration>,
    generation: u64,
}

impl BoardState {
    fn reset(&mut self) {
        self.pins = [SimPin::RESET; PIN_COUNT];
        self.edge = None;
        self.generation += 1;
    }

    /// Record `call` and consume a pending failure for its operation.
    fn record(&mut self, call: HalCall) -> Result<(), HalError> {
        self.calls.push(call);
        let op = call.op();
        match self.failures.iter().position(|(o, _)| *o == op) {
            Some(idx) => Err(HalError::new(self.failures.remove(idx).1)),
            None => Ok(()),
        }
    }

    fn pin(&mut self, pin: Pin) -> &mut SimPin {
        &mut self.pins[pin.number() as usize]
    }
}

/// Shared handle to the simulated hardware.
///
/// Cloning is cheap; every clone observes the same pins.
#[derive(Clone)]
pub struct SimBoard {
    revision: u32,
    state: Arc<Mutex<BoardState>>,
    opens: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    refuse_open: Arc<AtomicBool>,
}

impl SimBoard {
    pub fn new(config: SimConfig) -> Self {
        Self {
            revision: config.revision,
            state: Arc::new(Mutex::new(BoardState {
                pins: [SimPin::RESET; PIN_COUNT],
                calls: Vec::new(),
                failures: Vec::new(),
                edge: None,
                generation: 0,
            })),
            opens: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
            refuse_open: Arc::new(AtomicBool::new(false)),
        }
    }

    fn state(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of every call received so far.
    pub fn calls(&self) -> Vec<HalCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Calls that changed pin configuration or output.
    pub fn mutations(&self) -> Vec<HalCall> {
        self.state().calls.iter().copied().filter(HalCall::is_mutation).collect()
    }

    pub fn pin(&self, pin: Pin) -> SimPin {
        self.state().pins[pin.number() as usize]
    }

    /// Drive a pin's level from outside without raising an edge callback.
    pub fn set_level(&self, pin: Pin, level: Level) {
        self.state().pin(pin).level = level;
    }

    /// Drive `pin` to `level` and deliver the edge to an armed callback.
    ///
    /// Returns whether a callback was armed on the pin.
    pub fn inject_edge(&self, pin: Pin, level: Level) -> bool {
        let callback = {
            let mut state = self.state();
            state.pin(pin).level = level;
            match &state.edge {
                Some(reg) if reg.pin == pin => Some(Arc::clone(&reg.callback)),
                _ => None,
            }
        };

        match callback {
            Some(callback) => {
                debug!(%pin, ?level, "sim: delivering edge");
                callback(EdgeEvent::Edge(level));
                true
            }
            None => false,
        }
    }

    pub fn edge_armed(&self, pin: Pin) -> bool {
        matches!(&self.state().edge, Some(reg) if reg.pin == pin)
    }

    /// Make the next call of kind `op` fail with `code`.
    pub fn fail_next(&self, op: SimOp, code: i32) {
        self.state().failures.push((op, code));
    }

    /// Make the next open attempt fail.
    pub fn refuse_next_open(&self) {
        self.refuse_open.store(true, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum SimError {
    #[display("simulated controller refused to open")]
    OpenRefused,
}

/// Opens [`SimController`]s on a [`SimBoard`].
pub struct SimFactory;

impl ControllerFactory for SimFactory {
    type Controller = SimController;
    type Config = SimBoard;
    type Error = SimError;

    fn open(
        board: Self::Config,
    ) -> Result<Self::Controller, (Self::Error, Self::Config)> {
        if board.refuse_open.swap(false, Ordering::SeqCst) {
            return Err((SimError::OpenRefused, board));
        }
        board.opens.fetch_add(1, Ordering::SeqCst);
        debug!(revision = board.revision, "sim: controller opened");
        Ok(SimController { board })
    }

    fn close(controller: Self::Controller) -> Self::Config {
        let board = controller.board;
        // Releasing the controller returns every pin to its power-on state.
        board.state().reset();
        board.closes.fetch_add(1, Ordering::SeqCst);
        debug!("sim: controller closed");
        board
    }
}

/// [`PinController`] backed by a [`SimBoard`].
pub struct SimController {
    board: SimBoard,
}

impl SimController {
    pub fn board(&self) -> &SimBoard {
        &self.board
    }

    fn arm(
        &mut self,
        pin: Pin,
        timeout: Option<Duration>,
        callback: EdgeCallback,
    ) -> Result<(), HalError> {
        let generation = {
            let mut state = self.board.state();
            state.record(HalCall::ArmEdge(pin, timeout))?;
            if !pin.in_bank0() {
                return Err(HalError::BAD_USER_GPIO);
            }
            state.generation += 1;
            let generation = state.generation;
            state.edge = Some(Registration { pin, callback, generation });
            generation
        };

        if let Some(timeout) = timeout {
            let board = self.board.clone();
            thread::spawn(move || {
                thread::sleep(timeout);
                let callback = match &board.state().edge {
                    Some(reg) if reg.generation == generation => {
                        Arc::clone(&reg.callback)
                    }
                    _ => return,
                };
                debug!(%pin, "sim: edge wait timed out");
                callback(EdgeEvent::Timeout);
            });
        }
        Ok(())
    }
}

impl PinController for SimController {
    fn hardware_revision(&mut self) -> Result<u32, HalError> {
        self.board.state().record(HalCall::Revision)?;
        Ok(self.board.revision)
    }

    fn read(&mut self, pin: Pin) -> Result<Level, HalError> {
        let mut state = self.board.state();
        state.record(HalCall::Read(pin))?;
        Ok(state.pin(pin).level)
    }

    fn write(&mut self, pin: Pin, level: Level) -> Result<(), HalError> {
        let mut state = self.board.state();
        state.record(HalCall::Write(pin, level))?;
        let sim = state.pin(pin);
        sim.direction = Direction::Output;
        sim.level = level;
        Ok(())
    }

    fn set_direction(
        &mut self,
        pin: Pin,
        direction: Direction,
    ) -> Result<(), HalError> {
        let mut state = self.board.state();
        state.record(HalCall::SetDirection(pin, direction))?;
        state.pin(pin).direction = direction;
        Ok(())
    }

    fn set_pull(&mut self, pin: Pin, pull: PullMode) -> Result<(), HalError> {
        let mut state = self.board.state();
        state.record(HalCall::SetPull(pin, pull))?;
        let sim = state.pin(pin);
        sim.pull = pull;
        if sim.direction == Direction::Input {
            match pull {
                PullMode::PullUp => sim.level = Level::High,
                PullMode::PullDown => sim.level = Level::Low,
                PullMode::None => {}
            }
        }
        Ok(())
    }

    fn set_pwm_range(&mut self, pin: Pin, range: u32) -> Result<(), HalError> {
        let mut state = self.board.state();
        state.record(HalCall::SetPwmRange(pin, range))?;
        if !pin.in_bank0() {
            return Err(HalError::BAD_USER_GPIO);
        }
        if !(25..=40_000).contains(&range) {
            return Err(HalError::BAD_DUTYRANGE);
        }
        state.pin(pin).pwm_range = range;
        Ok(())
    }

    fn set_pwm(&mut self, pin: Pin, duty: u16) -> Result<(), HalError> {
        let mut state = self.board.state();
        state.record(HalCall::SetPwm(pin, duty))?;
        if !pin.in_bank0() {
            return Err(HalError::BAD_USER_GPIO);
        }
        let sim = state.pin(pin);
        if u32::from(duty) > sim.pwm_range {
            return Err(HalError::BAD_DUTYCYCLE);
        }
        sim.direction = Direction::Output;
        sim.duty = duty;
        Ok(())
    }

    fn set_edge_callback(
        &mut self,
        pin: Pin,
        timeout: Option<Duration>,
        callback: Option<EdgeCallback>,
    ) -> Result<(), HalError> {
        match callback {
            Some(callback) => self.arm(pin, timeout, callback),
            None => {
                let mut state = self.board.state();
                state.record(HalCall::DisarmEdge(pin))?;
                if !pin.in_bank0() {
                    return Err(HalError::BAD_USER_GPIO);
                }
                if matches!(&state.edge, Some(reg) if reg.pin == pin) {
                    state.edge = None;
                }
                Ok(())
            }
        }
    }
}
