//! Client for the pigpio daemon's socket interface.
//!
//! Commands travel on one TCP connection as 16-byte little-endian frames
//! `{cmd, p1, p2, p3}`; the daemon echoes the frame with the status in
//! place of `p3`. Edge notifications arrive on a second connection opened
//! in-band (`NOIB`) as 12-byte `{seqno, flags, tick, level}` reports, read
//! by a dedicated listener thread that invokes the armed callback. Edge
//! timeouts use the daemon's per-pin watchdog.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use controller_manager::ControllerFactory;
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{EdgeCallback, EdgeEvent, HalError, PinController};
use crate::icd::{Direction, Level, Pin, PullMode};

// Command numbers
const CMD_MODES: u32 = 0;
const CMD_PUD: u32 = 2;
const CMD_READ: u32 = 3;
const CMD_WRITE: u32 = 4;
const CMD_PWM: u32 = 5;
const CMD_PRS: u32 = 6;
const CMD_WDOG: u32 = 9;
const CMD_HWVER: u32 = 17;
const CMD_NB: u32 = 19;
const CMD_NC: u32 = 21;
const CMD_NOIB: u32 = 99;

// Notification report flags
const NTFY_FLAGS_EVENT: u16 = 1 << 7;
const NTFY_FLAGS_ALIVE: u16 = 1 << 6;
const NTFY_FLAGS_WDOG: u16 = 1 << 5;
const NTFY_FLAGS_GPIO: u16 = 31;

/// Longest watchdog timeout the daemon accepts, in milliseconds.
pub const MAX_WATCHDOG_MS: u128 = 60_000;

pub const DEFAULT_PORT: u16 = 8888;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PigpiodConfig {
    pub host: String,
    pub port: u16,
    /// Bounds connecting and every command round trip.
    pub connect_timeout_ms: u64,
}

impl Default for PigpiodConfig {
    fn default() -> Self {
        Self {
            host: String::from("localhost"),
            port: DEFAULT_PORT,
            connect_timeout_ms: 3_000,
        }
    }
}

impl PigpiodConfig {
    fn resolve(&self) -> Result<SocketAddr, PigpiodError> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| PigpiodError::Unresolved(self.host.clone()))
    }
}

#[derive(Debug, Display, From)]
pub enum PigpiodError {
    #[display("cannot resolve pigpiod host {_0}")]
    #[from(skip)]
    Unresolved(String),
    #[display("pigpiod connection failed: {_0}")]
    Io(io::Error),
    #[display("pigpiod refused notification handle: {_0}")]
    #[from(skip)]
    Notify(i32),
}

impl std::error::Error for PigpiodError {}

fn encode_command(cmd: u32, p1: u32, p2: u32) -> [u8; 16] {
    let mut frame = [0u8; 16];
    frame[0..4].copy_from_slice(&cmd.to_le_bytes());
    frame[4..8].copy_from_slice(&p1.to_le_bytes());
    frame[8..12].copy_from_slice(&p2.to_le_bytes());
    frame
}

fn decode_status(reply: &[u8; 16]) -> i32 {
    i32::from_le_bytes([reply[12], reply[13], reply[14], reply[15]])
}

fn exchange(
    stream: &mut TcpStream,
    cmd: u32,
    p1: u32,
    p2: u32,
) -> io::Result<i32> {
    stream.write_all(&encode_command(cmd, p1, p2))?;
    let mut reply = [0u8; 16];
    stream.read_exact(&mut reply)?;
    Ok(decode_status(&reply))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Report {
    flags: u16,
    level: u32,
}

impl Report {
    const SIZE: usize = 12;

    fn decode(raw: &[u8; Self::SIZE]) -> Self {
        Self {
            flags: u16::from_le_bytes([raw[2], raw[3]]),
            level: u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]),
        }
    }
}

/// The armed edge callback and the last level seen on its pin.
struct Watch {
    pin: Pin,
    last: Level,
    callback: EdgeCallback,
}

impl Watch {
    fn observe(&mut self, report: Report) -> Option<EdgeEvent> {
        if report.flags & NTFY_FLAGS_WDOG != 0 {
            let gpio = (report.flags & NTFY_FLAGS_GPIO) as u8;
            return (gpio == self.pin.number()).then_some(EdgeEvent::Timeout);
        }
        if report.flags & (NTFY_FLAGS_EVENT | NTFY_FLAGS_ALIVE) != 0 {
            return None;
        }

        let level = Level::from(report.level >> self.pin.number() & 1 == 1);
        if level == self.last {
            return None;
        }
        self.last = level;
        Some(EdgeEvent::Edge(level))
    }
}

type SharedWatch = Arc<Mutex<Option<Watch>>>;

fn lock(watch: &SharedWatch) -> MutexGuard<'_, Option<Watch>> {
    watch.lock().unwrap_or_else(PoisonError::into_inner)
}

fn listen(mut stream: TcpStream, watch: SharedWatch) {
    let mut raw = [0u8; Report::SIZE];
    while stream.read_exact(&mut raw).is_ok() {
        let report = Report::decode(&raw);
        let fired = lock(&watch).as_mut().and_then(|w| {
            w.observe(report).map(|event| (Arc::clone(&w.callback), event))
        });
        if let Some((callback, event)) = fired {
            callback(event);
        }
    }
    debug!("pigpiod notification stream closed");
}

/// Opens [`PigpiodController`]s.
pub struct PigpiodFactory;

impl ControllerFactory for PigpiodFactory {
    type Controller = PigpiodController;
    type Config = PigpiodConfig;
    type Error = PigpiodError;

    fn open(
        config: Self::Config,
    ) -> Result<Self::Controller, (Self::Error, Self::Config)> {
        match PigpiodController::connect(&config) {
            Ok(mut controller) => {
                controller.config = config;
                Ok(controller)
            }
            Err(err) => Err((err, config)),
        }
    }

    fn close(mut controller: Self::Controller) -> Self::Config {
        controller.shutdown();
        std::mem::take(&mut controller.config)
    }
}

pub struct PigpiodController {
    config: PigpiodConfig,
    commands: TcpStream,
    notify: TcpStream,
    handle: u32,
    watch: SharedWatch,
    listener: Option<JoinHandle<()>>,
}

impl PigpiodController {
    fn connect(config: &PigpiodConfig) -> Result<Self, PigpiodError> {
        let addr = config.resolve()?;
        let timeout = Duration::from_millis(config.connect_timeout_ms);

        // Every command must answer within the timeout; the notification
        // stream blocks for as long as an edge wait lasts.
        let commands = TcpStream::connect_timeout(&addr, timeout)?;
        commands.set_nodelay(true)?;
        commands.set_read_timeout(Some(timeout))?;
        commands.set_write_timeout(Some(timeout))?;

        let mut notify = TcpStream::connect_timeout(&addr, timeout)?;
        notify.set_read_timeout(Some(timeout))?;
        let handle = exchange(&mut notify, CMD_NOIB, 0, 0)?;
        if handle < 0 {
            return Err(PigpiodError::Notify(handle));
        }
        notify.set_read_timeout(None)?;

        let watch = SharedWatch::default();
        let listener = {
            let stream = notify.try_clone()?;
            let watch = Arc::clone(&watch);
            thread::Builder::new()
                .name("pigpiod-notify".into())
                .spawn(move || listen(stream, watch))?
        };

        info!(%addr, handle, "connected to pigpiod");
        Ok(Self {
            config: PigpiodConfig::default(),
            commands,
            notify,
            handle: handle as u32,
            watch,
            listener: Some(listener),
        })
    }

    fn command(&mut self, cmd: u32, p1: u32, p2: u32) -> Result<u32, HalError> {
        let status =
            exchange(&mut self.commands, cmd, p1, p2).map_err(|err| {
                warn!(cmd, %err, "pigpiod command failed");
                // A late reply would be taken for the next command's.
                let _ = self.commands.shutdown(Shutdown::Both);
                HalError::COMMS
            })?;
        if status < 0 {
            Err(HalError::new(status))
        } else {
            Ok(status as u32)
        }
    }

    fn pin_command(
        &mut self,
        cmd: u32,
        pin: Pin,
        arg: u32,
    ) -> Result<u32, HalError> {
        self.command(cmd, u32::from(pin.number()), arg)
    }

    fn disarm(&mut self, pin: Pin) -> Result<(), HalError> {
        let watchdog = self.pin_command(CMD_WDOG, pin, 0);
        let stop = self.command(CMD_NB, self.handle, 0);
        lock(&self.watch).take();
        watchdog.and(stop).map(drop)
    }

    fn shutdown(&mut self) {
        let armed = lock(&self.watch).as_ref().map(|w| w.pin);
        if let Some(pin) = armed {
            let _ = self.disarm(pin);
        }
        if let Err(err) = self.command(CMD_NC, self.handle, 0) {
            debug!(%err, "closing notification handle failed");
        }
        let _ = self.notify.shutdown(Shutdown::Both);
        let _ = self.commands.shutdown(Shutdown::Both);
        if let Some(listener) = self.listener.take() {
            let _ = listener.join();
        }
        info!("disconnected from pigpiod");
    }
}

impl Drop for PigpiodController {
    fn drop(&mut self) {
        // Unblocks the listener thread if close() was never called.
        let _ = self.notify.shutdown(Shutdown::Both);
    }
}

impl PinController for PigpiodController {
    fn hardware_revision(&mut self) -> Result<u32, HalError> {
        self.command(CMD_HWVER, 0, 0)
    }

    fn read(&mut self, pin: Pin) -> Result<Level, HalError> {
        let level = self.pin_command(CMD_READ, pin, 0)?;
        Ok(Level::from(level != 0))
    }

    fn write(&mut self, pin: Pin, level: Level) -> Result<(), HalError> {
        self.pin_command(CMD_WRITE, pin, i32::from(level) as u32).map(drop)
    }

    fn set_direction(
        &mut self,
        pin: Pin,
        direction: Direction,
    ) -> Result<(), HalError> {
        self.pin_command(CMD_MODES, pin, i32::from(direction) as u32).map(drop)
    }

    fn set_pull(&mut self, pin: Pin, pull: PullMode) -> Result<(), HalError> {
        let pud = match pull {
            PullMode::None => 0,
            PullMode::PullDown => 1,
            PullMode::PullUp => 2,
        };
        self.pin_command(CMD_PUD, pin, pud).map(drop)
    }

    fn set_pwm_range(&mut self, pin: Pin, range: u32) -> Result<(), HalError> {
        // The daemon answers with the real range, which depends on the
        // pin's PWM frequency; any non-negative answer is success.
        self.pin_command(CMD_PRS, pin, range).map(drop)
    }

    fn set_pwm(&mut self, pin: Pin, duty: u16) -> Result<(), HalError> {
        self.pin_command(CMD_PWM, pin, u32::from(duty)).map(drop)
    }

    fn set_edge_callback(
        &mut self,
        pin: Pin,
        timeout: Option<Duration>,
        callback: Option<EdgeCallback>,
    ) -> Result<(), HalError> {
        if !pin.in_bank0() {
            return Err(HalError::BAD_USER_GPIO);
        }
        let Some(callback) = callback else {
            return self.disarm(pin);
        };

        let watchdog_ms = match timeout {
            None => 0,
            Some(t) if t.as_millis() > MAX_WATCHDOG_MS => {
                return Err(HalError::BAD_WDOG_TIMEOUT);
            }
            // A zero watchdog would disable the timeout altogether.
            Some(t) => t.as_millis().max(1) as u32,
        };

        let last = self.read(pin)?;
        *lock(&self.watch) = Some(Watch { pin, last, callback });

        let armed = self
            .command(CMD_NB, self.handle, 1 << pin.number())
            .and_then(|_| self.pin_command(CMD_WDOG, pin, watchdog_ms));
        if let Err(err) = armed {
            lock(&self.watch).take();
            return Err(err);
        }
        debug!(%pin, watchdog_ms, "edge callback armed");
        Ok(())
    }
}
